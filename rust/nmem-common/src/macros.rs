/// Unwraps a `Result<T, E>` inside a function returning `Option<Result<T, E>>`.
///
/// On `Ok(t)` the macro evaluates to `t`; on `Err(e)` the enclosing function returns
/// `Some(Err(e))`. Meant for `Iterator::next()` implementations whose items are results,
/// e.g. element iterators that revalidate their view on every step.
#[macro_export]
macro_rules! try_or_ret_some_err {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => {
                return Some(Err(err));
            }
        }
    };
}
