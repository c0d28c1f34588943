//! Raw memory primitives over foreign addresses.
//!
//! These follow the native library's conventions for null buffers: comparing, copying,
//! moving or filling a null buffer is a well-defined no-op rather than undefined
//! behavior. A zero byte count is likewise always a no-op.

use std::cmp::Ordering;

/// Compares `n` bytes at `a` and `b` lexicographically.
///
/// Two null buffers compare equal; a null buffer orders before any non-null one.
///
/// # Safety
///
/// Each non-null pointer must be valid for reads of `n` bytes.
pub unsafe fn compare(a: *const u8, b: *const u8, n: usize) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) if n == 0 || a == b => Ordering::Equal,
        (false, false) => {
            let (a, b) = unsafe {
                (
                    std::slice::from_raw_parts(a, n),
                    std::slice::from_raw_parts(b, n),
                )
            };
            a.cmp(b)
        }
    }
}

/// Copies `n` bytes from `src` to `dst` and returns `dst`.
///
/// If either pointer is null, nothing is copied.
///
/// # Safety
///
/// Non-null pointers must be valid for `n` bytes, and the two ranges must not overlap.
pub unsafe fn copy(dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    if dst.is_null() || src.is_null() || n == 0 {
        return dst;
    }
    unsafe { std::ptr::copy_nonoverlapping(src, dst, n) };
    dst
}

/// Copies `n` bytes from `src` to `dst`, allowing the ranges to overlap, and returns `dst`.
///
/// If either pointer is null, nothing is copied.
///
/// # Safety
///
/// Non-null pointers must be valid for `n` bytes.
pub unsafe fn move_bytes(dst: *mut u8, src: *const u8, n: usize) -> *mut u8 {
    if dst.is_null() || src.is_null() || n == 0 {
        return dst;
    }
    unsafe { std::ptr::copy(src, dst, n) };
    dst
}

/// Sets `n` bytes at `dst` to `value` and returns `dst` (null if `dst` is null).
///
/// # Safety
///
/// A non-null `dst` must be valid for writes of `n` bytes.
pub unsafe fn fill(dst: *mut u8, value: u8, n: usize) -> *mut u8 {
    if dst.is_null() {
        return std::ptr::null_mut();
    }
    if n != 0 {
        unsafe { std::ptr::write_bytes(dst, value, n) };
    }
    dst
}

/// Writes `count` copies of the 32-bit `value` starting at `dst` and returns `dst`
/// (null if `dst` is null).
///
/// `dst` need not be 4-byte aligned; each word is stored in native byte order.
///
/// # Safety
///
/// A non-null `dst` must be valid for writes of `count * 4` bytes.
pub unsafe fn fill_words(dst: *mut u8, value: u32, count: usize) -> *mut u8 {
    if dst.is_null() {
        return std::ptr::null_mut();
    }
    let word = value.to_ne_bytes();
    if word.iter().all(|&b| b == word[0]) {
        return unsafe { fill(dst, word[0], count * 4) };
    }
    for i in 0..count {
        unsafe { dst.add(i * 4).cast::<u32>().write_unaligned(value) };
    }
    dst
}

/// Returns `true` if the byte ranges `a..a + a_len` and `b..b + b_len` intersect.
pub(crate) fn overlaps(a: *const u8, a_len: usize, b: *const u8, b_len: usize) -> bool {
    let (a, b) = (a as usize, b as usize);
    a < b.saturating_add(b_len) && b < a.saturating_add(a_len)
}
