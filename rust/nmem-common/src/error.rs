use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn allocation_failed(size: usize) -> Error {
        Error(ErrorKind::AllocationFailed { size }.into())
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn out_of_range(offset: usize, len: usize, bound: usize) -> Error {
        Error(ErrorKind::OutOfRange { offset, len, bound }.into())
    }

    pub fn invalid_state(offset: usize, len: usize, owner_len: usize) -> Error {
        Error(
            ErrorKind::InvalidState {
                offset,
                len,
                owner_len,
            }
            .into(),
        )
    }

    /// Returns `true` if the error is a structural bounds violation.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self.kind(), ErrorKind::OutOfRange { .. })
    }

    /// Returns `true` if the error reports a view that outlived its owner's extent.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidState { .. })
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidOperation { .. })
    }

    pub fn is_allocation_failed(&self) -> bool {
        matches!(self.kind(), ErrorKind::AllocationFailed { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("allocation of {size} bytes failed")]
    AllocationFailed { size: usize },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("range {offset}+{len} is out of bounds (limit {bound})")]
    OutOfRange {
        offset: usize,
        len: usize,
        bound: usize,
    },

    #[error("view {offset}+{len} no longer fits its owner ({owner_len} bytes)")]
    InvalidState {
        offset: usize,
        len: usize,
        owner_len: usize,
    },

    #[error("destination buffer is too small")]
    DestBufferTooSmall,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
