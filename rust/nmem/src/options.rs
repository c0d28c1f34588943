//! Allocation options for [`BufferOwner::allocate_with`](crate::BufferOwner::allocate_with).

use nmem_common::{Result, error::Error, verify_arg};

/// Describes how a new buffer is requested from the active allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocateOptions {
    /// Request zero-initialized memory (the zero-allocate entry point).
    pub zeroed: bool,
    /// Size of one element in bytes; the buffer holds `count * element_size` bytes.
    pub element_size: usize,
}

impl Default for AllocateOptions {
    fn default() -> Self {
        Self {
            zeroed: false,
            element_size: 1,
        }
    }
}

impl AllocateOptions {
    /// Options for a zero-initialized byte buffer.
    pub fn zeroed() -> Self {
        Self {
            zeroed: true,
            ..Default::default()
        }
    }

    /// Options for a buffer of `T` elements.
    pub fn for_elements<T>() -> Self {
        Self {
            element_size: std::mem::size_of::<T>(),
            ..Default::default()
        }
    }

    /// Sets whether the memory is zero-initialized.
    pub fn with_zeroed(mut self, zeroed: bool) -> Self {
        self.zeroed = zeroed;
        self
    }

    /// Validates the options.
    pub fn validate(&self) -> Result<()> {
        verify_arg!(element_size, self.element_size != 0);
        Ok(())
    }

    /// Returns the byte length of a buffer holding `count` elements.
    pub fn byte_length(&self, count: usize) -> Result<usize> {
        self.validate()?;
        count.checked_mul(self.element_size).ok_or_else(|| {
            Error::invalid_arg(
                "count",
                format!("{count} elements of {} bytes overflow", self.element_size),
            )
        })
    }
}
