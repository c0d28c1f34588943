//! `MemoryOwner`: A trait for types that can describe the foreign memory they own or view.

/// A trait for types that own (or view) a block of foreign-allocated memory.
///
/// Unlike Rust-owned buffers, the memory described here can move or vanish: the owner
/// may be reallocated or disposed between two calls to [`MemoryOwner::memory`]. The
/// returned description is therefore a snapshot that stays accurate only while the
/// caller keeps the memory pinned.
///
/// # Safety
///
/// Implementors must guarantee that:
/// - The pointer returned by `memory()` is either null (with `len == 0`) or points
///   to at least `len` readable and writable bytes at the moment of the call.
/// - The memory is not freed or moved while the implementor's pin mechanism reports
///   it as pinned.
pub unsafe trait MemoryOwner {
    /// Returns information about the memory block, as of now.
    fn memory(&self) -> MemoryAllocation;
}

/// Describes a block of foreign memory at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAllocation {
    /// Pointer to the start of the memory, null for an empty or released block.
    pub ptr: *mut u8,
    /// Length of the memory in bytes.
    pub len: usize,
}

impl MemoryAllocation {
    /// An empty allocation: null pointer, zero length.
    pub const EMPTY: MemoryAllocation = MemoryAllocation {
        ptr: std::ptr::null_mut(),
        len: 0,
    };

    /// Returns `true` if the block has no address or no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ptr.is_null() || self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allocation() {
        assert!(MemoryAllocation::EMPTY.is_empty());
        let mut byte = 0u8;
        let block = MemoryAllocation {
            ptr: &mut byte,
            len: 1,
        };
        assert!(!block.is_empty());
        let block = MemoryAllocation { len: 0, ..block };
        assert!(block.is_empty());
    }
}
