//! Pluggable foreign allocator functions.
//!
//! Memory handed to native code is obtained from a quadruple of C-ABI functions
//! (`malloc`, `calloc`, `realloc`, `free`). The active quadruple can be replaced as a
//! unit with [`set_memory_functions`], and the set that was active at process start is
//! always available through [`original_memory_functions`].
//!
//! All functions here report allocation failure as `None` rather than an error: the
//! caller decides whether to retry, surface an error or abort.
//!
//! # Safety
//!
//! Replacing the active set while any allocation made by the previous set is still
//! outstanding is unsafe: that memory must still be released by the free function of
//! the set that produced it. Callers that keep memory across a replacement should
//! capture the free function at allocation time (see [`MemoryFunctions::free`]).

use std::{
    ffi::c_void,
    ptr::NonNull,
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

pub type MallocFn = unsafe extern "C" fn(usize) -> *mut c_void;
pub type CallocFn = unsafe extern "C" fn(usize, usize) -> *mut c_void;
pub type ReallocFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;
pub type FreeFn = unsafe extern "C" fn(*mut c_void);

/// The four allocator entry points, replaceable as a unit.
#[derive(Clone, Copy)]
pub struct MemoryFunctions {
    pub malloc: MallocFn,
    pub calloc: CallocFn,
    pub realloc: ReallocFn,
    pub free: FreeFn,
}

impl MemoryFunctions {
    /// The C runtime allocator.
    pub const fn system() -> MemoryFunctions {
        MemoryFunctions {
            malloc: libc::malloc,
            calloc: libc::calloc,
            realloc: libc::realloc,
            free: libc::free,
        }
    }

    /// Returns `true` if memory released with `free` may be resized or released by
    /// this set.
    #[inline]
    pub fn frees_with(&self, free: FreeFn) -> bool {
        std::ptr::fn_addr_eq(self.free, free)
    }

    /// Allocates `size` bytes (at least one) through this set.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let size = size.max(1);
        let ptr = unsafe { (self.malloc)(size) };
        track_allocation(ptr, size)
    }

    /// Allocates a zeroed array of `count` elements of `elem_size` bytes each.
    ///
    /// A zero `count` or `elem_size` is treated as one.
    pub fn zero_allocate(&self, count: usize, elem_size: usize) -> Option<NonNull<u8>> {
        let (count, elem_size) = (count.max(1), elem_size.max(1));
        let ptr = unsafe { (self.calloc)(count, elem_size) };
        track_allocation(ptr, count.saturating_mul(elem_size))
    }

    /// Resizes `ptr` to `new_size` bytes (at least one).
    ///
    /// On success the returned pointer replaces `ptr`, which must not be used again.
    /// On failure `None` is returned and `ptr` remains valid and owned by the caller.
    /// A null `ptr` behaves as [`MemoryFunctions::allocate`].
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live allocation produced by this set.
    pub unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
        let new_size = new_size.max(1);
        let result = unsafe { (self.realloc)(ptr.cast(), new_size) };
        if ptr.is_null() {
            return track_allocation(result, new_size);
        }
        match NonNull::new(result.cast::<u8>()) {
            Some(moved) => {
                log::trace!("reallocated {ptr:p} to {new_size} bytes at {moved:p}");
                Some(moved)
            }
            None => {
                log::warn!("reallocation of {ptr:p} to {new_size} bytes failed");
                None
            }
        }
    }

    /// Releases `ptr` through this set's free function. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live allocation produced by this set.
    pub unsafe fn free(&self, ptr: *mut u8) {
        unsafe { free_with(self.free, ptr) }
    }
}

impl Default for MemoryFunctions {
    fn default() -> Self {
        Self::system()
    }
}

impl PartialEq for MemoryFunctions {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::fn_addr_eq(self.malloc, other.malloc)
            && std::ptr::fn_addr_eq(self.calloc, other.calloc)
            && std::ptr::fn_addr_eq(self.realloc, other.realloc)
            && std::ptr::fn_addr_eq(self.free, other.free)
    }
}

impl Eq for MemoryFunctions {}

impl std::fmt::Debug for MemoryFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFunctions")
            .field("malloc", &(self.malloc as *const ()))
            .field("calloc", &(self.calloc as *const ()))
            .field("realloc", &(self.realloc as *const ()))
            .field("free", &(self.free as *const ()))
            .finish()
    }
}

static CURRENT: RwLock<MemoryFunctions> = RwLock::new(MemoryFunctions::system());

static OUTSTANDING: AtomicUsize = AtomicUsize::new(0);

/// Returns the allocator set that was active at process start.
pub fn original_memory_functions() -> MemoryFunctions {
    MemoryFunctions::system()
}

/// Returns the currently active allocator set.
pub fn memory_functions() -> MemoryFunctions {
    *CURRENT.read().unwrap_or_else(PoisonError::into_inner)
}

/// Replaces the active allocator set.
///
/// # Safety
///
/// No allocation made through the previously active set may be released through
/// [`free`] after this call. Memory whose free function was captured at allocation
/// time is unaffected.
pub unsafe fn set_memory_functions(functions: MemoryFunctions) {
    let mut current = CURRENT.write().unwrap_or_else(PoisonError::into_inner);
    log::debug!("replacing memory functions {:?} with {functions:?}", *current);
    *current = functions;
}

/// Returns the number of allocations made through this crate that have not been freed.
///
/// **Note**: The value is advisory; in a concurrent environment it may be stale by the
/// time it is observed.
pub fn outstanding_allocations() -> usize {
    OUTSTANDING.load(Ordering::Relaxed)
}

/// Allocates `size` bytes with the active set.
pub fn allocate(size: usize) -> Option<NonNull<u8>> {
    memory_functions().allocate(size)
}

/// Allocates a zeroed array with the active set.
pub fn zero_allocate(count: usize, elem_size: usize) -> Option<NonNull<u8>> {
    memory_functions().zero_allocate(count, elem_size)
}

/// Resizes `ptr` with the active set.
///
/// # Safety
///
/// See [`MemoryFunctions::reallocate`]; `ptr` must come from the active set.
pub unsafe fn reallocate(ptr: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
    unsafe { memory_functions().reallocate(ptr, new_size) }
}

/// Releases `ptr` with the active set. Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or a live allocation produced by the active set.
pub unsafe fn free(ptr: *mut u8) {
    unsafe { memory_functions().free(ptr) }
}

/// Releases `ptr`, which was allocated through this crate, using `free_fn`.
///
/// # Safety
///
/// `ptr` must be null or a live allocation produced through this crate by the set
/// whose free function is `free_fn`.
pub unsafe fn free_with(free_fn: FreeFn, ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    unsafe { free_fn(ptr.cast()) };
    OUTSTANDING.fetch_sub(1, Ordering::Relaxed);
    log::trace!("freed {ptr:p}");
}

fn track_allocation(ptr: *mut c_void, size: usize) -> Option<NonNull<u8>> {
    match NonNull::new(ptr.cast::<u8>()) {
        Some(ptr) => {
            OUTSTANDING.fetch_add(1, Ordering::Relaxed);
            log::trace!("allocated {size} bytes at {ptr:p}");
            Some(ptr)
        }
        None => {
            log::warn!("allocation of {size} bytes failed");
            None
        }
    }
}

#[cfg(test)]
mod tests;
