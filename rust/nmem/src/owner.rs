//! `BufferOwner`: the single party responsible for releasing one foreign allocation.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use nmem_alloc::{FreeFn, MemoryFunctions};
use nmem_common::{Result, error::Error};
use nmem_common_traits::memory_owner::{MemoryAllocation, MemoryOwner};

use crate::{counter::PinCounter, options::AllocateOptions, pin::Pin};

/// A shared handle to one foreign allocation.
///
/// The owner records the allocation's current address, its byte length and the free
/// function that must eventually release it. Cloning the handle is cheap and does not
/// copy the memory; every clone refers to the same allocation.
///
/// The memory is released exactly once: by [`BufferOwner::dispose`], or when the last
/// handle (including those held by views and pins) is dropped. While any [`Pin`] is
/// outstanding, both disposal and reallocation are refused.
///
/// Address and length are mutable: a successful [`BufferOwner::reallocate`] may move or
/// resize the memory in place. Views never cache them and revalidate on every access.
#[derive(Clone)]
pub struct BufferOwner(Arc<OwnerNode>);

struct OwnerNode {
    state: RwLock<OwnerState>,
    pins: PinCounter,
}

struct OwnerState {
    ptr: *mut u8,
    len: usize,
    free_fn: Option<FreeFn>,
    /// Allocated through `nmem_alloc`, and counted in its outstanding allocations.
    tracked: bool,
}

// The raw pointer is only dereferenced by callers that validated it against the
// current state; the owner itself never touches the memory except to release it.
unsafe impl Send for OwnerState {}
unsafe impl Sync for OwnerState {}

impl OwnerState {
    const EMPTY: OwnerState = OwnerState {
        ptr: std::ptr::null_mut(),
        len: 0,
        free_fn: None,
        tracked: false,
    };

    /// Releases the memory and resets to the empty state.
    fn release(&mut self) {
        let state = std::mem::replace(self, OwnerState::EMPTY);
        let Some(free_fn) = state.free_fn else {
            return;
        };
        if state.ptr.is_null() {
            return;
        }
        unsafe {
            if state.tracked {
                nmem_alloc::free_with(free_fn, state.ptr);
            } else {
                free_fn(state.ptr.cast());
            }
        }
    }
}

impl BufferOwner {
    /// Creates an owner that holds no memory.
    pub fn empty() -> BufferOwner {
        Self::from_state(OwnerState::EMPTY)
    }

    /// Allocates `size` bytes through the active allocator.
    ///
    /// The memory is uninitialized (as returned by the allocator).
    pub fn allocate(size: usize) -> Result<BufferOwner> {
        Self::allocate_with(size, &AllocateOptions::default())
    }

    /// Allocates `count * elem_size` zero-initialized bytes through the active allocator.
    ///
    /// Unlike the raw allocator entry points, which round a zero size up to one, the
    /// owner rejects a zero `elem_size` with `InvalidArgument`: its byte length is always
    /// exactly `count * elem_size`.
    pub fn zero_allocate(count: usize, elem_size: usize) -> Result<BufferOwner> {
        Self::allocate_with(
            count,
            &AllocateOptions {
                zeroed: true,
                element_size: elem_size,
            },
        )
    }

    /// Allocates a buffer for `count` elements as described by `options`.
    pub fn allocate_with(count: usize, options: &AllocateOptions) -> Result<BufferOwner> {
        let len = options.byte_length(count)?;
        let functions = nmem_alloc::memory_functions();
        let ptr = if options.zeroed {
            functions.zero_allocate(count, options.element_size)
        } else {
            functions.allocate(len)
        }
        .ok_or_else(|| Error::allocation_failed(len))?;
        Ok(Self::from_state(OwnerState {
            ptr: ptr.as_ptr(),
            len,
            free_fn: Some(functions.free),
            tracked: true,
        }))
    }

    /// Allocates a buffer holding a copy of `data`.
    pub fn copy_from_slice(data: &[u8]) -> Result<BufferOwner> {
        let owner = Self::allocate(data.len())?;
        let ptr = owner.address();
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len()) };
        Ok(owner)
    }

    /// Takes ownership of an existing foreign allocation.
    ///
    /// # Safety
    ///
    /// `ptr` must point to at least `len` readable and writable bytes that stay valid
    /// until `free_fn(ptr)` is called, and `free_fn` must be the function that releases
    /// this allocation. Nothing else may release it.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize, free_fn: FreeFn) -> BufferOwner {
        if ptr.is_null() {
            return Self::empty();
        }
        Self::from_state(OwnerState {
            ptr,
            len,
            free_fn: Some(free_fn),
            tracked: false,
        })
    }

    fn from_state(state: OwnerState) -> BufferOwner {
        BufferOwner(Arc::new(OwnerNode {
            state: RwLock::new(state),
            pins: PinCounter::new(),
        }))
    }

    /// Returns the current address of the memory, null once disposed.
    ///
    /// The address is only guaranteed to stay valid while a [`Pin`] is held.
    pub fn address(&self) -> *mut u8 {
        self.read_state().ptr
    }

    /// Returns the current length of the memory in bytes.
    pub fn byte_length(&self) -> usize {
        self.read_state().len
    }

    /// Returns `true` if the owner holds no memory.
    pub fn is_empty(&self) -> bool {
        self.read_state().ptr.is_null()
    }

    /// Returns the free function that will release the memory.
    pub fn free_fn(&self) -> Option<FreeFn> {
        self.read_state().free_fn
    }

    /// Returns the number of outstanding pins.
    ///
    /// **Note**: The value may be outdated in a concurrent environment.
    pub fn pin_count(&self) -> usize {
        self.0.pins.read()
    }

    /// Returns `true` if at least one pin is outstanding.
    pub fn is_pinned(&self) -> bool {
        self.pin_count() != 0
    }

    /// Returns `true` if both handles refer to the same allocation.
    pub fn ptr_eq(&self, other: &BufferOwner) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Pins the memory, keeping its address and length stable until the returned guard
    /// is released.
    pub fn pin(&self) -> Pin {
        Pin::over(self)
    }

    pub(crate) fn acquire_pin(&self) -> usize {
        self.0.pins.acquire()
    }

    pub(crate) fn unpin(&self) -> usize {
        self.0.pins.release()
    }

    /// Releases the memory.
    ///
    /// Fails with `InvalidOperation` if the owner is pinned; the owner is left
    /// untouched in that case. Disposing an empty owner is a no-op.
    ///
    /// The pin check is not synchronized with concurrent `pin()` calls: the caller must
    /// ensure no other thread may pin the owner while it is being disposed.
    pub fn dispose(&self) -> Result<()> {
        let mut state = self.write_state();
        if state.ptr.is_null() {
            return Ok(());
        }
        let pins = self.pin_count();
        if pins != 0 {
            return Err(Error::invalid_operation(format!(
                "dispose: buffer at {:p} has {pins} outstanding pins",
                state.ptr
            )));
        }
        log::trace!("disposing {} bytes at {:p}", state.len, state.ptr);
        state.release();
        Ok(())
    }

    /// Resizes the memory to `new_len` bytes, preserving the common prefix.
    ///
    /// Fails with `InvalidOperation` if the owner is pinned, and with `AllocationFailed`
    /// if the allocator cannot satisfy the request; the owner is left untouched in both
    /// cases. Reallocating an empty owner allocates fresh memory.
    ///
    /// The memory is resized with the active allocator. If it is owned by a different
    /// free function, it is moved into a new allocation from the active allocator and
    /// the old one is released with its own free function, so that the owner's free
    /// function always matches the allocator that produced the memory.
    pub fn reallocate(&self, new_len: usize) -> Result<()> {
        let mut state = self.write_state();
        let pins = self.pin_count();
        if pins != 0 {
            return Err(Error::invalid_operation(format!(
                "reallocate: buffer at {:p} has {pins} outstanding pins",
                state.ptr
            )));
        }

        let functions = nmem_alloc::memory_functions();
        if state.ptr.is_null() {
            let ptr = functions
                .allocate(new_len)
                .ok_or_else(|| Error::allocation_failed(new_len))?;
            *state = OwnerState {
                ptr: ptr.as_ptr(),
                len: new_len,
                free_fn: Some(functions.free),
                tracked: true,
            };
            return Ok(());
        }

        if state.free_fn.is_some_and(|free_fn| functions.frees_with(free_fn)) {
            let ptr = unsafe { functions.reallocate(state.ptr, new_len) }
                .ok_or_else(|| Error::allocation_failed(new_len))?;
            state.ptr = ptr.as_ptr();
            state.len = new_len;
            return Ok(());
        }

        Self::migrate(&mut state, &functions, new_len)
    }

    fn migrate(state: &mut OwnerState, functions: &MemoryFunctions, new_len: usize) -> Result<()> {
        let ptr = functions
            .allocate(new_len)
            .ok_or_else(|| Error::allocation_failed(new_len))?;
        log::warn!(
            "moving {} bytes at {:p} to {:p}: owned by a foreign free function",
            state.len,
            state.ptr,
            ptr
        );
        unsafe {
            std::ptr::copy_nonoverlapping(state.ptr, ptr.as_ptr(), state.len.min(new_len));
        }
        state.release();
        *state = OwnerState {
            ptr: ptr.as_ptr(),
            len: new_len,
            free_fn: Some(functions.free),
            tracked: true,
        };
        Ok(())
    }

    /// Resolves the byte range `offset..offset + len` against the current state and
    /// returns the address of its first byte.
    ///
    /// Fails with `InvalidState` if the range does not fit the memory as it is now.
    pub(crate) fn resolve(&self, offset: usize, len: usize) -> Result<*mut u8> {
        let state = self.read_state();
        match offset.checked_add(len) {
            Some(end) if offset <= state.len && end <= state.len => {
                if state.ptr.is_null() {
                    Ok(std::ptr::null_mut())
                } else {
                    Ok(unsafe { state.ptr.add(offset) })
                }
            }
            _ => Err(Error::invalid_state(offset, len, state.len)),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, OwnerState> {
        self.0.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, OwnerState> {
        self.0.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BufferOwner {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for OwnerNode {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.ptr.is_null() {
            log::debug!(
                "buffer of {} bytes at {:p} was not disposed, releasing on drop",
                state.len,
                state.ptr
            );
            state.release();
        }
    }
}

impl std::fmt::Debug for BufferOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read_state();
        f.debug_struct("BufferOwner")
            .field("address", &state.ptr)
            .field("byte_length", &state.len)
            .field("pins", &self.0.pins)
            .finish()
    }
}

unsafe impl MemoryOwner for BufferOwner {
    fn memory(&self) -> MemoryAllocation {
        let state = self.read_state();
        MemoryAllocation {
            ptr: state.ptr,
            len: state.len,
        }
    }
}
