//! `RawView`: a byte-granular window into a [`BufferOwner`].

use std::cmp::Ordering;

use bytemuck::Pod;
use nmem_common::{
    Result,
    error::{Error, ErrorKind},
};
use nmem_common_traits::memory_owner::{MemoryAllocation, MemoryOwner};

use crate::{owner::BufferOwner, pin::Pin, primitives, typed_view::TypedView};

/// A window of `byte_length` bytes starting `byte_offset` bytes into a buffer.
///
/// A view never owns memory and never caches an address. Every access first
/// revalidates the window against the owner's *current* length: if the owner was
/// disposed or shrunk since the view was created, the access fails with
/// `InvalidState`. An empty view has nothing to read and is always valid. Data
/// accesses pin the owner for their duration.
///
/// Cloning a view is cheap and shares the owner.
#[derive(Clone, Default)]
pub struct RawView {
    owner: Option<BufferOwner>,
    byte_offset: usize,
    byte_length: usize,
}

impl RawView {
    /// Creates an empty view, which has no owner and is always valid.
    pub fn empty() -> RawView {
        RawView::default()
    }

    /// Creates a view over the whole of `owner`, as long as it is right now.
    ///
    /// The length is captured here; later reallocations do not resize the view.
    pub fn full(owner: &BufferOwner) -> RawView {
        RawView {
            owner: Some(owner.clone()),
            byte_offset: 0,
            byte_length: owner.byte_length(),
        }
    }

    pub(crate) fn from_parts(
        owner: Option<BufferOwner>,
        byte_offset: usize,
        byte_length: usize,
    ) -> RawView {
        RawView {
            owner,
            byte_offset,
            byte_length,
        }
    }

    /// Returns the owner the view refers to, `None` for an owner-less empty view.
    pub fn owner(&self) -> Option<&BufferOwner> {
        self.owner.as_ref()
    }

    /// Offset of the first byte, counted from the owner's address.
    #[inline]
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Number of bytes in the view.
    #[inline]
    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Returns `true` if the view covers no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.byte_length == 0
    }

    /// Returns `true` if the view is empty or fits its owner as the owner is right now.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Checks the view against the owner's current state.
    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    /// Returns the view of the bytes from `start` to the end of this view.
    pub fn slice_from(&self, start: usize) -> Result<RawView> {
        if start > self.byte_length {
            return Err(Error::out_of_range(start, 0, self.byte_length));
        }
        self.slice(start, self.byte_length - start)
    }

    /// Returns the view of `length` bytes starting `start` bytes into this view.
    ///
    /// Fails with `OutOfRange` if the range exceeds this view, and with
    /// `InvalidState` if this view no longer fits its owner.
    pub fn slice(&self, start: usize, length: usize) -> Result<RawView> {
        match start.checked_add(length) {
            Some(end) if start <= self.byte_length && end <= self.byte_length => {}
            _ => return Err(Error::out_of_range(start, length, self.byte_length)),
        }
        self.validate()?;
        Ok(RawView {
            owner: self.owner.clone(),
            byte_offset: self.byte_offset + start,
            byte_length: length,
        })
    }

    /// Returns the current address of the view's first byte.
    ///
    /// The address is only guaranteed to stay valid while the owner is pinned; pin
    /// first and then call this to hand the memory to foreign code.
    pub fn as_ptr(&self) -> Result<*mut u8> {
        self.resolve()
    }

    /// Pins the view's owner. A view without an owner yields an inactive pin.
    pub fn pin(&self) -> Pin {
        match &self.owner {
            Some(owner) => owner.pin(),
            None => Pin::empty(),
        }
    }

    /// Reinterprets the view as a view of `T` elements (see [`TypedView::from_raw`]).
    pub fn as_typed<T: Pod>(&self) -> TypedView<T> {
        TypedView::from_raw(self)
    }

    /// Copies the view's bytes into the front of `dst`.
    ///
    /// Fails with `DestBufferTooSmall` if `dst` is shorter than the view.
    pub fn read_into(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() < self.byte_length {
            return Err(ErrorKind::DestBufferTooSmall.into());
        }
        let (_pin, ptr) = self.access()?;
        unsafe { primitives::copy(dst.as_mut_ptr(), ptr, self.byte_length) };
        Ok(())
    }

    /// Copies `src` into the front of the view.
    ///
    /// Fails with `OutOfRange` if `src` is longer than the view.
    pub fn write_from(&self, src: &[u8]) -> Result<()> {
        if src.len() > self.byte_length {
            return Err(Error::out_of_range(0, src.len(), self.byte_length));
        }
        let (_pin, ptr) = self.access()?;
        unsafe { primitives::copy(ptr, src.as_ptr(), src.len()) };
        Ok(())
    }

    /// Returns a copy of the view's bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; self.byte_length];
        self.read_into(&mut bytes)?;
        Ok(bytes)
    }

    /// Sets every byte of the view to `value`.
    pub fn fill(&self, value: u8) -> Result<()> {
        let (_pin, ptr) = self.access()?;
        unsafe { primitives::fill(ptr, value, self.byte_length) };
        Ok(())
    }

    /// Fills the view with copies of the 32-bit `value`.
    ///
    /// Only whole words are written; up to three trailing bytes are left untouched.
    pub fn fill_words(&self, value: u32) -> Result<()> {
        let (_pin, ptr) = self.access()?;
        unsafe { primitives::fill_words(ptr, value, self.byte_length / 4) };
        Ok(())
    }

    /// Copies all of `src` into the front of `dst`.
    ///
    /// Returns `false` without copying anything unless both views are valid and
    /// `dst` is at least as long as `src`. Overlapping views are handled as by
    /// [`RawView::try_move`].
    pub fn try_copy(dst: &RawView, src: &RawView) -> bool {
        Self::transfer(dst, src, |d, s, n| {
            if primitives::overlaps(d, n, s, n) {
                unsafe { primitives::move_bytes(d, s, n) };
            } else {
                unsafe { primitives::copy(d, s, n) };
            }
        })
    }

    /// Copies all of `src` into the front of `dst`; the views may overlap.
    ///
    /// Returns `false` without copying anything unless both views are valid and
    /// `dst` is at least as long as `src`.
    pub fn try_move(dst: &RawView, src: &RawView) -> bool {
        Self::transfer(dst, src, |d, s, n| unsafe {
            primitives::move_bytes(d, s, n);
        })
    }

    /// Compares the contents of two views of equal length.
    ///
    /// Returns `None` if the lengths differ or either view is invalid. Two empty
    /// views always compare equal, whatever the state of their owners.
    pub fn try_compare(a: &RawView, b: &RawView) -> Option<Ordering> {
        if a.byte_length != b.byte_length {
            return None;
        }
        if a.is_empty() {
            return Some(Ordering::Equal);
        }
        let (_a_pin, a_ptr) = a.access().ok()?;
        let (_b_pin, b_ptr) = b.access().ok()?;
        Some(unsafe { primitives::compare(a_ptr, b_ptr, a.byte_length) })
    }

    fn transfer(dst: &RawView, src: &RawView, op: impl FnOnce(*mut u8, *const u8, usize)) -> bool {
        if dst.byte_length < src.byte_length {
            return false;
        }
        let Ok((_dst_pin, dst_ptr)) = dst.access() else {
            return false;
        };
        let Ok((_src_pin, src_ptr)) = src.access() else {
            return false;
        };
        op(dst_ptr, src_ptr, src.byte_length);
        true
    }

    /// Pins the owner, then resolves the view's current address.
    ///
    /// The address is valid for `byte_length` bytes while the returned pin is held.
    fn access(&self) -> Result<(Pin, *mut u8)> {
        let pin = self.pin();
        let ptr = self.resolve()?;
        Ok((pin, ptr))
    }

    /// An empty view has nothing to read and always resolves, to null.
    fn resolve(&self) -> Result<*mut u8> {
        if self.byte_length == 0 {
            return Ok(std::ptr::null_mut());
        }
        match &self.owner {
            Some(owner) => owner.resolve(self.byte_offset, self.byte_length),
            None => Err(Error::invalid_state(self.byte_offset, self.byte_length, 0)),
        }
    }
}

impl From<&BufferOwner> for RawView {
    fn from(owner: &BufferOwner) -> Self {
        RawView::full(owner)
    }
}

impl std::fmt::Debug for RawView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawView")
            .field("owner", &self.owner)
            .field("byte_offset", &self.byte_offset)
            .field("byte_length", &self.byte_length)
            .finish()
    }
}

unsafe impl MemoryOwner for RawView {
    fn memory(&self) -> MemoryAllocation {
        match self.resolve() {
            Ok(ptr) if !ptr.is_null() => MemoryAllocation {
                ptr,
                len: self.byte_length,
            },
            _ => MemoryAllocation::EMPTY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_of(bytes: &[u8]) -> RawView {
        RawView::full(&BufferOwner::copy_from_slice(bytes).unwrap())
    }

    #[test]
    fn test_full() {
        let owner = BufferOwner::allocate(16).unwrap();
        let view = RawView::full(&owner);
        assert_eq!(view.byte_offset(), 0);
        assert_eq!(view.byte_length(), 16);
        assert!(view.is_valid());
        assert_eq!(view.as_ptr().unwrap(), owner.address());
    }

    #[test]
    fn test_full_length_is_captured() {
        let owner = BufferOwner::allocate(16).unwrap();
        let view = RawView::full(&owner);
        owner.reallocate(32).unwrap();
        assert_eq!(view.byte_length(), 16);
        assert!(view.is_valid());
    }

    #[test]
    fn test_slice() {
        let view = view_of(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let sub = view.slice(2, 4).unwrap();
        assert_eq!(sub.byte_offset(), 2);
        assert_eq!(sub.byte_length(), 4);
        assert_eq!(sub.to_vec().unwrap(), vec![2, 3, 4, 5]);

        let subsub = sub.slice(1, 2).unwrap();
        assert_eq!(subsub.byte_offset(), 3);
        assert_eq!(subsub.to_vec().unwrap(), vec![3, 4]);

        let tail = view.slice_from(6).unwrap();
        assert_eq!(tail.to_vec().unwrap(), vec![6, 7]);
        assert!(view.slice_from(8).unwrap().is_empty());
    }

    #[test]
    fn test_slice_out_of_range() {
        let view = view_of(&[0; 8]);
        let sub = view.slice(2, 4).unwrap();
        assert!(sub.slice(5, 0).unwrap_err().is_out_of_range());
        assert!(sub.slice(2, 3).unwrap_err().is_out_of_range());
        assert!(sub.slice(1, usize::MAX).unwrap_err().is_out_of_range());
        assert!(sub.slice_from(5).unwrap_err().is_out_of_range());
        assert!(sub.slice(4, 0).is_ok());
    }

    #[test]
    fn test_slice_of_stale_parent_fails() {
        let owner = BufferOwner::allocate(16).unwrap();
        let view = RawView::full(&owner);
        owner.reallocate(8).unwrap();
        // Structurally fine, but the parent no longer fits its owner.
        assert!(view.slice(0, 4).unwrap_err().is_invalid_state());
        assert!(view.slice(20, 0).unwrap_err().is_out_of_range());
    }

    #[test]
    fn test_revalidation_after_shrink() {
        let owner = BufferOwner::allocate(16).unwrap();
        let view = RawView::full(&owner);
        let head = view.slice(0, 8).unwrap();
        owner.reallocate(8).unwrap();

        assert!(!view.is_valid());
        assert!(view.to_vec().unwrap_err().is_invalid_state());
        assert!(view.fill(0).unwrap_err().is_invalid_state());
        assert!(view.as_ptr().unwrap_err().is_invalid_state());
        assert!(view.memory().is_empty());
        assert!(head.is_valid());
    }

    #[test]
    fn test_revalidation_after_dispose() {
        let owner = BufferOwner::allocate(16).unwrap();
        let view = RawView::full(&owner);
        owner.dispose().unwrap();
        assert!(view.validate().unwrap_err().is_invalid_state());
        assert!(view.slice(0, 0).unwrap_err().is_invalid_state());
        assert!(view.slice_from(16).unwrap_err().is_invalid_state());
    }

    #[test]
    fn test_empty_view() {
        let view = RawView::empty();
        assert!(view.is_empty());
        assert!(view.is_valid());
        assert!(view.owner().is_none());
        assert!(view.to_vec().unwrap().is_empty());
        assert!(!view.pin().is_active());
        assert!(view.memory().is_empty());
    }

    #[test]
    fn test_read_write() {
        let owner = BufferOwner::zero_allocate(8, 1).unwrap();
        let view = RawView::full(&owner).slice(2, 4).unwrap();
        view.write_from(&[9, 8, 7]).unwrap();
        assert_eq!(RawView::full(&owner).to_vec().unwrap(), vec![0, 0, 9, 8, 7, 0, 0, 0]);

        let mut out = [0u8; 6];
        view.read_into(&mut out).unwrap();
        assert_eq!(out, [9, 8, 7, 0, 0, 0]);

        let mut small = [0u8; 3];
        let err = view.read_into(&mut small).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DestBufferTooSmall));
        assert!(view.write_from(&[0; 5]).unwrap_err().is_out_of_range());
    }

    #[test]
    fn test_fill() {
        let owner = BufferOwner::zero_allocate(10, 1).unwrap();
        let full = RawView::full(&owner);
        full.slice(1, 3).unwrap().fill(0xEE).unwrap();
        assert_eq!(full.to_vec().unwrap(), vec![0, 0xEE, 0xEE, 0xEE, 0, 0, 0, 0, 0, 0]);

        full.fill(0).unwrap();
        full.slice(1, 9).unwrap().fill_words(0x0102_0304).unwrap();
        let bytes = full.to_vec().unwrap();
        let word = 0x0102_0304u32.to_ne_bytes();
        assert_eq!(&bytes[1..5], &word);
        assert_eq!(&bytes[5..9], &word);
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[9], 0);
    }

    #[test]
    fn test_try_copy() {
        let src = view_of(&[1, 2, 3, 4]);
        let dst = view_of(&[0; 6]);
        assert!(RawView::try_copy(&dst, &src));
        assert_eq!(dst.to_vec().unwrap(), vec![1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn test_try_copy_destination_too_small() {
        let src = view_of(&[1, 2, 3, 4]);
        let dst = view_of(&[0; 3]);
        assert!(!RawView::try_copy(&dst, &src));
        assert!(!RawView::try_move(&dst, &src));
        assert_eq!(dst.to_vec().unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_try_copy_invalid_views() {
        let owner = BufferOwner::copy_from_slice(&[1, 2, 3, 4]).unwrap();
        let src = RawView::full(&owner);
        let dst = view_of(&[0; 4]);
        owner.dispose().unwrap();
        assert!(!RawView::try_copy(&dst, &src));
        assert!(!RawView::try_copy(&src, &dst));
        assert_eq!(dst.to_vec().unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_try_move_overlapping() {
        let full = view_of(&[1, 2, 3, 4, 5, 6]);
        let src = full.slice(0, 4).unwrap();
        let dst = full.slice(2, 4).unwrap();
        assert!(RawView::try_move(&dst, &src));
        assert_eq!(full.to_vec().unwrap(), vec![1, 2, 1, 2, 3, 4]);

        let full = view_of(&[1, 2, 3, 4, 5, 6]);
        let src = full.slice(2, 4).unwrap();
        let dst = full.slice(0, 4).unwrap();
        assert!(RawView::try_copy(&dst, &src));
        assert_eq!(full.to_vec().unwrap(), vec![3, 4, 5, 6, 5, 6]);
    }

    #[test]
    fn test_try_compare() {
        let a = view_of(&[1, 2, 3]);
        let b = view_of(&[1, 2, 4]);
        assert_eq!(RawView::try_compare(&a, &b), Some(Ordering::Less));
        assert_eq!(RawView::try_compare(&b, &a), Some(Ordering::Greater));
        assert_eq!(RawView::try_compare(&a, &a.clone()), Some(Ordering::Equal));
        assert_eq!(RawView::try_compare(&a, &b.slice(0, 2).unwrap()), None);
    }

    #[test]
    fn test_try_compare_empty_views() {
        let owner = BufferOwner::allocate(4).unwrap();
        let stale = RawView::full(&owner).slice(4, 0).unwrap();
        owner.dispose().unwrap();
        assert!(stale.is_valid());
        assert_eq!(
            RawView::try_compare(&stale, &RawView::empty()),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_empty_view_past_owner_end() {
        let owner = BufferOwner::allocate(165).unwrap();
        let tail = RawView::full(&owner).slice(165, 0).unwrap();
        owner.reallocate(100).unwrap();
        assert!(tail.is_empty());
        assert!(tail.is_valid());
        assert!(tail.to_vec().unwrap().is_empty());
        tail.fill(1).unwrap();
        assert!(tail.as_ptr().unwrap().is_null());
        assert!(tail.slice(0, 0).unwrap().is_valid());
        assert!(tail.memory().is_empty());
    }

    #[test]
    fn test_try_compare_invalid_view() {
        let owner = BufferOwner::copy_from_slice(&[1, 2]).unwrap();
        let a = RawView::full(&owner);
        let b = view_of(&[1, 2]);
        owner.dispose().unwrap();
        assert_eq!(RawView::try_compare(&a, &b), None);
    }

    #[test]
    fn test_access_pins_owner() {
        let owner = BufferOwner::allocate(4).unwrap();
        let view = RawView::full(&owner);
        let (pin, ptr) = view.access().unwrap();
        assert_eq!(ptr, owner.address());
        assert!(owner.dispose().is_err());
        drop(pin);
        owner.dispose().unwrap();
    }
}
