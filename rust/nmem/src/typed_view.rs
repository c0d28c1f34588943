//! `TypedView<T>`: an element-granular window into a [`BufferOwner`].
//!
//! A typed view is the same (owner, offset, length) triple as a [`RawView`], counted in
//! elements of `T` instead of bytes. Converting a typed view to a raw view is exact.
//! Converting a raw view to a typed view is conservative: an element that the byte
//! range only partially covers at its start is skipped, so the typed view never claims
//! bytes outside the raw view it came from (see [`TypedView::from_raw`]).

use std::{iter::FusedIterator, marker::PhantomData};

use bytemuck::Pod;
use nmem_common::{Result, error::Error, try_or_ret_some_err};
use nmem_common_traits::memory_owner::{MemoryAllocation, MemoryOwner};

use crate::{owner::BufferOwner, pin::Pin, raw_view::RawView};

/// A window of `element_count` elements of `T`, starting `element_offset` elements into
/// a buffer.
///
/// Like [`RawView`], a typed view is revalidated against its owner's current length on
/// every access. Elements are read and written by value with unaligned accesses, since
/// foreign buffers carry no alignment guarantee for `T`.
pub struct TypedView<T> {
    owner: Option<BufferOwner>,
    element_offset: usize,
    element_count: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> TypedView<T> {
    /// Size of one element in bytes.
    #[inline]
    pub const fn element_size() -> usize {
        const { assert!(std::mem::size_of::<T>() != 0, "zero-sized element type") };
        std::mem::size_of::<T>()
    }

    /// Creates an empty view, which has no owner and is always valid.
    pub fn empty() -> TypedView<T> {
        Self::from_parts(None, 0, 0)
    }

    /// Creates a view over all whole elements that fit in `owner` right now.
    pub fn full(owner: &BufferOwner) -> TypedView<T> {
        Self::from_parts(
            Some(owner.clone()),
            0,
            owner.byte_length() / Self::element_size(),
        )
    }

    fn from_parts(
        owner: Option<BufferOwner>,
        element_offset: usize,
        element_count: usize,
    ) -> TypedView<T> {
        TypedView {
            owner,
            element_offset,
            element_count,
            _marker: PhantomData,
        }
    }

    /// Reinterprets a byte view as a view of `T` elements.
    ///
    /// With `q` and `r` the quotient and remainder of the byte offset divided by the
    /// element size:
    /// - if `r == 0`, the view starts at element `q` and holds
    ///   `byte_length / size` elements;
    /// - otherwise it starts at element `q + 1` (the partially covered leading
    ///   element is excluded) and holds `(r + byte_length) / size - 1` elements.
    ///
    /// The result may therefore cover fewer bytes than `raw` even when the byte length
    /// is a multiple of the element size. A non-empty result never covers bytes `raw`
    /// does not, so it is valid whenever `raw` is; an empty result is always valid,
    /// even when its offset lands past the owner's end.
    pub fn from_raw(raw: &RawView) -> TypedView<T> {
        let size = Self::element_size();
        let (q, r) = (raw.byte_offset() / size, raw.byte_offset() % size);
        let (element_offset, element_count) = if r != 0 {
            (q + 1, (r.saturating_add(raw.byte_length()) / size).saturating_sub(1))
        } else {
            (q, raw.byte_length() / size)
        };
        Self::from_parts(raw.owner().cloned(), element_offset, element_count)
    }

    /// Returns the equivalent byte view.
    pub fn as_raw(&self) -> RawView {
        RawView::from_parts(self.owner.clone(), self.byte_offset(), self.byte_length())
    }

    /// Returns the owner the view refers to, `None` for an owner-less empty view.
    pub fn owner(&self) -> Option<&BufferOwner> {
        self.owner.as_ref()
    }

    /// Index of the first element, counted from the owner's address.
    #[inline]
    pub fn element_offset(&self) -> usize {
        self.element_offset
    }

    /// Number of elements in the view.
    #[inline]
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.element_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    /// Offset of the first byte, counted from the owner's address.
    #[inline]
    pub fn byte_offset(&self) -> usize {
        self.element_offset.saturating_mul(Self::element_size())
    }

    /// Number of bytes covered by the view.
    #[inline]
    pub fn byte_length(&self) -> usize {
        self.element_count.saturating_mul(Self::element_size())
    }

    /// Returns `true` if the view is empty or fits its owner as the owner is right now.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Checks the view against the owner's current state.
    pub fn validate(&self) -> Result<()> {
        self.resolve().map(|_| ())
    }

    /// Returns the view of `count` elements starting `start` elements into this view.
    ///
    /// Fails with `OutOfRange` if the range exceeds this view, and with
    /// `InvalidState` if this view no longer fits its owner.
    pub fn slice(&self, start: usize, count: usize) -> Result<TypedView<T>> {
        match start.checked_add(count) {
            Some(end) if start <= self.element_count && end <= self.element_count => {}
            _ => return Err(Error::out_of_range(start, count, self.element_count)),
        }
        self.validate()?;
        Ok(Self::from_parts(
            self.owner.clone(),
            self.element_offset + start,
            count,
        ))
    }

    /// Pins the view's owner. A view without an owner yields an inactive pin.
    pub fn pin(&self) -> Pin {
        match &self.owner {
            Some(owner) => owner.pin(),
            None => Pin::empty(),
        }
    }

    /// Returns the current address of the element at `index`.
    ///
    /// Fails with `OutOfRange` if `index >= element_count`, and with `InvalidState` if
    /// the view no longer fits its owner. The address is only guaranteed to stay valid
    /// while the owner is pinned.
    pub fn element_ptr(&self, index: usize) -> Result<*mut T> {
        if index >= self.element_count {
            return Err(Error::out_of_range(index, 1, self.element_count));
        }
        let base = self.resolve()?;
        Ok(unsafe { base.add(index * Self::element_size()) }.cast::<T>())
    }

    /// Reads the element at `index`.
    pub fn get(&self, index: usize) -> Result<T> {
        let _pin = self.pin();
        let ptr = self.element_ptr(index)?;
        Ok(unsafe { ptr.read_unaligned() })
    }

    /// Writes `value` to the element at `index`.
    pub fn set(&self, index: usize, value: T) -> Result<()> {
        let _pin = self.pin();
        let ptr = self.element_ptr(index)?;
        unsafe { ptr.write_unaligned(value) };
        Ok(())
    }

    /// Sets every element of the view to `value`.
    pub fn fill(&self, value: T) -> Result<()> {
        let _pin = self.pin();
        let base = self.resolve()?;
        for i in 0..self.element_count {
            unsafe {
                base.add(i * Self::element_size())
                    .cast::<T>()
                    .write_unaligned(value)
            };
        }
        Ok(())
    }

    /// Returns a copy of the view's elements.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let _pin = self.pin();
        let base = self.resolve()?;
        let mut values = Vec::with_capacity(self.element_count);
        for i in 0..self.element_count {
            let ptr = unsafe { base.add(i * Self::element_size()) }.cast::<T>();
            values.push(unsafe { ptr.read_unaligned() });
        }
        Ok(values)
    }

    /// Returns a single-pass iterator over the view's elements.
    ///
    /// The owner stays pinned until the iterator is exhausted or dropped. Each step
    /// revalidates the view and yields `Err(InvalidState)` (ending the iteration) if it
    /// no longer fits its owner.
    pub fn iter(&self) -> Iter<T> {
        Iter {
            view: self.clone(),
            pin: self.pin(),
            cursor: 0,
        }
    }

    /// An empty view has nothing to read and always resolves, to null.
    fn resolve(&self) -> Result<*mut u8> {
        let (offset, len) = (self.byte_offset(), self.byte_length());
        if len == 0 {
            return Ok(std::ptr::null_mut());
        }
        match &self.owner {
            Some(owner) => owner.resolve(offset, len),
            None => Err(Error::invalid_state(offset, len, 0)),
        }
    }
}

impl<T> Clone for TypedView<T> {
    fn clone(&self) -> Self {
        TypedView {
            owner: self.owner.clone(),
            element_offset: self.element_offset,
            element_count: self.element_count,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedView<T> {
    fn default() -> Self {
        TypedView {
            owner: None,
            element_offset: 0,
            element_count: 0,
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for TypedView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedView")
            .field("element_type", &std::any::type_name::<T>())
            .field("owner", &self.owner)
            .field("element_offset", &self.element_offset)
            .field("element_count", &self.element_count)
            .finish()
    }
}

impl<T: Pod> From<&RawView> for TypedView<T> {
    fn from(raw: &RawView) -> Self {
        TypedView::from_raw(raw)
    }
}

impl<T: Pod> From<&TypedView<T>> for RawView {
    fn from(view: &TypedView<T>) -> Self {
        view.as_raw()
    }
}

impl<T: Pod> From<TypedView<T>> for RawView {
    fn from(view: TypedView<T>) -> Self {
        view.as_raw()
    }
}

unsafe impl<T: Pod> MemoryOwner for TypedView<T> {
    fn memory(&self) -> MemoryAllocation {
        self.as_raw().memory()
    }
}

impl<'a, T: Pod> IntoIterator for &'a TypedView<T> {
    type Item = Result<T>;
    type IntoIter = Iter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Single-pass iterator over the elements of a [`TypedView`].
///
/// Holds a pin on the view's owner until exhausted or dropped. The element address is
/// re-derived from the owner on every step.
pub struct Iter<T> {
    view: TypedView<T>,
    pin: Pin,
    cursor: usize,
}

impl<T: Pod> Iter<T> {
    fn read(&mut self, index: usize) -> Result<T> {
        match self.view.element_ptr(index) {
            Ok(ptr) => Ok(unsafe { ptr.read_unaligned() }),
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }

    fn finish(&mut self) {
        self.cursor = self.view.element_count;
        self.pin.release();
    }
}

impl<T: Pod> Iterator for Iter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        if self.cursor >= self.view.element_count {
            self.finish();
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;
        let value = try_or_ret_some_err!(self.read(index));
        Some(Ok(value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.view.element_count - self.cursor;
        (0, Some(remaining))
    }
}

impl<T: Pod> FusedIterator for Iter<T> {}
