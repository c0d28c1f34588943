//! `Pin`: a scoped guard that keeps a buffer's address and length stable.

use crate::owner::BufferOwner;

/// A guard representing one outstanding pin on a [`BufferOwner`].
///
/// While any pin is outstanding, [`BufferOwner::dispose`] and
/// [`BufferOwner::reallocate`] fail, so the address observed through the owner or
/// a view stays valid. The pin is released by [`Pin::release`] or when the guard is
/// dropped, whichever comes first; releasing twice has no further effect.
///
/// A pin over an empty owner holds nothing and releases nothing.
#[must_use = "the buffer is unpinned as soon as the guard is dropped"]
pub struct Pin {
    owner: Option<BufferOwner>,
}

impl Pin {
    /// Pins `owner`.
    pub fn over(owner: &BufferOwner) -> Pin {
        if owner.is_empty() {
            return Pin::empty();
        }
        owner.acquire_pin();
        Pin {
            owner: Some(owner.clone()),
        }
    }

    /// A guard that pins nothing.
    pub fn empty() -> Pin {
        Pin { owner: None }
    }

    /// Releases the pin. Only the first call has an effect.
    pub fn release(&mut self) {
        if let Some(owner) = self.owner.take() {
            owner.unpin();
        }
    }

    /// Returns `true` until the pin is released.
    pub fn is_active(&self) -> bool {
        self.owner.is_some()
    }

    /// Returns the pinned owner, if the pin is active.
    pub fn owner(&self) -> Option<&BufferOwner> {
        self.owner.as_ref()
    }

    /// Returns the pinned memory's address, null if the pin is not active.
    ///
    /// The address remains valid for as long as this pin is active.
    pub fn address(&self) -> *mut u8 {
        self.owner
            .as_ref()
            .map_or(std::ptr::null_mut(), BufferOwner::address)
    }
}

impl Drop for Pin {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pin").field("owner", &self.owner).finish()
    }
}
