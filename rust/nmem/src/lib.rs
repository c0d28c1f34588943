//! Ownership, pinning and views for memory allocated by a foreign allocator.
//!
//! - [`BufferOwner`] wraps exactly one foreign allocation and is the only party that
//!   releases it.
//! - [`Pin`] is a scoped guard; while any pin is outstanding the owner refuses to be
//!   disposed or reallocated, so its address can be handed to native code.
//! - [`RawView`] and [`TypedView`] are (owner, offset, length) windows counted in bytes
//!   or in elements. They never cache addresses and revalidate against the owner's
//!   current state on every access.
//! - [`primitives`] holds the raw compare/copy/move/fill operations with the native
//!   library's null-buffer conventions.
//!
//! Only the liveness of a buffer is made safe to reason about. Concurrent writes to the
//! *contents* of a buffer through different views are not synchronized.

pub mod counter;
pub mod options;
pub mod owner;
pub mod pin;
pub mod primitives;
pub mod raw_view;
pub mod typed_view;

pub use nmem_common::{
    Result,
    error::{Error, ErrorKind},
};
pub use options::AllocateOptions;
pub use owner::BufferOwner;
pub use pin::Pin;
pub use raw_view::RawView;
pub use typed_view::TypedView;
