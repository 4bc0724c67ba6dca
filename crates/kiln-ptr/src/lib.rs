//! Owning pointers into a Kiln heap.
//!
//! - [`UniquePtr`] owns one value exclusively and frees it exactly once.
//! - [`SharedPtr`] shares one value through a reference count kept in its
//!   own heap allocation.
//!
//! Both hold a [`SharedHeap`](kiln_heap::SharedHeap) handle and place their
//! payload in a block from it. Counts are plain integers: neither type is
//! `Send` or `Sync`, and a cycle of `SharedPtr`s leaks.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod shared;
mod slot;
pub mod unique;

pub use shared::SharedPtr;
pub use unique::UniquePtr;
