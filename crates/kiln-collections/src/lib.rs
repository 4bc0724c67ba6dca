//! Containers allocated from a Kiln heap.
//!
//! - [`Array`]: contiguous values with chunked growth.
//! - [`Queue`]: FIFO ring buffer that unwraps itself when it grows.
//! - [`LinkedList`]: one node block per value, edited through [`CursorMut`].
//!
//! Every container keeps a [`SharedHeap`](kiln_heap::SharedHeap) handle and
//! gets all of its memory from it. Allocation failures surface as
//! [`HeapError`](kiln_heap::HeapError) from the growing operations; index
//! misuse panics. `Clone` panics when the heap cannot hold the copy, while
//! each container's `try_clone` reports the error instead.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod array;
pub mod list;
pub mod queue;
mod raw;

pub use array::Array;
pub use list::{CursorMut, LinkedList};
pub use queue::Queue;

/// Slots added per growth step unless a container is built with its own
/// chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 16;
