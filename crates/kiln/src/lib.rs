//! Kiln: a heap allocator, smart pointers and containers for freestanding
//! targets.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Kiln sub-crates. For most users, adding `kiln` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use kiln::prelude::*;
//!
//! // One 64 KiB page committed, heap starting 2 KiB in.
//! let heap = Heap::initialize(HeapConfig::default()).unwrap().into_shared();
//!
//! // Raw C-style allocation. Touching or freeing the bytes is `unsafe`:
//! // the caller vouches that it owns them.
//! let p = heap.malloc(32).unwrap();
//! unsafe {
//!     heap.memset(p, 0xAB, 32);
//!     heap.free(p);
//! }
//!
//! // Owned values and containers, all carved out of the same heap.
//! let boxed = UniquePtr::new(&heap, 7u32).unwrap();
//! let shared = SharedPtr::new(&heap, String::from("kiln")).unwrap();
//! let again = shared.clone();
//! assert_eq!(again.use_count(), 2);
//!
//! let mut numbers = Array::new(&heap);
//! numbers.add(*boxed).unwrap();
//! numbers.add(8).unwrap();
//!
//! let mut queue = Queue::new(&heap);
//! queue.enqueue(numbers[0]).unwrap();
//! assert_eq!(queue.dequeue(), Some(7));
//!
//! let mut list = LinkedList::new(&heap);
//! list.add(shared).unwrap();
//! assert_eq!(list.first().map(|s| s.as_str()), Some("kiln"));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`heap`] | `kiln-heap` | Linear memory, block allocator, `Heap` |
//! | [`ptr`] | `kiln-ptr` | `UniquePtr` and `SharedPtr` |
//! | [`collections`] | `kiln-collections` | `Array`, `Queue`, `LinkedList` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Linear memory and the block allocator (`kiln-heap`).
///
/// Most users only need [`heap::Heap`] and [`heap::HeapConfig`], which are
/// also in the [`prelude`].
pub use kiln_heap as heap;

/// Unique and shared owners of heap values (`kiln-ptr`).
pub use kiln_ptr as ptr;

/// Heap-backed containers (`kiln-collections`).
pub use kiln_collections as collections;

/// Common imports for typical Kiln usage.
///
/// ```rust
/// use kiln::prelude::*;
/// ```
pub mod prelude {
    // Heap
    pub use kiln_heap::{Heap, HeapConfig, HeapError, HeapPtr, SharedHeap};

    // Pointers
    pub use kiln_ptr::{SharedPtr, UniquePtr};

    // Containers
    pub use kiln_collections::{Array, CursorMut, LinkedList, Queue};
}
