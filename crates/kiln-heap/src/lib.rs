//! Linear-memory heap for freestanding targets.
//!
//! A page-granular [`LinearMemory`] stands in for the host's growable
//! memory. A first-fit [`BlockAllocator`] carves it into blocks, each led
//! by a checksummed header, and [`Heap`] exposes the C-style surface on
//! top: `malloc`, `free`, `calloc`, `realloc` and the `mem*` utilities.
//!
//! # Layout
//!
//! ```text
//! 0          data_end        heap_start                         size  max_size
//! ├── data ──┤── offset ─────┤ hdr │ payload │ hdr │ payload │ ... ┤ ...... ┤
//!                            └──── block chain covers the heap ────┘
//! ```
//!
//! Addresses handed out are byte offsets into the linear memory
//! ([`HeapPtr`]), always aligned to [`ALIGNMENT`]. Memory only grows; the
//! base never moves, so an address stays valid until it is freed.
//!
//! Only `memory.rs` and `raw.rs` contain `unsafe` code.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod address;
pub mod allocator;
pub mod block;
pub mod config;
pub mod error;
pub mod heap;
pub mod memory;
mod raw;
pub mod stats;

pub use address::HeapPtr;
pub use allocator::BlockAllocator;
pub use block::HEADER_SIZE;
pub use config::HeapConfig;
pub use error::{HeapError, OpResult};
pub use heap::{Heap, SharedHeap};
pub use memory::LinearMemory;
pub use stats::HeapStats;

/// Alignment of every block header, payload and block size.
pub const ALIGNMENT: usize = 16;

const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);

/// Round `n` up to the next multiple of [`ALIGNMENT`]. `None` on overflow.
pub(crate) fn align_up(n: usize) -> Option<usize> {
    n.checked_add(ALIGNMENT - 1).map(|v| v & !(ALIGNMENT - 1))
}
