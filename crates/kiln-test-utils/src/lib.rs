//! Test utilities for Kiln development.
//!
//! Provides small preconfigured heaps ([`test_heap`], [`heap_with_pages`]),
//! a [`DropCounter`] for checking that containers and smart pointers drop
//! exactly what they own, and [`init_logging`] to surface allocator logs
//! under `cargo test`.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{DropCounter, Tracked};

use kiln_heap::{Heap, HeapConfig, SharedHeap};

/// Page size used by the test heaps. Small, so growth paths run often.
pub const TEST_PAGE_SIZE: usize = 4096;

/// A shared heap of one 4 KiB page that may grow to 64 pages.
pub fn test_heap() -> SharedHeap {
    heap_with_pages(1, 64)
}

/// A shared heap with 4 KiB pages, `initial` committed and `max` at most.
///
/// The heap starts 2 KiB into the memory, so the first page holds a
/// 2 KiB block chain.
pub fn heap_with_pages(initial: u32, max: u32) -> SharedHeap {
    let config = HeapConfig::new(TEST_PAGE_SIZE, initial, max);
    match Heap::initialize(config) {
        Ok(heap) => heap.into_shared(),
        Err(e) => panic!("test heap ({initial}/{max} pages): {e}"),
    }
}

/// Route `log` output to the test harness. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
