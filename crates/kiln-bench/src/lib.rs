//! Benchmark profiles and utilities for the Kiln heap.
//!
//! - [`bench_config`]: a heap with WebAssembly-sized pages and room to grow
//! - [`churn_sizes`]: deterministic allocation sizes for churn workloads

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use kiln_heap::{Heap, HeapConfig, SharedHeap};

/// Smallest size produced by [`churn_sizes`].
pub const MIN_CHURN_SIZE: usize = 8;

/// Largest size produced by [`churn_sizes`].
pub const MAX_CHURN_SIZE: usize = 512;

/// Heap profile for benchmarks: 64 KiB pages, one committed, up to 1024.
pub fn bench_config() -> HeapConfig {
    HeapConfig::new(HeapConfig::DEFAULT_PAGE_SIZE, 1, 1024)
}

/// A fresh shared heap built from [`bench_config`].
///
/// # Panics
///
/// Panics if the profile is rejected, which only happens if the constants
/// above are edited into an invalid combination.
pub fn bench_heap() -> SharedHeap {
    match Heap::initialize(bench_config()) {
        Ok(heap) => heap.into_shared(),
        Err(e) => panic!("bench heap: {e}"),
    }
}

/// Generate `n` allocation sizes in `MIN_CHURN_SIZE..=MAX_CHURN_SIZE`.
///
/// Uses a 64-bit LCG seeded by `seed`, so the same seed always yields the
/// same sequence.
pub fn churn_sizes(seed: u64, n: usize) -> Vec<usize> {
    let span = (MAX_CHURN_SIZE - MIN_CHURN_SIZE + 1) as u64;
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            MIN_CHURN_SIZE + ((state >> 33) % span) as usize
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bench_config_validates() {
        bench_config().validate().unwrap();
    }

    #[test]
    fn churn_sizes_in_range() {
        let sizes = churn_sizes(42, 1000);
        assert_eq!(sizes.len(), 1000);
        for &size in &sizes {
            assert!((MIN_CHURN_SIZE..=MAX_CHURN_SIZE).contains(&size));
        }
    }

    #[test]
    fn churn_sizes_deterministic() {
        assert_eq!(churn_sizes(7, 64), churn_sizes(7, 64));
        assert_ne!(churn_sizes(7, 64), churn_sizes(8, 64));
    }
}
