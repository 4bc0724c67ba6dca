//! Criterion micro-benchmarks for malloc/free/realloc on the block allocator.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use kiln_bench::{bench_heap, churn_sizes};

/// Benchmark: malloc + free of one small block (the fast path).
fn bench_malloc_free_small(c: &mut Criterion) {
    let heap = bench_heap();
    c.bench_function("malloc_free_64", |b| {
        b.iter(|| {
            let p = heap.malloc(black_box(64));
            // SAFETY: `p` is owned here and freed once.
            unsafe { heap.free(p) };
        });
    });
}

/// Benchmark: allocate 1K mixed sizes, then free every other one and
/// refill, exercising first-fit search and coalescing.
fn bench_churn_1k(c: &mut Criterion) {
    let sizes = churn_sizes(42, 1000);
    c.bench_function("churn_1k", |b| {
        b.iter(|| {
            let heap = bench_heap();
            let mut live: Vec<_> = sizes.iter().filter_map(|&s| heap.malloc(s)).collect();
            for p in live.iter().step_by(2) {
                // SAFETY: every other block is freed once, then replaced.
                unsafe { heap.free(*p) };
            }
            for (slot, &size) in live.iter_mut().step_by(2).zip(&sizes) {
                if let Some(p) = heap.malloc(size) {
                    *slot = p;
                }
            }
            for p in live {
                // SAFETY: each live block is freed exactly once.
                unsafe { heap.free(p) };
            }
            black_box(heap.stats().free_bytes);
        });
    });
}

/// Benchmark: grow one allocation by 16 bytes at a time up to 4 KiB.
fn bench_realloc_growth(c: &mut Criterion) {
    c.bench_function("realloc_grow_4k", |b| {
        b.iter(|| {
            let heap = bench_heap();
            let mut p = heap.malloc(16);
            for size in (32..=4096).step_by(16) {
                // SAFETY: only the latest address is kept.
                p = unsafe { heap.realloc(p, size) };
            }
            black_box(p);
        });
    });
}

/// Benchmark: calloc of a 16 KiB block (allocation plus zero fill).
fn bench_calloc_16k(c: &mut Criterion) {
    let heap = bench_heap();
    c.bench_function("calloc_16k", |b| {
        b.iter(|| {
            let p = heap.calloc(black_box(1024), 16);
            // SAFETY: `p` is owned here and freed once.
            unsafe { heap.free(p) };
        });
    });
}

criterion_group!(
    benches,
    bench_malloc_free_small,
    bench_churn_1k,
    bench_realloc_growth,
    bench_calloc_16k
);
criterion_main!(benches);
