//! Criterion micro-benchmarks for the heap-backed containers and pointers.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use kiln_bench::bench_heap;
use kiln_collections::{Array, LinkedList, Queue};
use kiln_ptr::SharedPtr;

/// Benchmark: push 10K u32 values into an Array with default chunking.
fn bench_array_push_10k(c: &mut Criterion) {
    c.bench_function("array_push_10k", |b| {
        b.iter(|| {
            let heap = bench_heap();
            let mut array = Array::new(&heap);
            for i in 0..10_000u32 {
                array.add(i).unwrap();
            }
            black_box(array.len());
        });
    });
}

/// Benchmark: steady-state enqueue/dequeue that keeps the ring wrapping.
fn bench_queue_ring_10k(c: &mut Criterion) {
    let heap = bench_heap();
    let mut queue = Queue::with_capacity(&heap, 64).unwrap();
    for i in 0..32u64 {
        queue.enqueue(i).unwrap();
    }
    c.bench_function("queue_ring_10k", |b| {
        b.iter(|| {
            for i in 0..10_000u64 {
                queue.enqueue(i).unwrap();
                black_box(queue.dequeue());
            }
        });
    });
}

/// Benchmark: build a 1K-node list, then drop every third node through
/// `remove_where`.
fn bench_list_remove_where_1k(c: &mut Criterion) {
    c.bench_function("list_remove_where_1k", |b| {
        b.iter(|| {
            let heap = bench_heap();
            let mut list = LinkedList::new(&heap);
            for i in 0..1_000u32 {
                list.add(i).unwrap();
            }
            black_box(list.remove_where(|v| v % 3 == 0));
        });
    });
}

/// Benchmark: clone and drop a SharedPtr handle.
fn bench_shared_clone(c: &mut Criterion) {
    let heap = bench_heap();
    let shared = SharedPtr::new(&heap, [0u64; 4]).unwrap();
    c.bench_function("shared_clone_drop", |b| {
        b.iter(|| {
            let copy = shared.clone();
            black_box(copy.use_count());
        });
    });
}

criterion_group!(
    benches,
    bench_array_push_10k,
    bench_queue_ring_10k,
    bench_list_remove_where_1k,
    bench_shared_clone
);
criterion_main!(benches);
