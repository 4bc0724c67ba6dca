//! Typed placement of a single value in a heap block.

#![allow(unsafe_code)]

use std::mem::{align_of, size_of};
use std::ptr::NonNull;

use kiln_heap::{Heap, HeapError, HeapPtr, ALIGNMENT};

/// Bytes to request for one `T`. Zero-sized types still take a block.
pub(crate) const fn alloc_size<T>() -> usize {
    if size_of::<T>() == 0 {
        1
    } else {
        size_of::<T>()
    }
}

/// Typed pointer to the `T` stored at `ptr`.
///
/// # Panics
///
/// Panics if `T` needs more than [`ALIGNMENT`] or the block lies outside
/// committed memory.
pub(crate) fn slot<T>(heap: &Heap, ptr: HeapPtr) -> NonNull<T> {
    assert!(
        align_of::<T>() <= ALIGNMENT,
        "alignment {} exceeds heap alignment {ALIGNMENT}",
        align_of::<T>()
    );
    heap.raw(ptr, size_of::<T>()).cast()
}

/// Allocate a block and move `value` into it.
pub(crate) fn place<T>(heap: &Heap, value: T) -> Result<HeapPtr, HeapError> {
    let ptr = heap.try_malloc(alloc_size::<T>())?;
    // SAFETY: the block was just allocated with room for a `T`, and
    // payloads are ALIGNMENT-aligned (checked by `slot`).
    unsafe { slot::<T>(heap, ptr).as_ptr().write(value) };
    Ok(ptr)
}

/// Move the value at `ptr` out and free its block.
///
/// # Safety
///
/// `ptr` must be a live allocation of `heap` holding an initialized `T`
/// that nothing else will read or drop.
pub(crate) unsafe fn unplace<T>(heap: &Heap, ptr: HeapPtr) -> T {
    // SAFETY: upheld by the caller. The value has been moved out, so the
    // block holds nothing that is read or dropped again.
    unsafe {
        let value = slot::<T>(heap, ptr).as_ptr().read();
        heap.free(ptr);
        value
    }
}
