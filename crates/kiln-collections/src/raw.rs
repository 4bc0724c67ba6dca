//! Typed views over heap blocks, shared by the containers.
//!
//! [`RawBuf`] owns one block sized for `cap` values of `T` and knows nothing
//! about which slots are initialized; the container on top tracks that.
//! [`slot`] places a single value (a list node) in a block.

#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ptr::{self, NonNull};
use std::rc::Rc;

use kiln_heap::{Heap, HeapError, HeapPtr, SharedHeap, ALIGNMENT};

/// Typed pointer to the `T` stored at `ptr`.
///
/// # Panics
///
/// Panics if `T` needs more than [`ALIGNMENT`] or the block lies outside
/// committed memory.
pub(crate) fn slot<T>(heap: &Heap, ptr: HeapPtr) -> NonNull<T> {
    assert_align::<T>();
    heap.raw(ptr, size_of::<T>()).cast()
}

fn assert_align<T>() {
    assert!(
        align_of::<T>() <= ALIGNMENT,
        "alignment {} exceeds heap alignment {ALIGNMENT}",
        align_of::<T>()
    );
}

/// Bytes for `cap` values of `T`. Never zero, so zero-sized types and
/// empty requests still map to a real block.
fn byte_len<T>(cap: usize) -> Result<usize, HeapError> {
    cap.checked_mul(size_of::<T>())
        .map(|bytes| bytes.max(1))
        .ok_or(HeapError::OutOfMemory {
            requested: usize::MAX,
            available: 0,
        })
}

/// An owned, uninitialized run of `cap` slots for `T` on a heap.
pub(crate) struct RawBuf<T> {
    heap: SharedHeap,
    ptr: Option<HeapPtr>,
    cap: usize,
    _owns: PhantomData<T>,
}

impl<T> RawBuf<T> {
    /// An empty buffer with no block behind it.
    pub(crate) fn new(heap: &SharedHeap) -> Self {
        assert_align::<T>();
        Self {
            heap: Rc::clone(heap),
            ptr: None,
            cap: 0,
            _owns: PhantomData,
        }
    }

    pub(crate) fn with_capacity(heap: &SharedHeap, cap: usize) -> Result<Self, HeapError> {
        let mut buf = Self::new(heap);
        buf.resize(cap)?;
        Ok(buf)
    }

    pub(crate) fn heap(&self) -> &SharedHeap {
        &self.heap
    }

    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    /// Pointer to slot 0, dangling when there is no block.
    pub(crate) fn base(&self) -> NonNull<T> {
        match self.ptr {
            Some(ptr) => self.heap.raw(ptr, self.cap * size_of::<T>()).cast(),
            None => NonNull::dangling(),
        }
    }

    /// Pointer to slot `i`.
    pub(crate) fn at(&self, i: usize) -> *mut T {
        debug_assert!(i < self.cap, "slot {i} out of capacity {}", self.cap);
        // SAFETY: `i < cap` keeps the offset inside the block.
        unsafe { self.base().as_ptr().add(i) }
    }

    /// Resize the block to exactly `cap` slots, keeping the contents of the
    /// first `min(old, new)` slots. On failure the buffer is unchanged.
    ///
    /// Slots past the new capacity are discarded without being dropped.
    pub(crate) fn resize(&mut self, cap: usize) -> Result<(), HeapError> {
        if cap == self.cap {
            return Ok(());
        }
        if cap == 0 {
            self.release();
            return Ok(());
        }
        let bytes = byte_len::<T>(cap)?;
        let ptr = match self.ptr {
            // SAFETY: the buffer owns its block and holds no references
            // into it; slots are moved bytewise and need no fixup.
            Some(ptr) => unsafe { self.heap.try_realloc(ptr, bytes)? },
            None => self.heap.try_malloc(bytes)?,
        };
        self.ptr = Some(ptr);
        self.cap = cap;
        Ok(())
    }

    /// Move `count` slots starting at `src` to start at `dest`. The ranges
    /// may overlap.
    pub(crate) fn shift(&mut self, src: usize, dest: usize, count: usize) {
        if count == 0 {
            return;
        }
        assert!(src + count <= self.cap && dest + count <= self.cap);
        // SAFETY: both ranges lie inside the block (checked above) and
        // `ptr::copy` permits overlap.
        unsafe { ptr::copy(self.at(src), self.at(dest), count) };
    }

    /// Copy `count` slots starting at `src` into `other` at `dest`.
    pub(crate) fn copy_to(&self, src: usize, other: &mut RawBuf<T>, dest: usize, count: usize) {
        if count == 0 {
            return;
        }
        assert!(src + count <= self.cap && dest + count <= other.cap);
        if let (Some(from), Some(to)) = (self.ptr, other.ptr) {
            let size = size_of::<T>();
            // SAFETY: both ranges lie in blocks owned by these buffers
            // (checked above), and distinct blocks never overlap.
            unsafe {
                self.heap
                    .memcpy(to.add(dest * size), from.add(src * size), count * size);
            }
        }
    }

    /// Free the block. Slot contents are discarded without being dropped.
    pub(crate) fn release(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: the buffer owned the block and forgets it here.
            unsafe { self.heap.free(ptr) };
        }
        self.cap = 0;
    }
}

impl<T> Drop for RawBuf<T> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_heap::HeapConfig;

    fn heap() -> SharedHeap {
        Heap::initialize(HeapConfig::new(4096, 1, 16))
            .unwrap()
            .into_shared()
    }

    #[test]
    fn new_buffer_has_no_block() {
        let heap = heap();
        let buf = RawBuf::<u32>::new(&heap);
        assert_eq!(buf.capacity(), 0);
        assert_eq!(heap.stats().allocated_block_count(), 0);
    }

    #[test]
    fn resize_keeps_prefix() {
        let heap = heap();
        let mut buf = RawBuf::<u32>::with_capacity(&heap, 4).unwrap();
        for i in 0..4 {
            // SAFETY: slot i is inside the 4-slot block.
            unsafe { buf.at(i).write(i as u32 * 10) };
        }
        buf.resize(100).unwrap();
        assert_eq!(buf.capacity(), 100);
        // SAFETY: the first four slots were preserved by the resize.
        let kept: Vec<u32> = (0..4).map(|i| unsafe { buf.at(i).read() }).collect();
        assert_eq!(kept, [0, 10, 20, 30]);
        buf.resize(0).unwrap();
        assert_eq!(heap.stats().allocated_block_count(), 0);
    }

    #[test]
    fn shift_handles_overlap() {
        let heap = heap();
        let mut buf = RawBuf::<u8>::with_capacity(&heap, 6).unwrap();
        for i in 0..6 {
            // SAFETY: slot i is inside the block.
            unsafe { buf.at(i).write(i as u8) };
        }
        buf.shift(0, 2, 4);
        // SAFETY: every slot was written above.
        let all: Vec<u8> = (0..6).map(|i| unsafe { buf.at(i).read() }).collect();
        assert_eq!(all, [0, 1, 0, 1, 2, 3]);
    }

    #[test]
    fn copy_to_fills_other_buffer() {
        let heap = heap();
        let mut a = RawBuf::<u16>::with_capacity(&heap, 3).unwrap();
        let mut b = RawBuf::<u16>::with_capacity(&heap, 5).unwrap();
        for i in 0..3 {
            // SAFETY: slot i is inside the block.
            unsafe { a.at(i).write(i as u16 + 1) };
        }
        a.copy_to(1, &mut b, 3, 2);
        // SAFETY: slots 3 and 4 of `b` were just copied in.
        let tail: Vec<u16> = (3..5).map(|i| unsafe { b.at(i).read() }).collect();
        assert_eq!(tail, [2, 3]);
    }

    #[test]
    fn zero_sized_slots_still_allocate() {
        let heap = heap();
        let buf = RawBuf::<()>::with_capacity(&heap, 8).unwrap();
        assert_eq!(buf.capacity(), 8);
        assert_eq!(heap.stats().allocated_block_count(), 1);
    }
}
