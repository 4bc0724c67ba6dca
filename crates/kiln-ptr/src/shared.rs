//! Reference-counted sharing of one heap value.
//!
//! Every non-null [`SharedPtr`] points at two blocks: the payload and a
//! control block holding the owner count and the payload's drop routine.
//! Clones and casts share both. The owner that takes the count from 1 to 0
//! drops the payload and frees the two blocks.
//!
//! The drop routine is captured when the value is first shared, so a value
//! held only through a [`cast`](SharedPtr::cast) or
//! [`erase`](SharedPtr::erase)d handle is still dropped as its original
//! type.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use kiln_heap::{Heap, HeapError, HeapPtr, SharedHeap, ALIGNMENT};

use crate::slot::{place, slot, unplace};

/// Owner count and payload destructor, stored in its own heap block.
#[repr(C)]
struct Control {
    count: usize,
    drop_payload: unsafe fn(NonNull<u8>),
}

/// # Safety
///
/// `payload` must point at an initialized `T` that is not used afterwards.
unsafe fn drop_payload<T>(payload: NonNull<u8>) {
    // SAFETY: upheld by the caller.
    unsafe { ptr::drop_in_place(payload.cast::<T>().as_ptr()) }
}

#[derive(Clone, Copy, PartialEq, Eq)]
struct Share {
    payload: HeapPtr,
    control: HeapPtr,
}

/// Shared owner of a `T` stored on a Kiln heap.
pub struct SharedPtr<T> {
    heap: SharedHeap,
    share: Option<Share>,
    _owns: PhantomData<T>,
}

impl<T> SharedPtr<T> {
    /// Move `value` into a fresh block and start sharing it with a count of 1.
    pub fn new(heap: &SharedHeap, value: T) -> Result<Self, HeapError> {
        let control = new_control::<T>(heap)?;
        match place(heap, value) {
            Ok(payload) => Ok(Self::adopt(heap, Some(Share { payload, control }))),
            Err(e) => {
                // SAFETY: the control block was just placed and is unshared.
                drop(unsafe { unplace::<Control>(heap, control) });
                Err(e)
            }
        }
    }

    /// A pointer that shares nothing. Its use count is 0.
    pub fn null(heap: &SharedHeap) -> Self {
        Self::adopt(heap, None)
    }

    /// Start sharing an existing allocation with a count of 1.
    ///
    /// If the control block cannot be allocated the error is returned and
    /// the caller keeps ownership of `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live allocation of `heap` holding an initialized `T`,
    /// and no other owner may free it or drop its value.
    pub unsafe fn from_raw(heap: &SharedHeap, ptr: HeapPtr) -> Result<Self, HeapError> {
        let control = new_control::<T>(heap)?;
        Ok(Self::adopt(
            heap,
            Some(Share {
                payload: ptr,
                control,
            }),
        ))
    }

    fn adopt(heap: &SharedHeap, share: Option<Share>) -> Self {
        Self {
            heap: Rc::clone(heap),
            share,
            _owns: PhantomData,
        }
    }

    fn control(&self, share: Share) -> NonNull<Control> {
        slot::<Control>(&self.heap, share.control)
    }

    /// Number of live owners of the value, or 0 when null.
    pub fn use_count(&self) -> usize {
        match self.share {
            // SAFETY: a live share keeps its control block allocated.
            Some(share) => unsafe { self.control(share).as_ref().count },
            None => 0,
        }
    }

    /// The shared value, or `None` when null.
    pub fn get(&self) -> Option<&T> {
        let share = self.share?;
        // SAFETY: the payload stays initialized while any owner lives, and
        // mutable access is only granted to a sole owner.
        Some(unsafe { slot::<T>(&self.heap, share.payload).as_ref() })
    }

    /// The value, mutably, if this is its only owner.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.use_count() != 1 {
            return None;
        }
        let share = self.share?;
        // SAFETY: a count of 1 means no other handle can observe the value.
        Some(unsafe { slot::<T>(&self.heap, share.payload).as_mut() })
    }

    /// Whether both pointers share the same value. Two nulls compare equal.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.share == b.share
    }

    /// Give up this share. The value is dropped if it was the last one.
    pub fn reset(&mut self) {
        let Some(share) = self.share.take() else {
            return;
        };
        let control = self.control(share).as_ptr();
        // SAFETY: the control block is live until the count reaches 0.
        let remaining = unsafe {
            (*control).count -= 1;
            (*control).count
        };
        if remaining > 0 {
            return;
        }
        // SAFETY: this was the last owner. The drop routine matches the
        // payload's original type, and neither block is used afterwards.
        unsafe {
            let drop_fn = (*control).drop_payload;
            let payload = self.heap.raw(share.payload, 0);
            drop_fn(payload);
            self.heap.free(share.payload);
            self.heap.free(share.control);
        }
        log::trace!("shared payload {} released", share.payload);
    }

    /// A handle to the same value viewed as a `U`, sharing the count.
    ///
    /// # Safety
    ///
    /// The payload must be a valid `U` for as long as the returned pointer
    /// reads it. The value is still dropped as its original type.
    ///
    /// # Panics
    ///
    /// Panics if `U` needs more than the heap's alignment or does not fit
    /// in the payload block.
    pub unsafe fn cast<U>(&self) -> SharedPtr<U> {
        assert!(align_of::<U>() <= ALIGNMENT, "cast target is over-aligned");
        if let Some(share) = self.share {
            let capacity = self.heap.usable_size(share.payload).unwrap_or(0);
            assert!(
                size_of::<U>() <= capacity,
                "cast target of {} bytes exceeds {capacity}-byte payload",
                size_of::<U>()
            );
        }
        self.retain();
        SharedPtr::adopt(&self.heap, self.share)
    }

    /// A type-erased handle to the same value, sharing the count.
    pub fn erase(&self) -> SharedPtr<()> {
        self.retain();
        SharedPtr::adopt(&self.heap, self.share)
    }

    fn retain(&self) {
        if let Some(share) = self.share {
            // SAFETY: the control block is live while this share is.
            unsafe { (*self.control(share).as_ptr()).count += 1 };
        }
    }

    /// Address of the payload block. The block belongs to every owner, so
    /// the heap's raw methods need `unsafe` to touch it.
    pub fn as_ptr(&self) -> Option<HeapPtr> {
        self.share.map(|share| share.payload)
    }

    /// Whether this pointer shares nothing.
    pub fn is_null(&self) -> bool {
        self.share.is_none()
    }

    /// The heap the value lives on.
    pub fn heap(&self) -> &SharedHeap {
        &self.heap
    }
}

fn new_control<T>(heap: &Heap) -> Result<HeapPtr, HeapError> {
    place(
        heap,
        Control {
            count: 1,
            drop_payload: drop_payload::<T>,
        },
    )
}

impl<T> Clone for SharedPtr<T> {
    fn clone(&self) -> Self {
        self.retain();
        Self::adopt(&self.heap, self.share)
    }

    fn clone_from(&mut self, source: &Self) {
        if Self::ptr_eq(self, source) {
            return;
        }
        source.retain();
        self.reset();
        self.heap = Rc::clone(&source.heap);
        self.share = source.share;
    }
}

impl<T> Drop for SharedPtr<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Deref for SharedPtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced a null SharedPtr"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f
                .debug_struct("SharedPtr")
                .field("value", value)
                .field("use_count", &self.use_count())
                .finish(),
            None => f.write_str("SharedPtr(null)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_test_utils::{test_heap, DropCounter};

    #[test]
    fn new_starts_with_one_owner() {
        let heap = test_heap();
        let p = SharedPtr::new(&heap, 12i32).unwrap();
        assert_eq!(p.use_count(), 1);
        assert_eq!(*p, 12);
        assert_eq!(heap.stats().allocated_block_count(), 2);
    }

    #[test]
    fn null_has_zero_count() {
        let heap = test_heap();
        let p = SharedPtr::<u8>::null(&heap);
        assert_eq!(p.use_count(), 0);
        assert!(p.get().is_none());
    }

    #[test]
    fn count_tracks_clones_and_drops() {
        let heap = test_heap();
        let counter = DropCounter::new();
        let a = SharedPtr::new(&heap, counter.track(1)).unwrap();
        let b = a.clone();
        let c = b.clone();
        assert_eq!(a.use_count(), 3);
        drop(b);
        assert_eq!(a.use_count(), 2);
        drop(a);
        assert_eq!(c.use_count(), 1);
        assert_eq!(counter.count(), 0);
        drop(c);
        assert_eq!(counter.count(), 1);
        assert_eq!(heap.stats().allocated_block_count(), 0);
    }

    #[test]
    fn clone_from_self_is_noop() {
        let heap = test_heap();
        let mut a = SharedPtr::new(&heap, 5u32).unwrap();
        let b = a.clone();
        a.clone_from(&b);
        assert_eq!(a.use_count(), 2);
    }

    #[test]
    fn clone_from_releases_previous_share() {
        let heap = test_heap();
        let counter = DropCounter::new();
        let mut a = SharedPtr::new(&heap, counter.track(1)).unwrap();
        let b = SharedPtr::new(&heap, counter.track(2)).unwrap();
        a.clone_from(&b);
        assert_eq!(counter.count(), 1);
        assert_eq!(a.id, 2);
        assert_eq!(b.use_count(), 2);
    }

    #[test]
    fn get_mut_requires_sole_owner() {
        let heap = test_heap();
        let mut a = SharedPtr::new(&heap, 1u8).unwrap();
        *a.get_mut().unwrap() = 2;
        let b = a.clone();
        assert!(a.get_mut().is_none());
        drop(b);
        assert_eq!(a.get_mut().copied(), Some(2));
    }

    #[test]
    fn erased_handle_drops_original_type() {
        let heap = test_heap();
        let counter = DropCounter::new();
        let typed = SharedPtr::new(&heap, counter.track(9)).unwrap();
        let erased = typed.erase();
        assert_eq!(erased.use_count(), 2);
        drop(typed);
        assert_eq!(counter.count(), 0);
        drop(erased);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn cast_shares_count_and_bytes() {
        let heap = test_heap();
        let word = SharedPtr::new(&heap, 0x0102_0304u32).unwrap();
        // SAFETY: any four bytes are a valid [u8; 4].
        let bytes = unsafe { word.cast::<[u8; 4]>() };
        assert_eq!(word.use_count(), 2);
        assert_eq!(*bytes, 0x0102_0304u32.to_ne_bytes());
        assert!(SharedPtr::ptr_eq(&bytes.erase(), &word.erase()));
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn cast_to_larger_type_panics() {
        let heap = test_heap();
        let small = SharedPtr::new(&heap, 1u8).unwrap();
        // SAFETY: the size check fires before any read.
        let _ = unsafe { small.cast::<[u64; 4]>() };
    }

    #[test]
    fn reset_releases_one_share() {
        let heap = test_heap();
        let mut a = SharedPtr::new(&heap, 3u16).unwrap();
        let b = a.clone();
        a.reset();
        assert!(a.is_null());
        assert_eq!(b.use_count(), 1);
    }

    #[test]
    fn from_raw_adopts_allocation() {
        let heap = test_heap();
        let raw = heap.malloc(8).unwrap();
        // SAFETY: `raw` is a fresh 8-byte block owned by this test, and
        // after the write it holds a u64.
        let p = unsafe {
            heap.write(raw, &7u64.to_ne_bytes());
            SharedPtr::<u64>::from_raw(&heap, raw)
        }
        .unwrap();
        assert_eq!(*p, 7);
        drop(p);
        assert_eq!(heap.allocation_size(raw), None);
    }
}
