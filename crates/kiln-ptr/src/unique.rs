//! Exclusive ownership of one heap value.
//!
//! A [`UniquePtr`] is either null or the sole owner of a live block holding
//! an initialized `T`. Dropping it (or calling [`reset`](UniquePtr::reset))
//! drops the value and frees the block, once.
//!
//! Rust moves already transfer ownership; [`take`](UniquePtr::take) is the
//! in-place variant that leaves a null pointer behind.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use kiln_heap::{HeapError, HeapPtr, SharedHeap};

use crate::slot::{place, slot, unplace};

/// Exclusive owner of a `T` stored on a Kiln heap.
pub struct UniquePtr<T> {
    heap: SharedHeap,
    ptr: Option<HeapPtr>,
    _owns: PhantomData<T>,
}

impl<T> UniquePtr<T> {
    /// Move `value` into a fresh block on `heap`.
    pub fn new(heap: &SharedHeap, value: T) -> Result<Self, HeapError> {
        let ptr = place(heap, value)?;
        Ok(Self::adopt(heap, Some(ptr)))
    }

    /// A pointer that owns nothing.
    pub fn null(heap: &SharedHeap) -> Self {
        Self::adopt(heap, None)
    }

    /// Take ownership of an existing allocation.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live allocation of `heap` holding an initialized `T`,
    /// and no other owner may free it or drop its value.
    pub unsafe fn from_raw(heap: &SharedHeap, ptr: HeapPtr) -> Self {
        Self::adopt(heap, Some(ptr))
    }

    fn adopt(heap: &SharedHeap, ptr: Option<HeapPtr>) -> Self {
        Self {
            heap: Rc::clone(heap),
            ptr,
            _owns: PhantomData,
        }
    }

    /// The owned value, or `None` when null.
    pub fn get(&self) -> Option<&T> {
        let ptr = self.ptr?;
        // SAFETY: a non-null UniquePtr owns a live, initialized T, and the
        // returned borrow is tied to `self`.
        Some(unsafe { slot::<T>(&self.heap, ptr).as_ref() })
    }

    /// The owned value, mutably, or `None` when null.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let ptr = self.ptr?;
        // SAFETY: as in `get`; `&mut self` makes the borrow exclusive.
        Some(unsafe { slot::<T>(&self.heap, ptr).as_mut() })
    }

    /// Give up ownership without dropping the value or freeing the block.
    /// The caller becomes responsible for both.
    pub fn release(&mut self) -> Option<HeapPtr> {
        self.ptr.take()
    }

    /// Transfer ownership to a new pointer, leaving this one null.
    pub fn take(&mut self) -> Self {
        Self::adopt(&self.heap, self.ptr.take())
    }

    /// Drop the value and free its block. The pointer becomes null.
    pub fn reset(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: the owned block holds an initialized T that only this
            // pointer could drop, and `ptr` was cleared before the drop runs.
            drop(unsafe { unplace::<T>(&self.heap, ptr) });
        }
    }

    /// Drop the current value, then adopt `ptr`.
    ///
    /// # Safety
    ///
    /// Same contract as [`from_raw`](Self::from_raw) when `ptr` is `Some`.
    pub unsafe fn reset_raw(&mut self, ptr: Option<HeapPtr>) {
        if ptr.is_some() && ptr == self.ptr {
            return;
        }
        self.reset();
        self.ptr = ptr;
    }

    /// Move the value out and free its block.
    pub fn into_inner(mut self) -> Option<T> {
        let ptr = self.ptr.take()?;
        // SAFETY: as in `reset`; the value is returned instead of dropped.
        Some(unsafe { unplace::<T>(&self.heap, ptr) })
    }

    /// Whether this pointer owns nothing.
    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Address of the owned block.
    ///
    /// The address is for inspection. Freeing or writing it through the
    /// heap is `unsafe`, since this pointer still owns the value:
    ///
    /// ```compile_fail
    /// # use kiln_heap::{Heap, HeapConfig};
    /// # use kiln_ptr::UniquePtr;
    /// let heap = Heap::initialize(HeapConfig::default()).unwrap().into_shared();
    /// let p = UniquePtr::new(&heap, 1u32).unwrap();
    /// heap.free(p.as_ptr().unwrap());
    /// ```
    pub fn as_ptr(&self) -> Option<HeapPtr> {
        self.ptr
    }

    /// The heap the value lives on.
    pub fn heap(&self) -> &SharedHeap {
        &self.heap
    }
}

impl<T> Drop for UniquePtr<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T> Deref for UniquePtr<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced a null UniquePtr"),
        }
    }
}

impl<T> DerefMut for UniquePtr<T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.get_mut() {
            Some(value) => value,
            None => panic!("dereferenced a null UniquePtr"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for UniquePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("UniquePtr").field(value).finish(),
            None => f.write_str("UniquePtr(null)"),
        }
    }
}
