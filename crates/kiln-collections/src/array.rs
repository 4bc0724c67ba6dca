//! Contiguous growable array with chunked growth.
//!
//! An [`Array`] keeps `len <= capacity` values in one heap block. When it
//! runs out of room it grows by a fixed chunk of slots instead of doubling.
//! Cloning always copies into a new block; two arrays never share storage.

#![allow(unsafe_code)]

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut, Index, IndexMut};
use std::ptr;
use std::slice;

use kiln_heap::{HeapError, SharedHeap};

use crate::raw::RawBuf;
use crate::DEFAULT_CHUNK_SIZE;

/// A growable array of `T` on a Kiln heap.
pub struct Array<T> {
    buf: RawBuf<T>,
    len: usize,
    chunk: usize,
}

impl<T> Array<T> {
    /// An empty array. No block is allocated until the first insert.
    pub fn new(heap: &SharedHeap) -> Self {
        Self::with_chunk_size(heap, DEFAULT_CHUNK_SIZE)
    }

    /// An empty array with room for `capacity` values.
    pub fn with_capacity(heap: &SharedHeap, capacity: usize) -> Result<Self, HeapError> {
        Ok(Self {
            buf: RawBuf::with_capacity(heap, capacity)?,
            len: 0,
            chunk: DEFAULT_CHUNK_SIZE,
        })
    }

    /// An empty array that grows `chunk` slots at a time.
    ///
    /// # Panics
    ///
    /// Panics if `chunk` is zero.
    pub fn with_chunk_size(heap: &SharedHeap, chunk: usize) -> Self {
        assert!(chunk > 0, "chunk size must be positive");
        Self {
            buf: RawBuf::new(heap),
            len: 0,
            chunk,
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the array holds no values.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the current block.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Growth increment in slots.
    pub fn chunk_size(&self) -> usize {
        self.chunk
    }

    /// The heap holding the values.
    pub fn heap(&self) -> &SharedHeap {
        self.buf.heap()
    }

    fn reserve_one(&mut self) -> Result<(), HeapError> {
        if self.len == self.capacity() {
            let cap = self.capacity().checked_add(self.chunk).ok_or(
                HeapError::OutOfMemory {
                    requested: usize::MAX,
                    available: 0,
                },
            )?;
            self.buf.resize(cap)?;
        }
        Ok(())
    }

    /// Append `value`, growing by one chunk if full. On failure the value
    /// is dropped and the array is unchanged.
    pub fn add(&mut self, value: T) -> Result<(), HeapError> {
        self.reserve_one()?;
        // SAFETY: `len < capacity` after `reserve_one`; the slot is unused.
        unsafe { self.buf.at(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Insert `value` at `index`, shifting later values right.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: T) -> Result<(), HeapError> {
        assert!(
            index <= self.len,
            "insert index {index} out of bounds (len {})",
            self.len
        );
        self.reserve_one()?;
        self.buf.shift(index, index + 1, self.len - index);
        // SAFETY: slot `index` was vacated by the shift.
        unsafe { self.buf.at(index).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Remove and return the value at `index`, shifting later values left.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "remove index {index} out of bounds (len {})",
            self.len
        );
        // SAFETY: slot `index` is initialized; the shift then overwrites it
        // with its successors, so it is read exactly once.
        let value = unsafe { self.buf.at(index).read() };
        self.buf.shift(index + 1, index, self.len - index - 1);
        self.len -= 1;
        value
    }

    /// Remove and return the last value.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: slot `len` was the last initialized one and is now outside
        // the live range.
        Some(unsafe { self.buf.at(self.len).read() })
    }

    /// Drop every value. The block is kept.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        // SAFETY: `len < self.len <= capacity`.
        let start = unsafe { self.buf.base().as_ptr().add(len) };
        let tail = ptr::slice_from_raw_parts_mut(start, self.len - len);
        self.len = len;
        // SAFETY: the tail slots were initialized and are no longer counted
        // in `len`, so a panicking destructor cannot cause a double drop.
        unsafe { ptr::drop_in_place(tail) };
    }

    /// Reallocate to exactly `capacity` slots, dropping values past it.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), HeapError> {
        self.truncate(capacity);
        self.buf.resize(capacity)
    }

    /// The values as a slice.
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: the first `len` slots are initialized, and `base` is
        // non-null and aligned even when no block exists.
        unsafe { slice::from_raw_parts(self.buf.base().as_ptr(), self.len) }
    }

    /// The values as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in `as_slice`, with exclusive access through `&mut self`.
        unsafe { slice::from_raw_parts_mut(self.buf.base().as_ptr(), self.len) }
    }

    /// Position of the first value equal to `value`.
    pub fn index_of(&self, value: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.as_slice().iter().position(|v| v == value)
    }
}

impl<T: Clone> Array<T> {
    /// A new array on `heap` holding clones of `values`.
    pub fn from_slice(heap: &SharedHeap, values: &[T]) -> Result<Self, HeapError> {
        let mut array = Self::with_capacity(heap, values.len())?;
        array.extend_from_slice(values)?;
        Ok(array)
    }

    /// Append clones of `values`. Stops at the first allocation failure.
    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<(), HeapError> {
        let needed = self.len + values.len();
        if needed > self.capacity() {
            let chunks = needed.div_ceil(self.chunk);
            self.buf.resize(chunks * self.chunk)?;
        }
        for value in values {
            self.add(value.clone())?;
        }
        Ok(())
    }

    /// Deep copy into a new block of the same capacity.
    pub fn try_clone(&self) -> Result<Self, HeapError> {
        let mut copy = Self {
            buf: RawBuf::with_capacity(self.heap(), self.capacity())?,
            len: 0,
            chunk: self.chunk,
        };
        for value in self.as_slice() {
            copy.add(value.clone())?;
        }
        Ok(copy)
    }
}

impl<T> Drop for Array<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> Deref for Array<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for Array<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T> Index<usize> for Array<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        assert!(
            index < self.len,
            "index {index} out of bounds (len {})",
            self.len
        );
        &self.as_slice()[index]
    }
}

impl<T> IndexMut<usize> for Array<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        assert!(
            index < self.len,
            "index {index} out of bounds (len {})",
            self.len
        );
        &mut self.as_mut_slice()[index]
    }
}

impl<T: Clone> Clone for Array<T> {
    /// # Panics
    ///
    /// Panics if the heap cannot hold the copy; use
    /// [`try_clone`](Array::try_clone) to handle that case.
    fn clone(&self) -> Self {
        self.try_clone()
            .unwrap_or_else(|e| panic!("Array clone failed: {e}"))
    }
}

impl<T: PartialEq> PartialEq for Array<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq> Eq for Array<T> {}

impl<T: Hash> Hash for Array<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<'a, T> IntoIterator for &'a Array<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'a, T> IntoIterator for &'a mut Array<T> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}
