//! FIFO queue over a ring buffer.
//!
//! [`Queue`] stores its values in one block as a ring: `front` is the slot
//! of the oldest value and the live run of `len` values may wrap past the
//! last slot back to slot 0. Growing a wrapped ring moves the values into a
//! fresh block in order, so the grown ring starts unwrapped at slot 0.

#![allow(unsafe_code)]

use std::fmt;
use std::iter::FusedIterator;

use kiln_heap::{HeapError, SharedHeap};

use crate::raw::RawBuf;
use crate::DEFAULT_CHUNK_SIZE;

/// A first-in first-out queue of `T` on a Kiln heap.
pub struct Queue<T> {
    buf: RawBuf<T>,
    front: usize,
    len: usize,
    chunk: usize,
}

impl<T> Queue<T> {
    /// An empty queue. No block is allocated until the first enqueue.
    pub fn new(heap: &SharedHeap) -> Self {
        Self::with_chunk_size(heap, DEFAULT_CHUNK_SIZE)
    }

    /// An empty queue with room for `capacity` values.
    pub fn with_capacity(heap: &SharedHeap, capacity: usize) -> Result<Self, HeapError> {
        Ok(Self {
            buf: RawBuf::with_capacity(heap, capacity)?,
            front: 0,
            len: 0,
            chunk: DEFAULT_CHUNK_SIZE,
        })
    }

    /// An empty queue that grows `chunk` slots at a time.
    ///
    /// # Panics
    ///
    /// Panics if `chunk` is zero.
    pub fn with_chunk_size(heap: &SharedHeap, chunk: usize) -> Self {
        assert!(chunk > 0, "chunk size must be positive");
        Self {
            buf: RawBuf::new(heap),
            front: 0,
            len: 0,
            chunk,
        }
    }

    /// Number of queued values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the ring.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Whether the live values currently run past the last slot into slot 0.
    pub fn is_wrapped(&self) -> bool {
        self.len > 0 && self.front + self.len > self.capacity()
    }

    /// The heap holding the values.
    pub fn heap(&self) -> &SharedHeap {
        self.buf.heap()
    }

    fn slot(&self, logical: usize) -> *mut T {
        self.buf.at((self.front + logical) % self.capacity())
    }

    /// Move the live values into a fresh `capacity`-slot block, oldest
    /// first at slot 0.
    fn relocate(&mut self, capacity: usize) -> Result<(), HeapError> {
        debug_assert!(capacity >= self.len);
        let mut fresh = RawBuf::with_capacity(self.buf.heap(), capacity)?;
        let head = (self.capacity() - self.front).min(self.len);
        self.buf.copy_to(self.front, &mut fresh, 0, head);
        self.buf.copy_to(0, &mut fresh, head, self.len - head);
        self.buf = fresh;
        self.front = 0;
        Ok(())
    }

    fn grow(&mut self) -> Result<(), HeapError> {
        let capacity = self
            .capacity()
            .checked_add(self.chunk)
            .ok_or(HeapError::OutOfMemory {
                requested: usize::MAX,
                available: 0,
            })?;
        if self.is_wrapped() {
            log::trace!("queue grow to {capacity} slots relocates wrapped values");
            self.relocate(capacity)
        } else {
            self.buf.resize(capacity)
        }
    }

    /// Append `value` at the back, growing by one chunk if full. On failure
    /// the value is dropped and the queue is unchanged.
    pub fn enqueue(&mut self, value: T) -> Result<(), HeapError> {
        if self.len == self.capacity() {
            self.grow()?;
        }
        // SAFETY: `len < capacity`, so the slot after the back is unused.
        unsafe { self.slot(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Remove and return the front value, or `None` when empty.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        // SAFETY: the front slot is initialized and leaves the live range
        // below, so it is read exactly once.
        let value = unsafe { self.slot(0).read() };
        self.front = (self.front + 1) % self.capacity();
        self.len -= 1;
        Some(value)
    }

    /// Remove and return the front value, or `T::default()` when empty.
    pub fn dequeue_or_default(&mut self) -> T
    where
        T: Default,
    {
        self.dequeue().unwrap_or_default()
    }

    /// The front value without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.get(0)
    }

    /// The value `index` places behind the front.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        // SAFETY: logical indices below `len` map to initialized slots.
        Some(unsafe { &*self.slot(index) })
    }

    /// Drop every value. The block is kept.
    pub fn clear(&mut self) {
        while self.dequeue().is_some() {}
        self.front = 0;
    }

    /// Shrink the block to the smallest whole number of chunks that holds
    /// the current values, unwrapping the ring.
    pub fn compact(&mut self) -> Result<(), HeapError> {
        if self.len == 0 {
            self.buf.release();
            self.front = 0;
            return Ok(());
        }
        let capacity = self.len.div_ceil(self.chunk) * self.chunk;
        if self.is_wrapped() {
            return self.relocate(capacity);
        }
        if self.front > 0 {
            self.buf.shift(self.front, 0, self.len);
            self.front = 0;
        }
        self.buf.resize(capacity)
    }

    /// Drop every value and free the block.
    pub fn deallocate(&mut self) {
        self.clear();
        self.buf.release();
    }

    /// Iterate from front to back.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            queue: self,
            index: 0,
        }
    }
}

impl<T: Clone> Queue<T> {
    /// Copy the values, front first, into a new block of the same capacity.
    pub fn try_clone(&self) -> Result<Self, HeapError> {
        let mut copy = Self {
            buf: RawBuf::with_capacity(self.heap(), self.capacity())?,
            front: 0,
            len: 0,
            chunk: self.chunk,
        };
        for value in self {
            copy.enqueue(value.clone())?;
        }
        Ok(copy)
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: Clone> Clone for Queue<T> {
    fn clone(&self) -> Self {
        self.try_clone()
            .unwrap_or_else(|e| panic!("Queue clone failed: {e}"))
    }
}

impl<T: PartialEq> PartialEq for Queue<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for Queue<T> {}

impl<T: fmt::Debug> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a, T> IntoIterator for &'a Queue<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Front-to-back iterator over a [`Queue`].
pub struct Iter<'a, T> {
    queue: &'a Queue<T>,
    index: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let value = self.queue.get(self.index)?;
        self.index += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.queue.len - self.index;
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}
