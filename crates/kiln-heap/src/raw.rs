//! Byte-range primitives over linear memory: fill, copy, move, compare.
//!
//! These back the heap's `memset`/`memcpy`/`memmove`/`memcmp`. Every
//! function bounds-checks its ranges against committed memory before
//! touching it.

#![allow(unsafe_code)]

use std::cmp::Ordering;
use std::ptr;

use crate::memory::LinearMemory;

impl LinearMemory {
    /// Set `len` bytes at `offset` to `value`.
    pub fn fill(&mut self, offset: usize, value: u8, len: usize) {
        self.bytes_mut(offset, len).fill(value);
    }

    /// Copy `len` bytes from `src` to `dest`. The ranges must not overlap.
    ///
    /// # Panics
    ///
    /// Panics if either range is outside committed memory or the ranges
    /// overlap.
    pub fn copy_nonoverlapping(&mut self, src: usize, dest: usize, len: usize) {
        self.assert_contains(src, len);
        self.assert_contains(dest, len);
        assert!(
            src + len <= dest || dest + len <= src || len == 0,
            "copy ranges overlap: {src:#x}+{len} and {dest:#x}+{len}",
        );
        let from = self.ptr_at(src, len).as_ptr();
        let to = self.ptr_at(dest, len).as_ptr();
        // SAFETY: both ranges are committed and disjoint (asserted above).
        unsafe { ptr::copy_nonoverlapping(from, to, len) }
    }

    /// Copy `len` bytes from `src` to `dest`; the ranges may overlap.
    ///
    /// # Panics
    ///
    /// Panics if either range is outside committed memory.
    pub fn copy_within(&mut self, src: usize, dest: usize, len: usize) {
        self.assert_contains(src, len);
        self.assert_contains(dest, len);
        let from = self.ptr_at(src, len).as_ptr();
        let to = self.ptr_at(dest, len).as_ptr();
        // SAFETY: both ranges are committed; `ptr::copy` handles overlap.
        unsafe { ptr::copy(from, to, len) }
    }

    /// Compare `len` bytes at `a` and `b` lexicographically.
    pub fn compare(&self, a: usize, b: usize, len: usize) -> Ordering {
        self.bytes(a, len).cmp(self.bytes(b, len))
    }
}
