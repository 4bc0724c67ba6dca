//! The growable linear memory region the heap lives in.
//!
//! [`LinearMemory`] stands in for a WebAssembly linear memory: one
//! contiguous byte range with a committed size that grows in whole pages up
//! to a fixed maximum and never shrinks. The maximum is reserved when the
//! memory is created, so the base address is stable for the memory's
//! lifetime and payload addresses stay valid across growth.
//!
//! This module and [`raw`](crate::raw) are the only places in the crate
//! that touch the region through raw pointers. Everything above them works
//! with offsets and bounds-checked slices.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::HeapError;
use crate::{ALIGNMENT, HEADER_SIZE};

/// A page-granular, grow-only byte region.
///
/// Bytes past the committed size are reserved but unreachable through the
/// accessors; they become visible (zero-filled) as the memory grows.
pub struct LinearMemory {
    base: NonNull<u8>,
    layout: Layout,
    /// Committed bytes. Always a multiple of `page_size`.
    size: usize,
    page_size: usize,
}

impl LinearMemory {
    /// Reserve `max_pages` pages and commit `initial_pages` of them.
    ///
    /// Returns `Err(HeapError::OutOfMemory)` if the host cannot provide the
    /// reservation, or `Err(HeapError::InvalidConfig)` for a zero-sized or
    /// overflowing request.
    pub fn new(page_size: usize, initial_pages: u32, max_pages: u32) -> Result<Self, HeapError> {
        let max_bytes = page_size
            .checked_mul(max_pages as usize)
            .filter(|&bytes| bytes > 0)
            .ok_or_else(|| HeapError::InvalidConfig {
                reason: format!("cannot reserve {max_pages} pages of {page_size} bytes"),
            })?;
        let layout =
            Layout::from_size_align(max_bytes, ALIGNMENT).map_err(|e| HeapError::InvalidConfig {
                reason: e.to_string(),
            })?;

        // SAFETY: layout has a non-zero size (checked above).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(raw).ok_or(HeapError::OutOfMemory {
            requested: max_bytes,
            available: 0,
        })?;

        Ok(Self {
            base,
            layout,
            size: page_size * initial_pages.min(max_pages) as usize,
            page_size,
        })
    }

    /// Grow by enough whole pages to cover `requested` bytes plus one block
    /// header.
    ///
    /// Returns the previous end of memory (the first newly committed byte),
    /// or `Err(HeapError::OutOfMemory)` if the page limit would be exceeded.
    /// Newly committed bytes are zero.
    pub fn grow(&mut self, requested: usize) -> Result<usize, HeapError> {
        let out_of_memory = HeapError::OutOfMemory {
            requested,
            available: self.remaining(),
        };
        let new_size = requested
            .checked_add(HEADER_SIZE)
            .map(|needed| needed.div_ceil(self.page_size))
            .and_then(|pages| pages.checked_mul(self.page_size))
            .and_then(|bytes| self.size.checked_add(bytes))
            .filter(|&size| size <= self.max_size())
            .ok_or(out_of_memory)?;

        let old_size = self.size;
        self.size = new_size;
        log::debug!(
            "linear memory grew from {old_size} to {new_size} bytes ({} pages)",
            self.pages()
        );
        Ok(old_size)
    }

    /// Committed size in bytes (the current end of memory).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size the memory may grow to, in bytes.
    pub fn max_size(&self) -> usize {
        self.layout.size()
    }

    /// Bytes the memory can still grow by.
    pub fn remaining(&self) -> usize {
        self.max_size() - self.size
    }

    /// Size of one page in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of committed pages.
    pub fn pages(&self) -> usize {
        self.size / self.page_size
    }

    /// Whether `[offset, offset + len)` lies inside committed memory.
    pub fn contains(&self, offset: usize, len: usize) -> bool {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= self.size)
    }

    /// Borrow committed bytes.
    ///
    /// # Panics
    ///
    /// Panics if the range is not inside committed memory.
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        self.assert_contains(offset, len);
        // SAFETY: the range is inside the committed part of a live allocation,
        // and `&self` keeps any `bytes_mut` borrow out.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(offset), len) }
    }

    /// Mutably borrow committed bytes.
    ///
    /// # Panics
    ///
    /// Panics if the range is not inside committed memory.
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        self.assert_contains(offset, len);
        // SAFETY: as in `bytes`; `&mut self` makes the borrow unique.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr().add(offset), len) }
    }

    /// Raw pointer to the byte at `offset`, valid for `len` bytes.
    ///
    /// The pointer stays valid until the memory is dropped; growth never
    /// moves the region. Dereferencing it is up to the caller.
    ///
    /// # Panics
    ///
    /// Panics if the range is not inside committed memory.
    pub fn ptr_at(&self, offset: usize, len: usize) -> NonNull<u8> {
        self.assert_contains(offset, len);
        // SAFETY: offset <= size <= allocation size, so the result stays in
        // (or one past) the allocation and is non-null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    pub(crate) fn assert_contains(&self, offset: usize, len: usize) {
        assert!(
            self.contains(offset, len),
            "range {offset:#x}+{len} outside committed memory ({} bytes)",
            self.size,
        );
    }
}

impl Drop for LinearMemory {
    fn drop(&mut self) {
        // SAFETY: base was returned by alloc_zeroed with exactly this layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}
