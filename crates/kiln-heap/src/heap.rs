//! The public heap: malloc/free/calloc/realloc and the mem* utilities.
//!
//! [`Heap`] wraps the [`BlockAllocator`] in a `RefCell` so that every
//! container and smart pointer can share one heap through a
//! [`SharedHeap`] (`Rc<Heap>`). The heap is single-threaded: it is neither
//! `Send` nor `Sync`, and no method calls back into user code, so the
//! inner borrow never overlaps itself.
//!
//! The raw surface follows the C allocator contract: failures collapse to
//! `None` (null) or a no-op. The `try_*` methods report why.
//!
//! # Ownership
//!
//! Allocating is safe. Every method that frees an address or reads or
//! writes the bytes behind one is `unsafe`, like `GlobalAlloc::dealloc`:
//! the heap can check that an address names a block, but not that the
//! caller owns it. Smart pointers and containers keep typed values in
//! their blocks and hand the addresses out, so freeing or overwriting such
//! a block from outside would drop or read a value that is gone.
//!
//! ```compile_fail
//! # use kiln_heap::{Heap, HeapConfig};
//! let heap = Heap::initialize(HeapConfig::default()).unwrap();
//! let p = heap.malloc(8).unwrap();
//! heap.free(p); // needs an `unsafe` block
//! ```

#![allow(unsafe_code)]

use std::cell::RefCell;
use std::cmp::Ordering;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::address::HeapPtr;
use crate::allocator::BlockAllocator;
use crate::config::HeapConfig;
use crate::error::{HeapError, OpResult};
use crate::stats::HeapStats;

/// Shared handle to a heap.
pub type SharedHeap = Rc<Heap>;

/// A block-structured heap over its own linear memory.
pub struct Heap {
    allocator: RefCell<BlockAllocator>,
}

impl Heap {
    /// Reserve linear memory and lay the first free block over it.
    ///
    /// This is the bootstrap call that must precede any allocation. The
    /// heap starts at `config.data_end + config.heap_offset`.
    pub fn initialize(config: HeapConfig) -> Result<Self, HeapError> {
        Ok(Self {
            allocator: RefCell::new(BlockAllocator::new(&config)?),
        })
    }

    /// Wrap this heap in an `Rc` for sharing.
    pub fn into_shared(self) -> SharedHeap {
        Rc::new(self)
    }

    // ── allocation ──────────────────────────────────────────────────

    /// Allocate `size` bytes. Returns `None` for zero size or when memory
    /// is exhausted.
    pub fn malloc(&self, size: usize) -> Option<HeapPtr> {
        self.allocator.borrow_mut().malloc(size)
    }

    /// Allocate `size` bytes, reporting why no block was handed out.
    ///
    /// A zero size is [`HeapError::ZeroSize`].
    pub fn try_malloc(&self, size: usize) -> Result<HeapPtr, HeapError> {
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }
        self.malloc(size).ok_or_else(|| HeapError::OutOfMemory {
            requested: size,
            available: self.allocator.borrow().memory().remaining(),
        })
    }

    /// Release an allocation. Null, already-freed and foreign pointers are
    /// ignored (and logged).
    ///
    /// # Safety
    ///
    /// The caller must own the allocation behind `ptr`. No reference into
    /// it may be live, and no other owner may use or free it afterwards.
    pub unsafe fn free(&self, ptr: impl Into<Option<HeapPtr>>) {
        if let Some(ptr) = ptr.into() {
            // SAFETY: forwarded from the caller.
            if let Err(e) = unsafe { self.try_free(ptr) } {
                log::warn!("free({ptr}) ignored: {e}");
            }
        }
    }

    /// Release an allocation, reporting why it could not be released.
    ///
    /// # Safety
    ///
    /// Same contract as [`free`](Self::free).
    pub unsafe fn try_free(&self, ptr: HeapPtr) -> OpResult {
        self.allocator.borrow_mut().free(ptr)
    }

    /// Release an allocation whose requested size the caller tracked.
    ///
    /// A size that disagrees with the block's record is a caller bug: it
    /// trips a debug assertion and the block is left allocated.
    ///
    /// # Safety
    ///
    /// Same contract as [`free`](Self::free).
    pub unsafe fn free_sized(&self, ptr: impl Into<Option<HeapPtr>>, size: usize) {
        let Some(ptr) = ptr.into() else {
            return;
        };
        // SAFETY: forwarded from the caller.
        match unsafe { self.try_free_sized(ptr, size) } {
            Ok(()) => {}
            Err(e @ HeapError::SizeMismatch { .. }) => {
                debug_assert!(false, "free_sized({ptr}, {size}): {e}");
                log::warn!("free_sized({ptr}, {size}) ignored: {e}");
            }
            Err(e) => log::warn!("free_sized({ptr}, {size}) ignored: {e}"),
        }
    }

    /// Checked form of [`free_sized`](Self::free_sized).
    ///
    /// # Safety
    ///
    /// Same contract as [`free`](Self::free).
    pub unsafe fn try_free_sized(&self, ptr: HeapPtr, size: usize) -> OpResult {
        self.allocator.borrow_mut().free_sized(ptr, size)
    }

    /// Allocate `n * elem_size` zeroed bytes. `None` on overflow, zero
    /// size, or exhaustion.
    pub fn calloc(&self, n: usize, elem_size: usize) -> Option<HeapPtr> {
        let size = n.checked_mul(elem_size)?;
        let ptr = self.malloc(size)?;
        self.allocator
            .borrow_mut()
            .memory_mut()
            .fill(ptr.offset(), 0, size);
        Some(ptr)
    }

    /// Resize an allocation.
    ///
    /// A null `ptr` behaves as `malloc`; a zero `new_size` frees and
    /// returns `None`. On failure `None` is returned and the original
    /// allocation is left untouched. The returned address may or may not
    /// equal the old one.
    ///
    /// # Safety
    ///
    /// Same contract as [`free`](Self::free): on success the old address
    /// may be released.
    pub unsafe fn realloc(
        &self,
        ptr: impl Into<Option<HeapPtr>>,
        new_size: usize,
    ) -> Option<HeapPtr> {
        let Some(ptr) = ptr.into() else {
            return self.malloc(new_size);
        };
        if new_size == 0 {
            // SAFETY: forwarded from the caller.
            unsafe { self.free(ptr) };
            return None;
        }
        let result = self.allocator.borrow_mut().realloc(ptr, new_size);
        match result {
            Ok(new_ptr) => Some(new_ptr),
            Err(e) => {
                log::warn!("realloc({ptr}, {new_size}) failed: {e}");
                None
            }
        }
    }

    /// Resize a live allocation, reporting why it could not be resized.
    ///
    /// Unlike [`realloc`](Self::realloc) a zero `new_size` is rejected with
    /// [`HeapError::ZeroSize`] and the allocation is kept.
    ///
    /// # Safety
    ///
    /// Same contract as [`realloc`](Self::realloc).
    pub unsafe fn try_realloc(&self, ptr: HeapPtr, new_size: usize) -> Result<HeapPtr, HeapError> {
        if new_size == 0 {
            return Err(HeapError::ZeroSize);
        }
        self.allocator.borrow_mut().realloc(ptr, new_size)
    }

    /// Payload capacity of the block behind `ptr`, if it is a live allocation.
    pub fn usable_size(&self, ptr: HeapPtr) -> Option<usize> {
        let allocator = self.allocator.borrow();
        let block = allocator.resolve(ptr).ok()?;
        block
            .header
            .is_allocated()
            .then(|| block.header.block_size())
    }

    /// Bytes requested for the live allocation behind `ptr`.
    pub fn allocation_size(&self, ptr: HeapPtr) -> Option<usize> {
        let allocator = self.allocator.borrow();
        let block = allocator.resolve(ptr).ok()?;
        block
            .header
            .is_allocated()
            .then(|| block.header.used_size())
    }

    // ── raw memory utilities ────────────────────────────────────────

    /// Set `n` bytes at `ptr` to `value`. Returns `ptr`.
    ///
    /// # Safety
    ///
    /// The caller must own the `n` bytes at `ptr`, and no reference into
    /// them may be live.
    ///
    /// # Panics
    ///
    /// Panics if the range leaves committed memory.
    pub unsafe fn memset(&self, ptr: HeapPtr, value: u8, n: usize) -> HeapPtr {
        self.allocator
            .borrow_mut()
            .memory_mut()
            .fill(ptr.offset(), value, n);
        ptr
    }

    /// Compare `n` bytes at `a` and `b`, ordered by the first differing byte.
    ///
    /// # Safety
    ///
    /// Both ranges must be initialized bytes the caller may read, with no
    /// mutable reference into them live.
    ///
    /// # Panics
    ///
    /// Panics if either range leaves committed memory.
    pub unsafe fn memcmp(&self, a: HeapPtr, b: HeapPtr, n: usize) -> Ordering {
        self.allocator
            .borrow()
            .memory()
            .compare(a.offset(), b.offset(), n)
    }

    /// Copy `n` bytes from `src` to the non-overlapping `dest`. Returns `dest`.
    ///
    /// # Safety
    ///
    /// No mutable reference into the `src` range may be live; its bytes are
    /// copied as they are, initialized or not. `dest` must meet the
    /// contract of [`memset`](Self::memset).
    ///
    /// # Panics
    ///
    /// Panics if either range leaves committed memory or the ranges overlap.
    pub unsafe fn memcpy(&self, dest: HeapPtr, src: HeapPtr, n: usize) -> HeapPtr {
        self.allocator
            .borrow_mut()
            .memory_mut()
            .copy_nonoverlapping(src.offset(), dest.offset(), n);
        dest
    }

    /// Copy `n` bytes from `src` to `dest`; the ranges may overlap.
    /// Returns `dest`.
    ///
    /// When `src` is the start of a live allocation, at most its requested
    /// size is copied.
    ///
    /// # Safety
    ///
    /// Same contract as [`memcpy`](Self::memcpy).
    ///
    /// # Panics
    ///
    /// Panics if either range leaves committed memory.
    pub unsafe fn memmove(&self, dest: HeapPtr, src: HeapPtr, n: usize) -> HeapPtr {
        let mut allocator = self.allocator.borrow_mut();
        let n = match allocator.resolve(src) {
            Ok(block) if block.header.is_allocated() => n.min(block.header.used_size()),
            _ => n,
        };
        allocator
            .memory_mut()
            .copy_within(src.offset(), dest.offset(), n);
        dest
    }

    /// Copy bytes out of the heap into `buf`.
    ///
    /// # Safety
    ///
    /// Same contract as the ranges of [`memcmp`](Self::memcmp).
    ///
    /// # Panics
    ///
    /// Panics if the range leaves committed memory.
    pub unsafe fn read(&self, ptr: HeapPtr, buf: &mut [u8]) {
        buf.copy_from_slice(self.allocator.borrow().memory().bytes(ptr.offset(), buf.len()));
    }

    /// Copy `data` into the heap at `ptr`.
    ///
    /// # Safety
    ///
    /// Same contract as [`memset`](Self::memset).
    ///
    /// # Panics
    ///
    /// Panics if the range leaves committed memory.
    pub unsafe fn write(&self, ptr: HeapPtr, data: &[u8]) {
        self.allocator
            .borrow_mut()
            .memory_mut()
            .bytes_mut(ptr.offset(), data.len())
            .copy_from_slice(data);
    }

    /// Raw pointer to `len` bytes at `ptr`, for typed placement of values.
    ///
    /// The pointer stays valid for the heap's lifetime. Reading or writing
    /// through it is only sound for bytes the caller owns (a live
    /// allocation it obtained from this heap).
    ///
    /// # Panics
    ///
    /// Panics if the range leaves committed memory.
    pub fn raw(&self, ptr: HeapPtr, len: usize) -> NonNull<u8> {
        self.allocator.borrow().memory().ptr_at(ptr.offset(), len)
    }

    // ── introspection ───────────────────────────────────────────────

    /// Usage totals from a read-only walk of the block chain.
    pub fn stats(&self) -> HeapStats {
        self.allocator.borrow().stats()
    }

    /// Validate every block header.
    pub fn check_integrity(&self) -> OpResult {
        self.allocator.borrow().check_integrity()
    }

    /// Bytes between the heap start and the current end of memory.
    pub fn current_usable_size(&self) -> usize {
        let allocator = self.allocator.borrow();
        allocator.memory().size() - allocator.heap_start()
    }

    /// Size the linear memory may grow to.
    pub fn max_size(&self) -> usize {
        self.allocator.borrow().memory().max_size()
    }

    /// Offset of the first block header.
    pub fn heap_start(&self) -> usize {
        self.allocator.borrow().heap_start()
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use crate::HEADER_SIZE;

    fn heap() -> Heap {
        Heap::initialize(HeapConfig::new(4096, 1, 16)).unwrap()
    }

    #[test]
    fn initialize_rejects_bad_config() {
        assert!(matches!(
            Heap::initialize(HeapConfig::new(1000, 1, 2)),
            Err(HeapError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn try_malloc_reports_exhaustion() {
        let h = Heap::initialize(HeapConfig::new(4096, 1, 2)).unwrap();
        assert!(matches!(
            h.try_malloc(1 << 20),
            Err(HeapError::OutOfMemory { requested, .. }) if requested == 1 << 20
        ));
        assert!(h.try_malloc(64).is_ok());
    }

    #[test]
    fn try_malloc_rejects_zero_size() {
        let h = heap();
        assert_eq!(h.try_malloc(0), Err(HeapError::ZeroSize));
        assert!(h.malloc(0).is_none());
    }

    #[test]
    fn free_null_is_noop() {
        let h = heap();
        let before = h.stats();
        // SAFETY: null owns nothing.
        unsafe { h.free(None) };
        assert_eq!(h.stats(), before);
    }

    #[test]
    fn double_free_is_noop_and_heap_stays_usable() {
        let h = heap();
        let p = h.malloc(32).unwrap();
        // SAFETY: nothing else holds `p`; the repeat exercises the check.
        unsafe {
            h.free(p);
            h.free(p);
        }
        assert!(h.check_integrity().is_ok());
        let q = h.malloc(32).unwrap();
        let r = h.malloc(32).unwrap();
        assert_ne!(q, r);
    }

    #[test]
    fn free_of_foreign_address_is_noop() {
        let h = heap();
        let p = h.malloc(32).unwrap();
        // SAFETY: the address is below the heap and names no block.
        unsafe { h.free(HeapPtr::new(8).unwrap()) };
        assert_eq!(h.allocation_size(p), Some(32));
    }

    #[test]
    fn calloc_zero_fills() {
        let h = heap();
        let p = h.malloc(64).unwrap();
        // SAFETY: the test owns every allocation it touches.
        unsafe {
            h.memset(p, 0xEE, 64);
            h.free(p);
        }
        let q = h.calloc(8, 8).unwrap();
        assert_eq!(p, q);
        let mut buf = [1u8; 64];
        // SAFETY: as above.
        unsafe { h.read(q, &mut buf) };
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn calloc_overflow_is_null() {
        let h = heap();
        assert!(h.calloc(usize::MAX, 2).is_none());
        assert!(h.calloc(0, 8).is_none());
    }

    #[test]
    fn realloc_null_is_malloc() {
        let h = heap();
        // SAFETY: null owns nothing.
        let p = unsafe { h.realloc(None, 24) }.unwrap();
        assert_eq!(h.allocation_size(p), Some(24));
    }

    #[test]
    fn realloc_to_zero_frees() {
        let h = heap();
        let p = h.malloc(24).unwrap();
        // SAFETY: the test owns `p`.
        assert!(unsafe { h.realloc(p, 0) }.is_none());
        assert_eq!(h.allocation_size(p), None);
    }

    #[test]
    fn realloc_preserves_prefix() {
        let h = heap();
        let p = h.malloc(8).unwrap();
        let _blocker = h.malloc(8).unwrap();
        // SAFETY: the test owns every allocation it touches and drops the
        // old address after each resize.
        unsafe {
            h.write(p, b"kilnheap");
            let q = h.realloc(p, 300).unwrap();
            let mut buf = [0u8; 8];
            h.read(q, &mut buf);
            assert_eq!(&buf, b"kilnheap");
            let r = h.realloc(q, 4).unwrap();
            let mut buf = [0u8; 4];
            h.read(r, &mut buf);
            assert_eq!(&buf, b"kiln");
        }
    }

    #[test]
    fn realloc_reuses_free_predecessor() {
        let h = Heap::initialize(HeapConfig::new(4096, 1, 1)).unwrap();
        let first = h.malloc(64).unwrap();
        let p = h.malloc(64).unwrap();
        let rest = h.stats().largest_free_block;
        let _guard = h.malloc(rest).unwrap();
        // SAFETY: the test owns every allocation it touches.
        unsafe {
            h.write(p, &[0x3C; 64]);
            h.free(first);
            let q = h.realloc(p, 64 + HEADER_SIZE + 64).unwrap();
            assert_eq!(q, first);
            let mut buf = [0u8; 64];
            h.read(q, &mut buf);
            assert_eq!(buf, [0x3C; 64]);
        }
        assert!(h.check_integrity().is_ok());
    }

    #[test]
    fn try_realloc_keeps_allocation_on_failure() {
        let h = Heap::initialize(HeapConfig::new(4096, 1, 2)).unwrap();
        let p = h.malloc(16).unwrap();
        // SAFETY: the test owns `p` and every failed resize keeps it.
        unsafe {
            h.write(p, &[3; 16]);
            assert!(matches!(
                h.try_realloc(p, 1 << 20),
                Err(HeapError::OutOfMemory { .. })
            ));
            assert_eq!(h.try_realloc(p, 0), Err(HeapError::ZeroSize));
        }
        assert_eq!(h.allocation_size(p), Some(16));
        let mut buf = [0u8; 16];
        // SAFETY: as above.
        unsafe { h.read(p, &mut buf) };
        assert_eq!(buf, [3; 16]);
    }

    #[test]
    fn usable_size_reports_block_capacity() {
        let h = heap();
        let p = h.malloc(20).unwrap();
        assert_eq!(h.usable_size(p), Some(32));
        assert_eq!(h.allocation_size(p), Some(20));
        // SAFETY: the test owns `p`.
        unsafe { h.free(p) };
        assert_eq!(h.usable_size(p), None);
    }

    #[test]
    fn try_free_sized_rejects_wrong_size() {
        let h = heap();
        let p = h.malloc(20).unwrap();
        // SAFETY: the test owns `p`.
        unsafe {
            assert!(matches!(
                h.try_free_sized(p, 21),
                Err(HeapError::SizeMismatch { .. })
            ));
            assert!(h.try_free_sized(p, 20).is_ok());
        }
    }

    #[test]
    fn memcmp_orders_by_first_difference() {
        let h = heap();
        let a = h.malloc(4).unwrap();
        let b = h.malloc(4).unwrap();
        // SAFETY: the test owns both allocations.
        unsafe {
            h.write(a, &[1, 2, 3, 4]);
            h.write(b, &[1, 2, 4, 0]);
            assert_eq!(h.memcmp(a, b, 4), Ordering::Less);
            assert_eq!(h.memcmp(a, b, 2), Ordering::Equal);
        }
    }

    #[test]
    fn memcpy_returns_dest() {
        let h = heap();
        let a = h.malloc(4).unwrap();
        let b = h.malloc(4).unwrap();
        // SAFETY: the test owns both allocations.
        unsafe {
            h.write(a, &[9, 8, 7, 6]);
            assert_eq!(h.memcpy(b, a, 4), b);
            assert_eq!(h.memcmp(a, b, 4), Ordering::Equal);
        }
    }

    #[test]
    fn memmove_clamps_to_source_allocation() {
        let h = heap();
        let src = h.malloc(4).unwrap();
        let dest = h.malloc(64).unwrap();
        let mut buf = [0u8; 6];
        // SAFETY: the test owns both allocations.
        unsafe {
            h.memset(dest, 0xFF, 64);
            h.write(src, &[1, 2, 3, 4]);
            h.memmove(dest, src, 64);
            h.read(dest, &mut buf);
        }
        assert_eq!(buf, [1, 2, 3, 4, 0xFF, 0xFF]);
    }

    #[test]
    fn memmove_handles_overlap_inside_one_allocation() {
        let h = heap();
        let p = h.malloc(8).unwrap();
        let mut buf = [0u8; 8];
        // SAFETY: the test owns `p`.
        unsafe {
            h.write(p, &[1, 2, 3, 4, 5, 6, 7, 8]);
            h.memmove(p, p.add(2), 6);
            h.read(p, &mut buf);
        }
        assert_eq!(buf, [3, 4, 5, 6, 7, 8, 7, 8]);
    }

    #[test]
    fn current_usable_size_tracks_growth() {
        let h = heap();
        assert_eq!(h.current_usable_size(), 4096 - 2048);
        h.malloc(5000).unwrap();
        assert_eq!(h.current_usable_size(), 3 * 4096 - 2048);
        assert_eq!(h.max_size(), 16 * 4096);
    }

    #[test]
    fn failed_malloc_over_corrupted_header_keeps_memory_size() {
        let h = heap();
        let p = h.malloc(100).unwrap();
        let _guard = h.malloc(100).unwrap();
        // SAFETY: the test owns `p`; the header is corrupted on purpose.
        unsafe {
            h.free(p);
            h.memset(HeapPtr::new(p.offset() - HEADER_SIZE).unwrap(), 0xAB, 8);
        }
        let before = h.current_usable_size();
        for _ in 0..5 {
            assert!(h.malloc(100).is_none());
        }
        assert_eq!(h.current_usable_size(), before);
    }

    #[test]
    fn raw_pointer_sees_written_bytes() {
        let h = heap();
        let p = h.malloc(4).unwrap();
        // SAFETY: the test owns `p`.
        unsafe { h.write(p, &[5, 6, 7, 8]) };
        let raw = h.raw(p, 4);
        // SAFETY: p is a live 4-byte allocation owned by this test.
        let first = unsafe { raw.as_ptr().read() };
        assert_eq!(first, 5);
        assert_eq!(raw.as_ptr() as usize % crate::ALIGNMENT, 0);
    }

    #[test]
    fn freed_neighbours_are_reused_without_growth() {
        let h = heap();
        let blocks: Vec<_> = (0..4).map(|_| h.malloc(100).unwrap()).collect();
        for p in &blocks {
            // SAFETY: each block is freed once and never touched again.
            unsafe { h.free(*p) };
        }
        let size_before = h.current_usable_size();
        let big = h.malloc(4 * 112 + 3 * HEADER_SIZE).unwrap();
        assert_eq!(big, blocks[0]);
        assert_eq!(h.current_usable_size(), size_before);
    }
}
