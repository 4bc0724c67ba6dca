//! First-fit free-list allocator over the block chain.
//!
//! [`BlockAllocator`] owns the [`LinearMemory`] and the free-list cursor.
//! The block chain covers the heap exactly: it starts at `heap_start` and
//! the last block ends at the current end of memory.
//!
//! # Search
//!
//! `find_free_block` walks the chain from the cursor. Whenever it lands on
//! a free block it first merges every free block directly after it, then
//! checks the size. Fragmentation is paid for during the search instead of
//! in a separate pass.
//!
//! # Cursor
//!
//! No free block lies before the cursor. `malloc` advances it past the block
//! it hands out; `free` and `realloc` pull it back when they release memory
//! below it. The cursor is always a header offset or the end of memory.

use crate::address::HeapPtr;
use crate::block::{BlockHeader, BlockView, HEADER_SIZE};
use crate::config::HeapConfig;
use crate::error::{HeapError, OpResult};
use crate::memory::LinearMemory;
use crate::stats::HeapStats;
use crate::{align_up, ALIGNMENT};

/// The block allocator: block chain, cursor, and the memory underneath.
pub struct BlockAllocator {
    memory: LinearMemory,
    heap_start: usize,
    cursor: usize,
}

impl BlockAllocator {
    /// Reserve linear memory for `config` and lay one free block over the
    /// whole heap.
    ///
    /// Grows the memory first if the committed pages cannot hold a block.
    pub fn new(config: &HeapConfig) -> Result<Self, HeapError> {
        config.validate()?;
        let mut memory =
            LinearMemory::new(config.page_size, config.initial_pages, config.max_pages)?;
        let heap_start = config.heap_start();

        let first_block_end = heap_start + HEADER_SIZE + ALIGNMENT;
        if memory.size() < first_block_end {
            memory.grow(first_block_end - memory.size())?;
        }

        let mut allocator = Self {
            memory,
            heap_start,
            cursor: heap_start,
        };
        let block_size = allocator.end() - heap_start - HEADER_SIZE;
        allocator.store(heap_start, BlockHeader::free(block_size));
        log::debug!(
            "heap initialized at {heap_start:#x} with one {block_size}-byte block ({} pages)",
            allocator.memory.pages()
        );
        Ok(allocator)
    }

    /// The linear memory.
    pub fn memory(&self) -> &LinearMemory {
        &self.memory
    }

    /// The linear memory, mutably.
    pub fn memory_mut(&mut self) -> &mut LinearMemory {
        &mut self.memory
    }

    /// Offset of the first block header.
    pub fn heap_start(&self) -> usize {
        self.heap_start
    }

    /// Current free-list cursor.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn end(&self) -> usize {
        self.memory.size()
    }

    // ── header access ───────────────────────────────────────────────

    /// Read and validate the header at `offset`.
    pub fn block_at(&self, offset: usize) -> Result<BlockView, HeapError> {
        let invalid = |reason| HeapError::InvalidBlock { offset, reason };
        if offset < self.heap_start {
            return Err(invalid("address precedes the heap"));
        }
        if offset % ALIGNMENT != 0 {
            return Err(invalid("misaligned address"));
        }
        if !self.memory.contains(offset, HEADER_SIZE) {
            return Err(invalid("address past the end of memory"));
        }
        let header: BlockHeader =
            bytemuck::pod_read_unaligned(self.memory.bytes(offset, HEADER_SIZE));
        if let Some(defect) = header.defect() {
            return Err(invalid(defect));
        }
        if !self
            .memory
            .contains(offset + HEADER_SIZE, header.block_size())
        {
            return Err(invalid("block extends past the end of memory"));
        }
        Ok(BlockView { offset, header })
    }

    /// Resolve a payload address back to its block.
    pub fn resolve(&self, ptr: HeapPtr) -> Result<BlockView, HeapError> {
        let offset = ptr
            .offset()
            .checked_sub(HEADER_SIZE)
            .ok_or(HeapError::InvalidBlock {
                offset: ptr.offset(),
                reason: "address precedes the heap",
            })?;
        self.block_at(offset)
    }

    fn store(&mut self, offset: usize, header: BlockHeader) {
        self.memory
            .bytes_mut(offset, HEADER_SIZE)
            .copy_from_slice(bytemuck::bytes_of(&header));
    }

    fn erase(&mut self, offset: usize) {
        self.memory.fill(offset, 0, HEADER_SIZE);
    }

    // ── block operations ────────────────────────────────────────────

    /// Shrink the block at `offset` to `size` payload bytes and turn the
    /// rest into a new free block.
    ///
    /// `size` must be aligned. Returns `Ok(false)` without touching the
    /// block when the remainder could not hold a header plus payload.
    pub fn split(&mut self, offset: usize, size: usize) -> Result<bool, HeapError> {
        debug_assert_eq!(size % ALIGNMENT, 0);
        let mut block = self.block_at(offset)?;
        let block_size = block.header.block_size();
        if size > block_size || block_size - size <= HEADER_SIZE {
            return Ok(false);
        }

        let remainder_offset = offset + HEADER_SIZE + size;
        let remainder_size = block_size - size - HEADER_SIZE;
        block.header.set_block_size(size);
        self.store(offset, block.header);
        self.store(remainder_offset, BlockHeader::free(remainder_size));
        log::trace!(
            "split block {offset:#x}: {size} + {remainder_size} bytes at {remainder_offset:#x}"
        );
        Ok(true)
    }

    /// Merge the free block at `offset` with the free block right after it.
    ///
    /// Returns `Ok(false)` if either block is allocated or there is no
    /// successor. The second header is zeroed.
    pub fn coalesce(&mut self, offset: usize) -> Result<bool, HeapError> {
        let mut first = self.block_at(offset)?;
        if first.header.is_allocated() {
            return Ok(false);
        }
        let next_offset = first.next_offset();
        if next_offset >= self.end() {
            return Ok(false);
        }
        let second = self.block_at(next_offset)?;
        if second.header.is_allocated() {
            return Ok(false);
        }

        let merged = first.header.block_size() + HEADER_SIZE + second.header.block_size();
        first.header.set_block_size(merged);
        self.store(offset, first.header);
        self.erase(next_offset);
        if self.cursor == next_offset {
            self.cursor = offset;
        }
        log::trace!("coalesced {next_offset:#x} into {offset:#x} ({merged} bytes)");
        Ok(true)
    }

    /// Mark the free block at `offset` allocated with `used_size` bytes.
    pub fn allocate_block(&mut self, offset: usize, used_size: usize) -> OpResult {
        let mut block = self.block_at(offset)?;
        if block.header.is_allocated() {
            return Err(HeapError::InvalidBlock {
                offset,
                reason: "block already allocated",
            });
        }
        block.header.mark_allocated(used_size);
        self.store(offset, block.header);
        Ok(())
    }

    /// Mark the allocated block at `offset` free.
    pub fn free_block(&mut self, offset: usize) -> OpResult {
        let mut block = self.block_at(offset)?;
        if !block.header.is_allocated() {
            return Err(HeapError::DoubleFree { offset });
        }
        block.header.mark_free();
        self.store(offset, block.header);
        Ok(())
    }

    fn set_used_size(&mut self, offset: usize, used_size: usize) -> OpResult {
        let mut block = self.block_at(offset)?;
        block.header.set_used_size(used_size);
        self.store(offset, block.header);
        Ok(())
    }

    /// Merge every free block directly after the free block at `offset`.
    ///
    /// Stops at the first allocated block or at the end of memory. A
    /// corrupted successor is logged and returned.
    fn coalesce_run(&mut self, offset: usize) -> OpResult {
        loop {
            match self.coalesce(offset) {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(e) => {
                    log::warn!("heap walk stopped after {offset:#x}: {e}");
                    return Err(e);
                }
            }
        }
    }

    /// First free block of at least `size` bytes at or after the cursor,
    /// merging free neighbours on the way.
    ///
    /// `Ok(None)` means nothing fits. An invalid header ends the walk with
    /// an error, so the caller can tell corruption from exhaustion.
    pub fn find_free_block(&mut self, size: usize) -> Result<Option<usize>, HeapError> {
        let mut offset = self.cursor;
        while offset < self.end() {
            let block = self.block_at(offset).inspect_err(|e| {
                log::warn!("heap walk stopped: {e}");
            })?;
            if block.header.is_allocated() {
                offset = block.next_offset();
                continue;
            }

            self.coalesce_run(offset)?;
            let block = self.block_at(offset)?;
            if block.header.block_size() >= size {
                return Ok(Some(offset));
            }
            offset = block.next_offset();
        }
        Ok(None)
    }

    /// Grow the memory to fit a `size`-byte payload and lay a free block
    /// over the new pages. Returns the new block's offset.
    pub fn extend(&mut self, size: usize) -> Result<usize, HeapError> {
        let request = size
            .checked_add(HEADER_SIZE)
            .ok_or(HeapError::OutOfMemory {
                requested: size,
                available: self.memory.remaining(),
            })?;
        let old_end = self.memory.grow(request)?;
        let block_size = self.end() - old_end - HEADER_SIZE;
        self.store(old_end, BlockHeader::free(block_size));
        if self.cursor >= old_end {
            self.cursor = old_end;
        }
        log::debug!("heap extended with a {block_size}-byte block at {old_end:#x}");
        Ok(old_end)
    }

    /// Split (if worthwhile) and hand out the free block at `offset`.
    fn place(&mut self, offset: usize, aligned: usize, size: usize) -> Result<HeapPtr, HeapError> {
        self.split(offset, aligned)?;
        self.allocate_block(offset, size)?;
        let block = self.block_at(offset)?;
        if self.cursor == offset {
            self.cursor = block.next_offset();
        }
        HeapPtr::new(block.data_offset()).ok_or(HeapError::InvalidBlock {
            offset,
            reason: "null payload address",
        })
    }

    // ── malloc / free / realloc ─────────────────────────────────────

    /// Allocate `size` bytes. `None` for zero size or when memory cannot grow.
    pub fn malloc(&mut self, size: usize) -> Option<HeapPtr> {
        if size == 0 {
            return None;
        }
        let aligned = align_up(size)?;
        let offset = match self.find_free_block(aligned) {
            Ok(Some(offset)) => offset,
            Ok(None) => {
                if let Err(e) = self.extend(aligned) {
                    log::debug!("malloc({size}) failed: {e}");
                    return None;
                }
                match self.find_free_block(aligned) {
                    Ok(Some(offset)) => offset,
                    Ok(None) => return None,
                    Err(e) => {
                        log::warn!("malloc({size}) failed: {e}");
                        return None;
                    }
                }
            }
            Err(e) => {
                log::warn!("malloc({size}) failed: {e}");
                return None;
            }
        };
        match self.place(offset, aligned, size) {
            Ok(ptr) => {
                log::trace!("malloc({size}) -> {ptr}");
                Some(ptr)
            }
            Err(e) => {
                log::warn!("malloc({size}) failed: {e}");
                None
            }
        }
    }

    /// Release the block behind `ptr`.
    pub fn free(&mut self, ptr: HeapPtr) -> OpResult {
        let block = self.resolve(ptr)?;
        self.free_block(block.offset)?;
        if block.offset < self.cursor {
            self.cursor = block.offset;
        }
        log::trace!("free({ptr})");
        Ok(())
    }

    /// Release the block behind `ptr` after checking its requested size.
    pub fn free_sized(&mut self, ptr: HeapPtr, size: usize) -> OpResult {
        let block = self.resolve(ptr)?;
        if block.header.is_allocated() && block.header.used_size() != size {
            return Err(HeapError::SizeMismatch {
                offset: block.offset,
                expected: size,
                actual: block.header.used_size(),
            });
        }
        self.free(ptr)
    }

    /// Resize the allocation behind `ptr` to `new_size` (non-zero) bytes.
    ///
    /// Shrinks in place, splitting off the tail when it can hold a block.
    /// Grows in place when the following free blocks are large enough.
    /// Otherwise, if the free block right before it together with the block
    /// and its free successors is large enough, the old block is freed,
    /// merged into that predecessor, and the bytes are moved down. As a last
    /// resort it allocates, copies `min(used, new_size)` bytes, and frees
    /// the old block. On failure the old allocation is untouched.
    pub fn realloc(&mut self, ptr: HeapPtr, new_size: usize) -> Result<HeapPtr, HeapError> {
        debug_assert!(new_size > 0);
        let block = self.resolve(ptr)?;
        if !block.header.is_allocated() {
            return Err(HeapError::DoubleFree {
                offset: block.offset,
            });
        }
        let aligned = align_up(new_size).ok_or(HeapError::OutOfMemory {
            requested: new_size,
            available: self.memory.remaining(),
        })?;

        if aligned <= block.header.block_size() {
            self.release_tail(block.offset, aligned)?;
            self.set_used_size(block.offset, new_size)?;
            return Ok(ptr);
        }

        if self.grow_in_place(block.offset, aligned)? {
            self.set_used_size(block.offset, new_size)?;
            return Ok(ptr);
        }

        if let Some(new_ptr) = self.grow_into_predecessor(block, aligned, new_size)? {
            return Ok(new_ptr);
        }

        let copy_len = block.header.used_size().min(new_size);
        let new_ptr = self.malloc(new_size).ok_or(HeapError::OutOfMemory {
            requested: new_size,
            available: self.memory.remaining(),
        })?;
        self.memory
            .copy_nonoverlapping(ptr.offset(), new_ptr.offset(), copy_len);
        self.free(ptr)?;
        Ok(new_ptr)
    }

    /// Split the block at `offset` down to `aligned` bytes and hand the
    /// tail back to the free list.
    fn release_tail(&mut self, offset: usize, aligned: usize) -> OpResult {
        if !self.split(offset, aligned)? {
            return Ok(());
        }
        let tail = offset + HEADER_SIZE + aligned;
        // The split already stands; a corrupted successor only stops the merge.
        let _ = self.coalesce_run(tail);
        if tail < self.cursor {
            self.cursor = tail;
        }
        Ok(())
    }

    /// Absorb the free blocks following the allocated block at `offset`
    /// if together they reach `aligned` bytes.
    fn grow_in_place(&mut self, offset: usize, aligned: usize) -> Result<bool, HeapError> {
        let mut block = self.block_at(offset)?;
        let next_offset = block.next_offset();
        if next_offset >= self.end() {
            return Ok(false);
        }
        let next = match self.block_at(next_offset) {
            Ok(next) if !next.header.is_allocated() => next,
            _ => return Ok(false),
        };
        self.coalesce_run(next_offset)?;
        let next = self.block_at(next_offset).unwrap_or(next);

        let combined = block.header.block_size() + HEADER_SIZE + next.header.block_size();
        if combined < aligned {
            return Ok(false);
        }
        block.header.set_block_size(combined);
        self.store(offset, block.header);
        self.erase(next_offset);
        if self.cursor == next_offset {
            self.cursor = offset + HEADER_SIZE + combined;
        }
        self.release_tail(offset, aligned)?;
        Ok(true)
    }

    /// The free block whose successor is the block at `offset`, if any.
    ///
    /// No free block lies before the cursor, so the walk starts there.
    fn free_predecessor(&self, offset: usize) -> Result<Option<BlockView>, HeapError> {
        let mut at = self.cursor;
        while at < offset {
            let block = self.block_at(at)?;
            let next = block.next_offset();
            if next == offset {
                return Ok((!block.header.is_allocated()).then_some(block));
            }
            at = next;
        }
        Ok(None)
    }

    /// Payload bytes a block of `size` bytes at `offset` would span after
    /// merging with the free blocks right after it. Every header the merge
    /// would touch is validated, including the allocated block ending the run.
    fn span_with_free_successors(&self, offset: usize, size: usize) -> Result<usize, HeapError> {
        let mut span = size;
        let mut at = offset + HEADER_SIZE + size;
        while at < self.end() {
            let next = self.block_at(at)?;
            if next.header.is_allocated() {
                break;
            }
            span += HEADER_SIZE + next.header.block_size();
            at = next.next_offset();
        }
        Ok(span)
    }

    /// Free the allocated `block`, merge it into the free block before it
    /// (and any free blocks after it), and move its bytes down to the
    /// merged block's payload.
    ///
    /// Returns `Ok(None)` without touching anything when the merged block
    /// would still be smaller than `aligned`.
    fn grow_into_predecessor(
        &mut self,
        block: BlockView,
        aligned: usize,
        new_size: usize,
    ) -> Result<Option<HeapPtr>, HeapError> {
        let Some(prev) = self.free_predecessor(block.offset)? else {
            return Ok(None);
        };
        let span = prev.header.block_size()
            + HEADER_SIZE
            + self.span_with_free_successors(block.offset, block.header.block_size())?;
        if span < aligned {
            return Ok(None);
        }

        let copy_len = block.header.used_size().min(new_size);
        self.free_block(block.offset)?;
        self.coalesce_run(prev.offset)?;
        // Move before splitting: the split header may land in the old payload.
        self.memory
            .copy_within(block.data_offset(), prev.data_offset(), copy_len);
        let ptr = self.place(prev.offset, aligned, new_size)?;
        log::trace!(
            "realloc moved {:#x} down into {:#x} ({new_size} bytes)",
            block.data_offset(),
            ptr.offset()
        );
        Ok(Some(ptr))
    }

    // ── introspection ───────────────────────────────────────────────

    /// Walk the chain without modifying it.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            allocator: self,
            offset: self.heap_start,
        }
    }

    /// Usage totals from a read-only walk.
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            total_bytes: self.end() - self.heap_start,
            ..HeapStats::default()
        };
        for block in self.blocks().map_while(Result::ok) {
            stats.record(&block.header);
        }
        stats
    }

    /// Validate every header and check that the chain ends exactly at the
    /// end of memory.
    pub fn check_integrity(&self) -> OpResult {
        let mut end = self.heap_start;
        for block in self.blocks() {
            end = block?.next_offset();
        }
        if end != self.end() {
            return Err(HeapError::InvalidBlock {
                offset: end,
                reason: "block chain does not reach the end of memory",
            });
        }
        if self.cursor > self.end() {
            return Err(HeapError::InvalidBlock {
                offset: self.cursor,
                reason: "cursor past the end of memory",
            });
        }
        Ok(())
    }
}

/// Iterator over the block chain, yielding an error and stopping at the
/// first invalid header.
pub struct Blocks<'a> {
    allocator: &'a BlockAllocator,
    offset: usize,
}

impl Iterator for Blocks<'_> {
    type Item = Result<BlockView, HeapError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.allocator.end() {
            return None;
        }
        match self.allocator.block_at(self.offset) {
            Ok(block) => {
                self.offset = block.next_offset();
                Some(Ok(block))
            }
            Err(e) => {
                self.offset = usize::MAX;
                Some(Err(e))
            }
        }
    }
}
