//! Heap usage statistics.

use crate::block::BlockHeader;

/// Totals gathered by walking the block chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes between the heap start and the end of memory, headers included.
    pub total_bytes: usize,
    /// Payload bytes in free blocks.
    pub free_bytes: usize,
    /// Bytes requested by live allocations.
    pub used_bytes: usize,
    /// Number of blocks in the chain.
    pub block_count: usize,
    /// Number of free blocks.
    pub free_block_count: usize,
    /// Payload size of the largest free block.
    pub largest_free_block: usize,
}

impl HeapStats {
    pub(crate) fn record(&mut self, header: &BlockHeader) {
        self.block_count += 1;
        if header.is_allocated() {
            self.used_bytes += header.used_size();
        } else {
            self.free_block_count += 1;
            self.free_bytes += header.block_size();
            self.largest_free_block = self.largest_free_block.max(header.block_size());
        }
    }

    /// Number of allocated blocks.
    pub fn allocated_block_count(&self) -> usize {
        self.block_count - self.free_block_count
    }

    /// Bytes spent on block headers.
    pub fn header_bytes(&self) -> usize {
        self.block_count * crate::HEADER_SIZE
    }
}
