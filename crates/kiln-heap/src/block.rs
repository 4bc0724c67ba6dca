//! In-arena block headers.
//!
//! Every block in the heap starts with a fixed-size [`BlockHeader`]
//! followed by `block_size` payload bytes. Blocks are chained implicitly:
//! the next header lives at `offset + HEADER_SIZE + block_size`.
//!
//! A header is only trusted if its magic tag matches and its checksum
//! equals `block_size ^ CHECKSUM_KEY`. Anything else at a would-be header
//! address is "not a block".

use bytemuck::{Pod, Zeroable};

/// Tag stored in every live header.
pub const BLOCK_MAGIC: u32 = 0x4B49_4C4E;

const CHECKSUM_KEY: u64 = 0xA5A5_5A5A_C3C3_3C3C;

/// Size of a block header in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<BlockHeader>();

/// Header written at the start of every block.
///
/// `repr(C)` and `Pod` so it can be read from and written to arena bytes
/// without unsafe code.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct BlockHeader {
    magic: u32,
    allocated: u32,
    block_size: u64,
    used_size: u64,
    checksum: u64,
}

impl BlockHeader {
    /// A free block with `block_size` payload bytes.
    pub fn free(block_size: usize) -> Self {
        Self {
            magic: BLOCK_MAGIC,
            allocated: 0,
            block_size: block_size as u64,
            used_size: 0,
            checksum: checksum(block_size as u64),
        }
    }

    /// Name of the first integrity check this header fails, if any.
    pub fn defect(&self) -> Option<&'static str> {
        if self.magic != BLOCK_MAGIC {
            Some("bad magic")
        } else if self.checksum != checksum(self.block_size) {
            Some("checksum mismatch")
        } else if self.allocated > 1 {
            Some("bad allocation flag")
        } else if self.used_size > self.block_size {
            Some("used size exceeds block size")
        } else {
            None
        }
    }

    /// Whether the block is handed out.
    pub fn is_allocated(&self) -> bool {
        self.allocated == 1
    }

    /// Payload capacity in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size as usize
    }

    /// Bytes requested by the current allocation; zero when free.
    pub fn used_size(&self) -> usize {
        self.used_size as usize
    }

    /// Resize the payload, keeping the checksum in step.
    pub fn set_block_size(&mut self, block_size: usize) {
        self.block_size = block_size as u64;
        self.checksum = checksum(self.block_size);
    }

    /// Record a new requested size for an allocated block.
    pub fn set_used_size(&mut self, used_size: usize) {
        debug_assert!(used_size <= self.block_size());
        self.used_size = used_size as u64;
    }

    /// Mark the block handed out with `used_size` requested bytes.
    pub fn mark_allocated(&mut self, used_size: usize) {
        self.allocated = 1;
        self.set_used_size(used_size);
    }

    /// Mark the block free and clear its requested size.
    pub fn mark_free(&mut self) {
        self.allocated = 0;
        self.used_size = 0;
    }
}

fn checksum(block_size: u64) -> u64 {
    block_size ^ CHECKSUM_KEY
}

/// A validated header together with the offset it was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockView {
    /// Offset of the header in linear memory.
    pub offset: usize,
    /// The header contents.
    pub header: BlockHeader,
}

impl BlockView {
    /// Offset of the first payload byte.
    pub fn data_offset(&self) -> usize {
        self.offset + HEADER_SIZE
    }

    /// Offset of the following block's header.
    pub fn next_offset(&self) -> usize {
        self.data_offset() + self.header.block_size()
    }
}
