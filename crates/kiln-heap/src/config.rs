//! Heap configuration parameters.

use crate::error::HeapError;
use crate::{align_up, ALIGNMENT, HEADER_SIZE};

/// Configuration for the linear memory and the heap laid over it.
///
/// Controls page sizing, growth limits, and where the heap begins inside
/// the linear memory. Validated by [`Heap::initialize`](crate::Heap::initialize);
/// all values are immutable after the heap is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// Size of one linear memory page in bytes.
    ///
    /// Default: 65_536 (one WebAssembly page).
    /// Must be a power of two and at least 256.
    pub page_size: usize,

    /// Number of pages committed when the heap is initialized.
    ///
    /// Default: 1. Zero is allowed; the heap then grows on bootstrap.
    pub initial_pages: u32,

    /// Maximum number of pages the memory may ever grow to.
    ///
    /// Default: 256 (16MB at the default page size). The whole range is
    /// reserved up front so that payload addresses never move.
    pub max_pages: u32,

    /// Bytes at the start of memory owned by the runtime's data section.
    ///
    /// Default: 1_024.
    pub data_end: usize,

    /// Safety margin between the end of the data section and the heap.
    ///
    /// Default: 1_024.
    pub heap_offset: usize,
}

impl HeapConfig {
    /// Default page size: one WebAssembly page.
    pub const DEFAULT_PAGE_SIZE: usize = 65_536;

    /// Default committed page count.
    pub const DEFAULT_INITIAL_PAGES: u32 = 1;

    /// Default page limit.
    pub const DEFAULT_MAX_PAGES: u32 = 256;

    /// Default size of the reserved data section.
    pub const DEFAULT_DATA_END: usize = 1_024;

    /// Default safety margin after the data section.
    pub const DEFAULT_HEAP_OFFSET: usize = 1_024;

    /// Smallest accepted page size.
    pub const MIN_PAGE_SIZE: usize = 256;

    /// Create a config with the given page size and limits.
    ///
    /// Uses default values for the data section and heap offset.
    pub fn new(page_size: usize, initial_pages: u32, max_pages: u32) -> Self {
        Self {
            page_size,
            initial_pages,
            max_pages,
            data_end: Self::DEFAULT_DATA_END,
            heap_offset: Self::DEFAULT_HEAP_OFFSET,
        }
    }

    /// Set the heap offset (the `initializeHeap(offsetBytes)` argument).
    pub fn with_heap_offset(mut self, heap_offset: usize) -> Self {
        self.heap_offset = heap_offset;
        self
    }

    /// Set the size of the reserved data section.
    pub fn with_data_end(mut self, data_end: usize) -> Self {
        self.data_end = data_end;
        self
    }

    /// Offset of the first block header: data section end plus the safety
    /// margin, rounded up to [`ALIGNMENT`].
    pub fn heap_start(&self) -> usize {
        self.data_end
            .checked_add(self.heap_offset)
            .and_then(align_up)
            .unwrap_or(usize::MAX)
    }

    /// Maximum size of the linear memory in bytes.
    pub fn max_bytes(&self) -> usize {
        self.page_size.saturating_mul(self.max_pages as usize)
    }

    /// Check every parameter, returning the first violation found.
    pub fn validate(&self) -> Result<(), HeapError> {
        if !self.page_size.is_power_of_two() || self.page_size < Self::MIN_PAGE_SIZE {
            return Err(HeapError::InvalidConfig {
                reason: format!(
                    "page_size must be a power of two and >= {} (got {})",
                    Self::MIN_PAGE_SIZE,
                    self.page_size,
                ),
            });
        }
        if self.max_pages == 0 || self.max_pages < self.initial_pages {
            return Err(HeapError::InvalidConfig {
                reason: format!(
                    "max_pages must be >= max(initial_pages, 1) (got max_pages={}, initial_pages={})",
                    self.max_pages, self.initial_pages,
                ),
            });
        }
        if self.page_size.checked_mul(self.max_pages as usize).is_none() {
            return Err(HeapError::InvalidConfig {
                reason: format!(
                    "{} pages of {} bytes overflow the address space",
                    self.max_pages, self.page_size,
                ),
            });
        }
        // The first block needs its header plus one aligned payload unit.
        let first_block_end = self
            .heap_start()
            .saturating_add(HEADER_SIZE)
            .saturating_add(ALIGNMENT);
        if first_block_end > self.max_bytes() {
            return Err(HeapError::InvalidConfig {
                reason: format!(
                    "heap start {} leaves no room for a block in {} bytes of memory",
                    self.heap_start(),
                    self.max_bytes(),
                ),
            });
        }
        Ok(())
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_PAGE_SIZE,
            Self::DEFAULT_INITIAL_PAGES,
            Self::DEFAULT_MAX_PAGES,
        )
    }
}
