//! Heap error types.

use std::error::Error;
use std::fmt;

/// Result of a block operation that produces no value.
pub type OpResult = Result<(), HeapError>;

/// Errors that can occur during heap operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeapError {
    /// The linear memory cannot grow far enough to satisfy a request.
    OutOfMemory {
        /// Number of bytes requested.
        requested: usize,
        /// Bytes the memory can still grow by.
        available: usize,
    },
    /// An address does not hold a valid block header (corrupted header or
    /// a pointer that was never returned by the allocator).
    InvalidBlock {
        /// Offset of the would-be header.
        offset: usize,
        /// Which check failed.
        reason: &'static str,
    },
    /// The block is already free.
    DoubleFree {
        /// Offset of the block header.
        offset: usize,
    },
    /// A sized free named a size that differs from the tracked one.
    SizeMismatch {
        /// Offset of the block header.
        offset: usize,
        /// Size supplied by the caller.
        expected: usize,
        /// Size recorded in the block.
        actual: usize,
    },
    /// A checked allocation or resize asked for zero bytes.
    ZeroSize,
    /// Heap configuration failed validation.
    InvalidConfig {
        /// Description of the problem.
        reason: String,
    },
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                available,
            } => {
                write!(
                    f,
                    "out of memory: requested {requested} bytes, {available} bytes of growth left"
                )
            }
            Self::InvalidBlock { offset, reason } => {
                write!(f, "invalid block at {offset:#x}: {reason}")
            }
            Self::DoubleFree { offset } => {
                write!(f, "block at {offset:#x} is already free")
            }
            Self::SizeMismatch {
                offset,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "block at {offset:#x} holds {actual} bytes, caller freed {expected}"
                )
            }
            Self::ZeroSize => write!(f, "zero-byte allocation requested"),
            Self::InvalidConfig { reason } => write!(f, "invalid heap config: {reason}"),
        }
    }
}

impl Error for HeapError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_offsets_in_hex() {
        let err = HeapError::InvalidBlock {
            offset: 0x840,
            reason: "bad magic",
        };
        assert_eq!(err.to_string(), "invalid block at 0x840: bad magic");
    }

    #[test]
    fn size_mismatch_reports_both_sizes() {
        let err = HeapError::SizeMismatch {
            offset: 16,
            expected: 8,
            actual: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("12 bytes"));
        assert!(msg.contains("freed 8"));
    }

    #[test]
    fn zero_size_is_not_reported_as_exhaustion() {
        let msg = HeapError::ZeroSize.to_string();
        assert!(msg.contains("zero-byte"));
        assert!(!msg.contains("out of memory"));
    }
}
