//! Heap addresses.
//!
//! A [`HeapPtr`] is a byte offset into the linear memory, the same thing a
//! WebAssembly program calls a pointer. It is never zero, so
//! `Option<HeapPtr>` is the nullable pointer and costs no extra space.

use std::fmt;
use std::num::NonZeroUsize;

/// Non-null address of a byte inside the linear memory.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr(NonZeroUsize);

impl HeapPtr {
    /// Wrap a byte offset. Returns `None` for offset zero (null).
    pub const fn new(offset: usize) -> Option<Self> {
        match NonZeroUsize::new(offset) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Byte offset from the start of linear memory.
    pub const fn offset(self) -> usize {
        self.0.get()
    }

    /// Address `bytes` past this one.
    ///
    /// # Panics
    ///
    /// Panics if the result overflows `usize`.
    pub fn add(self, bytes: usize) -> Self {
        match self.0.checked_add(bytes) {
            Some(offset) => Self(offset),
            None => panic!("heap address overflow: {:#x} + {bytes}", self.offset()),
        }
    }
}

impl fmt::Debug for HeapPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeapPtr({:#x})", self.offset())
    }
}

impl fmt::Display for HeapPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_null() {
        assert!(HeapPtr::new(0).is_none());
    }

    #[test]
    fn option_is_pointer_sized() {
        assert_eq!(
            std::mem::size_of::<Option<HeapPtr>>(),
            std::mem::size_of::<usize>()
        );
    }

    #[test]
    fn add_advances_offset() {
        let p = HeapPtr::new(0x800).unwrap();
        assert_eq!(p.add(0x20).offset(), 0x820);
        assert_eq!(format!("{p:?}"), "HeapPtr(0x800)");
    }
}
