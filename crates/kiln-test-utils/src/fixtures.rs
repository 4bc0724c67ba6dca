//! Drop tracking.
//!
//! [`DropCounter`] hands out [`Tracked`] values that bump a shared counter
//! when dropped. Tests move them into containers, then compare
//! [`DropCounter::count`] against the number of values that should have
//! been released.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Shared count of dropped [`Tracked`] values.
#[derive(Clone, Default)]
pub struct DropCounter {
    drops: Rc<Cell<usize>>,
}

impl DropCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A value tagged `id` that counts against this counter when dropped.
    pub fn track(&self, id: i32) -> Tracked {
        Tracked {
            id,
            drops: Rc::clone(&self.drops),
        }
    }

    /// Number of tracked values dropped so far.
    pub fn count(&self) -> usize {
        self.drops.get()
    }
}

impl fmt::Debug for DropCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropCounter")
            .field("drops", &self.drops.get())
            .finish()
    }
}

/// A value whose drop is recorded by its [`DropCounter`].
///
/// Clones share the counter, so each clone counts once when dropped.
/// Equality and hashing look at `id` only.
#[derive(Clone)]
pub struct Tracked {
    pub id: i32,
    drops: Rc<Cell<usize>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Tracked {}

impl std::hash::Hash for Tracked {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tracked({})", self.id)
    }
}
