//! Garbage collection
//!
//! Objects live in an arena addressed by [`ObjId`] handles (slot index plus a
//! generation counter, so a handle to a reclaimed slot never resolves to the
//! slot's next occupant). Collection is a stop-the-world mark-sweep pass:
//!
//! 1. mark everything reachable from the root set, the global object and the
//!    strong entries of the reference table;
//! 2. clear weak references whose target was not marked;
//! 3. sweep unmarked cells, handing their wrap payloads and finalizers back to
//!    the runtime, which runs them after the pass (or on the next turn).

mod collector;
mod heap;
mod roots;

pub use collector::GcStats;
pub use roots::RootSet;

pub(crate) use collector::collect;
pub(crate) use heap::{Heap, HeapObject, Reclaimed};

use std::fmt;

/// Handle to a heap cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId {
    pub(crate) index: u32,
    pub(crate) generation: u16,
}

impl ObjId {
    pub(crate) const fn new(index: u32, generation: u16) -> Self {
        Self { index, generation }
    }

    pub(crate) const fn to_payload(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub(crate) const fn from_payload(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u16,
        }
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}
