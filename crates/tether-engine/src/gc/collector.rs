//! Mark-sweep collection pass and statistics

use super::heap::{Heap, Reclaimed};
use crate::object::JsObject;
use super::ObjId;
use crate::reference::ReferenceTable;
use std::time::{Duration, Instant};

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Total finalizers run (wrap payload finalizers included)
    pub finalizers_run: usize,

    /// Total pause time across all collections
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,

    /// Maximum pause time
    pub max_pause_time: Duration,

    /// Objects marked in last collection
    pub last_marked_count: usize,

    /// Objects freed in last collection
    pub last_freed_count: usize,

    /// Weak references cleared in last collection
    pub last_weak_cleared: usize,

    /// Live objects after last collection
    pub live_objects: usize,
}

impl GcStats {
    fn update(&mut self, pause_time: Duration, outcome: &Collection, live_objects: usize) {
        self.collections += 1;
        self.objects_freed += outcome.freed;
        self.total_pause_time += pause_time;
        self.last_pause_time = pause_time;
        if pause_time > self.max_pause_time {
            self.max_pause_time = pause_time;
        }
        self.last_marked_count = outcome.marked;
        self.last_freed_count = outcome.freed;
        self.last_weak_cleared = outcome.weak_cleared;
        self.live_objects = live_objects;
    }

    /// Average pause time
    pub fn avg_pause_time(&self) -> Duration {
        if self.collections == 0 {
            return Duration::ZERO;
        }
        self.total_pause_time / self.collections as u32
    }
}

/// Result of one pass, before finalizers have run.
pub(crate) struct Collection {
    pub(crate) marked: usize,
    pub(crate) freed: usize,
    pub(crate) weak_cleared: usize,
    pub(crate) reclaimed: Vec<Reclaimed>,
    /// Swept objects, still owning their closures. Drop only once the
    /// reference table is no longer borrowed.
    pub(crate) dead: Vec<Box<JsObject>>,
}

/// Run one full mark-sweep pass.
///
/// Weak references are cleared between mark and sweep, so by the time any
/// finalizer runs, every weak observer already reads the target as gone.
pub(crate) fn collect(
    heap: &mut Heap,
    mut roots: Vec<ObjId>,
    references: &mut ReferenceTable,
    stats: &mut GcStats,
) -> Collection {
    let start = Instant::now();

    roots.extend(references.strong_roots());
    let marked = heap.mark_from(roots);
    let weak_cleared = references.clear_unmarked(|id| heap.is_marked(id));
    let (freed, reclaimed, dead) = heap.sweep();

    let outcome = Collection {
        marked,
        freed,
        weak_cleared,
        reclaimed,
        dead,
    };
    let pause = start.elapsed();
    stats.update(pause, &outcome, heap.live_count());
    log::debug!(
        "gc: marked {} freed {} weak-cleared {} pending-finalize {} in {:?}",
        outcome.marked,
        outcome.freed,
        outcome.weak_cleared,
        outcome.reclaimed.len(),
        pause
    );
    outcome
}
