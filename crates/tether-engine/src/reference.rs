//! Counted references
//!
//! A [`Reference`] pins a value across handle scopes. While its count is
//! above zero the value is a GC root; at zero the reference is weak and reads
//! back as `None` once the target has been collected. References release
//! their table slot on drop, so they can be owned by native data structures
//! that outlive any particular borrow of the runtime.

use crate::gc::ObjId;
use crate::value::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

struct RefSlot {
    value: Option<Value>,
    count: u32,
    in_use: bool,
}

/// Table of all references created by a runtime.
#[derive(Default)]
pub(crate) struct ReferenceTable {
    slots: Vec<RefSlot>,
    free: Vec<u32>,
}

impl ReferenceTable {
    fn insert(&mut self, value: Option<Value>, count: u32) -> u32 {
        let slot = RefSlot {
            value,
            count,
            in_use: true,
        };
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = slot;
                index
            }
            None => {
                self.slots.push(slot);
                (self.slots.len() - 1) as u32
            }
        }
    }

    fn release(&mut self, index: u32) {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            slot.in_use = false;
            slot.value = None;
            slot.count = 0;
            self.free.push(index);
        }
    }

    fn slot(&self, index: u32) -> &RefSlot {
        &self.slots[index as usize]
    }

    fn slot_mut(&mut self, index: u32) -> &mut RefSlot {
        &mut self.slots[index as usize]
    }

    /// Heap targets of every reference with a positive count
    pub(crate) fn strong_roots(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.slots
            .iter()
            .filter(|slot| slot.in_use && slot.count > 0)
            .filter_map(|slot| slot.value.and_then(Value::heap_id))
    }

    /// Empty every weak reference whose target did not survive marking
    pub(crate) fn clear_unmarked(&mut self, is_marked: impl Fn(ObjId) -> bool) -> usize {
        let mut cleared = 0;
        for slot in self.slots.iter_mut().filter(|s| s.in_use && s.count == 0) {
            if let Some(id) = slot.value.and_then(Value::heap_id) {
                if !is_marked(id) {
                    slot.value = None;
                    cleared += 1;
                }
            }
        }
        cleared
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }
}

/// Owned handle to a reference-table entry.
pub struct Reference {
    table: Rc<RefCell<ReferenceTable>>,
    index: u32,
}

impl Reference {
    pub(crate) fn new(table: &Rc<RefCell<ReferenceTable>>, value: Value, count: u32) -> Self {
        Self::with_slot(table, Some(value), count)
    }

    fn with_slot(table: &Rc<RefCell<ReferenceTable>>, value: Option<Value>, count: u32) -> Self {
        let index = table.borrow_mut().insert(value, count);
        Self {
            table: Rc::clone(table),
            index,
        }
    }

    /// Current count; zero means weak
    pub fn count(&self) -> u32 {
        self.table.borrow().slot(self.index).count
    }

    /// Whether the reference no longer keeps its target alive
    pub fn is_weak(&self) -> bool {
        self.count() == 0
    }

    /// Increment the count, returning the new value
    pub fn increment(&self) -> u32 {
        let mut table = self.table.borrow_mut();
        let slot = table.slot_mut(self.index);
        slot.count += 1;
        slot.count
    }

    /// Decrement the count (saturating at zero), returning the new value
    pub fn decrement(&self) -> u32 {
        let mut table = self.table.borrow_mut();
        let slot = table.slot_mut(self.index);
        slot.count = slot.count.saturating_sub(1);
        slot.count
    }

    /// Target value without rooting it; `None` once a weak target was collected.
    ///
    /// Prefer [`Runtime::reference_value`](crate::Runtime::reference_value),
    /// which also roots the value in the current scope.
    pub fn peek(&self) -> Option<Value> {
        self.table.borrow().slot(self.index).value
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        if let Ok(mut table) = self.table.try_borrow_mut() {
            table.release(self.index);
        } else {
            log::warn!("reference #{} dropped while its table was borrowed", self.index);
        }
    }
}

/// Cloning creates a separate entry with the same target and count, so a
/// clone of a weak reference is weak and a clone of a strong one is strong.
impl Clone for Reference {
    fn clone(&self) -> Self {
        let (value, count) = {
            let table = self.table.borrow();
            let slot = table.slot(self.index);
            (slot.value, slot.count)
        };
        Self::with_slot(&self.table, value, count)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("index", &self.index)
            .field("count", &self.count())
            .field("value", &self.peek())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Rc<RefCell<ReferenceTable>> {
        Rc::new(RefCell::new(ReferenceTable::default()))
    }

    #[test]
    fn test_counts_toggle_weakness() {
        let table = table();
        let r = Reference::new(&table, Value::i32(1), 1);
        assert!(!r.is_weak());
        assert_eq!(r.decrement(), 0);
        assert!(r.is_weak());
        assert_eq!(r.decrement(), 0);
        assert_eq!(r.increment(), 1);
    }

    #[test]
    fn test_weak_entries_cleared_when_unmarked() {
        let table = table();
        let id = ObjId::new(5, 0);
        let strong = Reference::new(&table, Value::object(id), 1);
        let weak = Reference::new(&table, Value::object(id), 0);

        assert_eq!(table.borrow().strong_roots().collect::<Vec<_>>(), vec![id]);
        let cleared = table.borrow_mut().clear_unmarked(|_| false);

        assert_eq!(cleared, 1);
        assert_eq!(strong.peek(), Some(Value::object(id)));
        assert_eq!(weak.peek(), None);
    }

    #[test]
    fn test_clone_keeps_mode_and_target() {
        let table = table();
        let weak = Reference::new(&table, Value::i32(3), 0);
        let copy = weak.clone();
        assert!(copy.is_weak());
        assert_eq!(copy.peek(), Some(Value::i32(3)));

        // Independent counts
        copy.increment();
        assert!(weak.is_weak());
        assert_eq!(table.borrow().live_count(), 2);
    }

    #[test]
    fn test_drop_releases_slot() {
        let table = table();
        let r = Reference::new(&table, Value::null(), 1);
        assert_eq!(table.borrow().live_count(), 1);
        drop(r);
        assert_eq!(table.borrow().live_count(), 0);

        let again = Reference::new(&table, Value::bool(true), 0);
        assert_eq!(again.index, 0);
        assert_eq!(again.peek(), Some(Value::bool(true)));
    }
}
