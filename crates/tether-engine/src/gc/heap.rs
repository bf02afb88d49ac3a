//! Arena heap with generation-checked handles

use super::ObjId;
use crate::object::{Finalizer, JsObject, WrapSlot};

pub(crate) enum HeapObject {
    Str(String),
    Object(Box<JsObject>),
    Free,
}

/// What survives of a swept object: its wrap payload and finalizers.
pub(crate) struct Reclaimed {
    pub(crate) wrapped: Option<WrapSlot>,
    pub(crate) finalizers: Vec<Finalizer>,
}

impl Reclaimed {
    fn is_empty(&self) -> bool {
        self.wrapped.is_none() && self.finalizers.is_empty()
    }
}

pub(crate) struct Heap {
    cells: Vec<HeapObject>,
    generations: Vec<u16>,
    marks: Vec<bool>,
    free_list: Vec<u32>,
    live: usize,
    allocated_since_gc: usize,
}

impl Heap {
    pub(crate) fn new() -> Self {
        Self {
            cells: Vec::new(),
            generations: Vec::new(),
            marks: Vec::new(),
            free_list: Vec::new(),
            live: 0,
            allocated_since_gc: 0,
        }
    }

    pub(crate) fn alloc(&mut self, object: HeapObject) -> ObjId {
        self.live += 1;
        self.allocated_since_gc += 1;
        if let Some(index) = self.free_list.pop() {
            let i = index as usize;
            self.cells[i] = object;
            self.marks[i] = false;
            ObjId::new(index, self.generations[i])
        } else {
            let index = self.cells.len() as u32;
            self.cells.push(object);
            self.generations.push(0);
            self.marks.push(false);
            ObjId::new(index, 0)
        }
    }

    pub(crate) fn get(&self, id: ObjId) -> Option<&HeapObject> {
        let i = id.index as usize;
        if self.generations.get(i) != Some(&id.generation) {
            return None;
        }
        match &self.cells[i] {
            HeapObject::Free => None,
            cell => Some(cell),
        }
    }

    pub(crate) fn get_mut(&mut self, id: ObjId) -> Option<&mut HeapObject> {
        let i = id.index as usize;
        if self.generations.get(i) != Some(&id.generation) {
            return None;
        }
        match &mut self.cells[i] {
            HeapObject::Free => None,
            cell => Some(cell),
        }
    }

    pub(crate) fn object(&self, id: ObjId) -> Option<&JsObject> {
        match self.get(id)? {
            HeapObject::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub(crate) fn object_mut(&mut self, id: ObjId) -> Option<&mut JsObject> {
        match self.get_mut(id)? {
            HeapObject::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub(crate) fn string(&self, id: ObjId) -> Option<&str> {
        match self.get(id)? {
            HeapObject::Str(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn is_live(&self, id: ObjId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live
    }

    pub(crate) fn allocated_since_gc(&self) -> usize {
        self.allocated_since_gc
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Mark everything reachable from `roots`; returns the number of cells marked.
    pub(crate) fn mark_from(&mut self, roots: Vec<ObjId>) -> usize {
        self.marks.iter_mut().for_each(|m| *m = false);

        let mut marked = 0;
        let mut worklist = roots;
        let mut children = Vec::new();
        while let Some(id) = worklist.pop() {
            let i = id.index as usize;
            if !self.is_live(id) || self.marks[i] {
                continue;
            }
            self.marks[i] = true;
            marked += 1;
            if let HeapObject::Object(obj) = &self.cells[i] {
                obj.trace(&mut children);
                worklist.append(&mut children);
            }
        }
        marked
    }

    pub(crate) fn is_marked(&self, id: ObjId) -> bool {
        self.is_live(id) && self.marks[id.index as usize]
    }

    /// Free every unmarked cell. Returns the number freed, the payloads of
    /// freed objects that still need finalizing, and the dead objects
    /// themselves.
    ///
    /// Dead objects are handed back rather than dropped here: a native
    /// function's closure may own a `Reference`, and releasing it needs the
    /// reference table the caller is still holding.
    pub(crate) fn sweep(&mut self) -> (usize, Vec<Reclaimed>, Vec<Box<JsObject>>) {
        let mut freed = 0;
        let mut reclaimed = Vec::new();
        let mut dead = Vec::new();
        for i in 0..self.cells.len() {
            if self.marks[i] || matches!(self.cells[i], HeapObject::Free) {
                continue;
            }
            let cell = std::mem::replace(&mut self.cells[i], HeapObject::Free);
            if let HeapObject::Object(mut obj) = cell {
                let rest = Reclaimed {
                    wrapped: obj.wrapped.take(),
                    finalizers: std::mem::take(&mut obj.finalizers),
                };
                if !rest.is_empty() {
                    reclaimed.push(rest);
                }
                dead.push(obj);
            }
            self.generations[i] = self.generations[i].wrapping_add(1);
            self.free_list.push(i as u32);
            freed += 1;
        }
        self.live -= freed;
        self.allocated_since_gc = 0;
        (freed, reclaimed, dead)
    }

    /// Take the wrap payloads and finalizers of every live object, leaving the
    /// objects themselves in place. Used at teardown.
    pub(crate) fn drain_finalizers(&mut self) -> Vec<Reclaimed> {
        self.cells
            .iter_mut()
            .filter_map(|cell| match cell {
                HeapObject::Object(obj) => {
                    let rest = Reclaimed {
                        wrapped: obj.wrapped.take(),
                        finalizers: std::mem::take(&mut obj.finalizers),
                    };
                    (!rest.is_empty()).then_some(rest)
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;
    use crate::value::Value;

    fn plain() -> HeapObject {
        HeapObject::Object(Box::new(JsObject::new(ObjectKind::Ordinary, None)))
    }

    #[test]
    fn test_sweep_frees_unreachable() {
        let mut heap = Heap::new();
        let a = heap.alloc(plain());
        let b = heap.alloc(HeapObject::Str("garbage".into()));

        heap.mark_from(vec![a]);
        let (freed, _, dead) = heap.sweep();

        assert_eq!(freed, 1);
        assert!(dead.is_empty());
        assert!(heap.is_live(a));
        assert!(!heap.is_live(b));
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn test_stale_handle_does_not_resolve_to_reused_slot() {
        let mut heap = Heap::new();
        let old = heap.alloc(HeapObject::Str("old".into()));
        heap.mark_from(Vec::new());
        heap.sweep();

        let new = heap.alloc(HeapObject::Str("new".into()));
        assert_eq!(old.index, new.index);
        assert_eq!(heap.string(old), None);
        assert_eq!(heap.string(new), Some("new"));
    }

    #[test]
    fn test_mark_follows_properties() {
        let mut heap = Heap::new();
        let child = heap.alloc(HeapObject::Str("child".into()));
        let mut parent = JsObject::new(ObjectKind::Ordinary, None);
        parent.insert(
            "child",
            crate::object::PropertySlot::data(
                Value::string(child),
                crate::object::PropertyAttributes::DEFAULT,
            ),
        );
        let parent = heap.alloc(HeapObject::Object(Box::new(parent)));

        assert_eq!(heap.mark_from(vec![parent]), 2);
        assert!(heap.is_marked(child));
    }

    #[test]
    fn test_sweep_hands_back_finalizers() {
        let mut heap = Heap::new();
        let mut obj = JsObject::new(ObjectKind::Ordinary, None);
        obj.finalizers.push(Box::new(|_| {}));
        heap.alloc(HeapObject::Object(Box::new(obj)));
        heap.alloc(plain());

        heap.mark_from(Vec::new());
        let (freed, reclaimed, dead) = heap.sweep();
        assert_eq!(freed, 2);
        assert_eq!(dead.len(), 2);
        assert_eq!(reclaimed.len(), 1);
    }
}
