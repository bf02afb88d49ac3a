//! Handles that outlive a handle scope
//!
//! [`Persistent`] wraps an engine [`Reference`] and can switch between
//! keeping its target alive (strong) and merely observing it (weak).
//! [`PersistentMap`] keys persistents by native values and drops entries
//! whose targets were collected. [`WeakSlot`] pairs a weak handle with a
//! callback that fires once the target is gone.

use rustc_hash::FxHashMap;
use std::hash::Hash;
use tether_engine::{Reference, Runtime, Value};

use crate::error::BridgeResult;

/// A strong or weak handle to a runtime value.
#[derive(Debug, Clone, Default)]
pub struct Persistent {
    reference: Option<Reference>,
}

impl Persistent {
    /// Hold `value` strongly
    pub fn new(rt: &mut Runtime, value: Value) -> Self {
        Self {
            reference: Some(rt.create_reference(value, 1)),
        }
    }

    /// Observe `value` without keeping it alive
    pub fn weak(rt: &mut Runtime, value: Value) -> Self {
        Self {
            reference: Some(rt.create_reference(value, 0)),
        }
    }

    /// A handle to nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// The target, rooted in the current scope. `None` when empty or when a
    /// weak target has been collected.
    pub fn value(&self, rt: &mut Runtime) -> Option<Value> {
        rt.reference_value(self.reference.as_ref()?)
    }

    /// The target without rooting it
    pub fn peek(&self) -> Option<Value> {
        self.reference.as_ref()?.peek()
    }

    /// Whether there is no target (never set, reset, or collected)
    pub fn is_empty(&self) -> bool {
        self.peek().is_none()
    }

    /// Whether the target is not kept alive by this handle
    pub fn is_weak(&self) -> bool {
        self.reference.as_ref().map_or(true, Reference::is_weak)
    }

    /// Stop keeping the target alive
    pub fn make_weak(&self) {
        if let Some(reference) = &self.reference {
            while reference.decrement() > 0 {}
        }
    }

    /// Keep the target alive again. Has no effect once it was collected.
    pub fn make_strong(&self) {
        if let Some(reference) = &self.reference {
            if reference.is_weak() && reference.peek().is_some() {
                reference.increment();
            }
        }
    }

    /// Drop the target
    pub fn reset(&mut self) {
        self.reference = None;
    }
}

/// Native-keyed table of persistent handles.
///
/// Lookups of collected entries remove them, so the table never hands out a
/// dead value.
#[derive(Debug)]
pub struct PersistentMap<K> {
    entries: FxHashMap<K, Persistent>,
}

impl<K: Eq + Hash> Default for PersistentMap<K> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<K: Eq + Hash> PersistentMap<K> {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `value` strongly under `key`, replacing any previous entry
    pub fn insert(&mut self, rt: &mut Runtime, key: K, value: Value) {
        self.entries.insert(key, Persistent::new(rt, value));
    }

    /// Hold `value` weakly under `key`
    pub fn insert_weak(&mut self, rt: &mut Runtime, key: K, value: Value) {
        self.entries.insert(key, Persistent::weak(rt, value));
    }

    /// The value under `key`, rooted in the current scope
    pub fn get(&mut self, rt: &mut Runtime, key: &K) -> Option<Value> {
        let value = self.entries.get(key)?.value(rt);
        if value.is_none() {
            self.entries.remove(key);
        }
        value
    }

    /// Whether `key` maps to a live value
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.get(key).is_some_and(|p| !p.is_empty())
    }

    /// Demote the entry under `key` to a weak handle
    pub fn make_weak(&mut self, key: &K) -> bool {
        match self.entries.get(key) {
            Some(handle) => {
                handle.make_weak();
                true
            }
            None => false,
        }
    }

    /// Remove the entry under `key`
    pub fn remove(&mut self, key: &K) -> Option<Persistent> {
        self.entries.remove(key)
    }

    /// Drop every entry whose target was collected; returns how many
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, handle| !handle.is_empty());
        before - self.entries.len()
    }

    /// Number of entries, including collected ones not yet pruned
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A weak handle that runs a callback when its target is collected.
#[derive(Debug, Default)]
pub struct WeakSlot {
    handle: Persistent,
}

impl WeakSlot {
    /// An empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `value`; `on_collect` runs in the turn after it is collected
    pub fn observe<F>(&mut self, rt: &mut Runtime, value: Value, on_collect: F) -> BridgeResult<()>
    where
        F: FnOnce(&mut Runtime) + 'static,
    {
        rt.add_finalizer(value, on_collect)?;
        self.handle = Persistent::weak(rt, value);
        Ok(())
    }

    /// The observed value, if still alive
    pub fn get(&self, rt: &mut Runtime) -> Option<Value> {
        self.handle.value(rt)
    }

    /// Whether nothing is observed any more
    pub fn is_empty(&self) -> bool {
        self.handle.is_empty()
    }
}
