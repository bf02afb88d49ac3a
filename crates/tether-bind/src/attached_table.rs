//! Hidden per-object storage
//!
//! Each object can carry a map in an internal slot. Values stored there are
//! traced through the owner, so they live exactly as long as it does. Cached
//! properties and wrap-method bookkeeping both keep their values here.

use tether_engine::{Runtime, Value};

use crate::convert::{FromRuntime, ToRuntime};
use crate::error::BridgeResult;

const SLOT: &str = "tether.attached";

/// The hidden map of one object.
#[derive(Debug, Clone, Copy)]
pub struct AttachedTable {
    map: Value,
}

impl AttachedTable {
    /// The table of `owner`, created on first use
    pub fn new(rt: &mut Runtime, owner: Value) -> BridgeResult<Self> {
        if let Some(map) = rt.internal_slot(owner, SLOT) {
            return Ok(Self { map: rt.root(map) });
        }
        let map = rt.create_map();
        rt.set_internal_slot(owner, SLOT, map)?;
        Ok(Self { map })
    }

    /// The table of `owner`, if one was ever created
    pub fn existing(rt: &mut Runtime, owner: Value) -> Option<Self> {
        let map = rt.internal_slot(owner, SLOT)?;
        Some(Self { map: rt.root(map) })
    }

    /// Value stored under `key`
    pub fn get<K: ToRuntime>(&self, rt: &mut Runtime, key: K) -> BridgeResult<Option<Value>> {
        let key = key.to_runtime(rt)?;
        Ok(rt.map_get(self.map, key)?)
    }

    /// Value stored under `key`, converted
    pub fn get_as<K: ToRuntime, V: FromRuntime>(&self, rt: &mut Runtime, key: K) -> BridgeResult<Option<V>> {
        match self.get(rt, key)? {
            Some(value) => crate::convert::from_runtime(rt, value).map(Some),
            None => Ok(None),
        }
    }

    /// Store `value` under `key`
    pub fn set<K: ToRuntime, V: ToRuntime>(&self, rt: &mut Runtime, key: K, value: V) -> BridgeResult<()> {
        let key = key.to_runtime(rt)?;
        let value = value.to_runtime(rt)?;
        Ok(rt.map_set(self.map, key, value)?)
    }

    /// Remove `key`; returns whether it was present
    pub fn delete<K: ToRuntime>(&self, rt: &mut Runtime, key: K) -> BridgeResult<bool> {
        let key = key.to_runtime(rt)?;
        Ok(rt.map_delete(self.map, key)?)
    }

    /// Whether `key` is present
    pub fn contains<K: ToRuntime>(&self, rt: &mut Runtime, key: K) -> BridgeResult<bool> {
        Ok(self.get(rt, key)?.is_some())
    }

    /// Number of entries
    pub fn len(&self, rt: &Runtime) -> BridgeResult<usize> {
        Ok(rt.map_len(self.map)?)
    }

    /// Whether the table is empty
    pub fn is_empty(&self, rt: &Runtime) -> BridgeResult<bool> {
        Ok(self.len(rt)? == 0)
    }
}
