//! Object model
//!
//! Heap objects carry an ordered list of own properties, an optional
//! prototype link, hidden internal slots, an optional native wrap payload and
//! any number of finalizers. Property semantics follow the usual
//! writable / enumerable / configurable attribute model.

use crate::error::EngineResult;
use crate::gc::ObjId;
use crate::runtime::{CallInfo, Runtime};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::rc::Rc;

/// Host function backing a callable object.
pub type NativeCallback = Rc<dyn Fn(&mut Runtime, &CallInfo) -> EngineResult<Value>>;

/// Callback run once after the object it is attached to has been collected.
pub type Finalizer = Box<dyn FnOnce(&mut Runtime)>;

/// Finalizer for a wrap payload; receives the payload back.
pub type WrapFinalizer = Box<dyn FnOnce(&mut Runtime, Box<dyn Any>)>;

/// Attribute flags of a data property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// Value can be changed by assignment
    pub writable: bool,
    /// Shows up in own-key enumeration
    pub enumerable: bool,
    /// Can be deleted or redefined
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Attributes of a property created by plain assignment.
    pub const DEFAULT: Self = Self::new(true, true, true);

    /// Read-only, hidden, permanent.
    pub const NONE: Self = Self::new(false, false, false);

    /// Create attributes from individual flags
    pub const fn new(writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            writable,
            enumerable,
            configurable,
        }
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// An own property: either a plain value or a getter/setter pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertySlot {
    /// Plain value
    Data {
        /// Stored value
        value: Value,
        /// Attribute flags
        attributes: PropertyAttributes,
    },
    /// Getter/setter pair; both are function values
    Accessor {
        /// Called with the receiver on read
        getter: Option<Value>,
        /// Called with the receiver and the new value on write
        setter: Option<Value>,
        /// Shows up in own-key enumeration
        enumerable: bool,
        /// Can be deleted or redefined
        configurable: bool,
    },
}

impl PropertySlot {
    /// Data slot with the given attributes
    pub fn data(value: Value, attributes: PropertyAttributes) -> Self {
        PropertySlot::Data { value, attributes }
    }

    /// Whether the slot can be deleted or redefined
    pub fn is_configurable(&self) -> bool {
        match self {
            PropertySlot::Data { attributes, .. } => attributes.configurable,
            PropertySlot::Accessor { configurable, .. } => *configurable,
        }
    }

    /// Whether the slot shows up in own-key enumeration
    pub fn is_enumerable(&self) -> bool {
        match self {
            PropertySlot::Data { attributes, .. } => attributes.enumerable,
            PropertySlot::Accessor { enumerable, .. } => *enumerable,
        }
    }

    fn trace(&self, out: &mut Vec<ObjId>) {
        match self {
            PropertySlot::Data { value, .. } => out.extend(value.heap_id()),
            PropertySlot::Accessor { getter, setter, .. } => {
                out.extend(getter.and_then(Value::heap_id));
                out.extend(setter.and_then(Value::heap_id));
            }
        }
    }
}

pub(crate) struct FunctionData {
    pub(crate) name: String,
    pub(crate) callback: NativeCallback,
    pub(crate) constructible: bool,
}

pub(crate) enum ObjectKind {
    Ordinary,
    Function(FunctionData),
    Array(Vec<Value>),
    /// Insertion-ordered entries, keys compared with SameValueZero
    Map(Vec<(Value, Value)>),
}

pub(crate) struct WrapSlot {
    pub(crate) data: Box<dyn Any>,
    pub(crate) finalize: Option<WrapFinalizer>,
}

pub(crate) struct JsObject {
    pub(crate) kind: ObjectKind,
    pub(crate) prototype: Option<ObjId>,
    pub(crate) properties: Vec<(String, PropertySlot)>,
    pub(crate) internal: FxHashMap<&'static str, Value>,
    pub(crate) wrapped: Option<WrapSlot>,
    pub(crate) finalizers: Vec<Finalizer>,
}

impl JsObject {
    pub(crate) fn new(kind: ObjectKind, prototype: Option<ObjId>) -> Self {
        Self {
            kind,
            prototype,
            properties: Vec::new(),
            internal: FxHashMap::default(),
            wrapped: None,
            finalizers: Vec::new(),
        }
    }

    pub(crate) fn own(&self, key: &str) -> Option<PropertySlot> {
        self.properties
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, slot)| *slot)
    }

    pub(crate) fn own_mut(&mut self, key: &str) -> Option<&mut PropertySlot> {
        self.properties
            .iter_mut()
            .find(|(name, _)| name == key)
            .map(|(_, slot)| slot)
    }

    pub(crate) fn insert(&mut self, key: &str, slot: PropertySlot) {
        match self.own_mut(key) {
            Some(existing) => *existing = slot,
            None => self.properties.push((key.to_string(), slot)),
        }
    }

    pub(crate) fn remove(&mut self, key: &str) {
        self.properties.retain(|(name, _)| name != key);
    }

    /// Synthesized own slots of exotic objects (array `length` and indices)
    pub(crate) fn exotic(&self, key: &str) -> Option<PropertySlot> {
        let ObjectKind::Array(items) = &self.kind else {
            return None;
        };
        if key == "length" {
            let len = Value::number(items.len() as f64);
            return Some(PropertySlot::data(len, PropertyAttributes::new(true, false, false)));
        }
        let index: usize = key.parse().ok()?;
        items
            .get(index)
            .map(|v| PropertySlot::data(*v, PropertyAttributes::DEFAULT))
    }

    pub(crate) fn function(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(data) => Some(data),
            _ => None,
        }
    }

    /// Push every heap handle this object keeps alive
    pub(crate) fn trace(&self, out: &mut Vec<ObjId>) {
        out.extend(self.prototype);
        for (_, slot) in &self.properties {
            slot.trace(out);
        }
        out.extend(self.internal.values().filter_map(|v| v.heap_id()));
        match &self.kind {
            ObjectKind::Ordinary | ObjectKind::Function(_) => {}
            ObjectKind::Array(items) => out.extend(items.iter().filter_map(|v| v.heap_id())),
            ObjectKind::Map(entries) => {
                for (k, v) in entries {
                    out.extend(k.heap_id());
                    out.extend(v.heap_id());
                }
            }
        }
    }
}
