//! The runtime
//!
//! [`Runtime`] owns the heap, the root set, the reference table and the turn
//! queue. Everything that touches runtime values goes through `&mut Runtime`,
//! so a runtime is confined to the thread that created it.
//!
//! # Handle scopes
//!
//! Every heap value handed out by the runtime (newly created, read from a
//! property, returned from a call) is rooted in the innermost open scope.
//! [`Runtime::scope`] releases those roots when the closure returns;
//! [`Runtime::escape_scope`] carries one value out to the enclosing scope.
//! Values that must outlive any scope are pinned with a [`Reference`].
//!
//! # Finalization
//!
//! Objects can carry one wrap payload (with its own finalizer) and any number
//! of plain finalizers. When a collection reclaims the object, weak references
//! to it are cleared first; its finalizers then run on the next
//! [`Runtime::yield_turn`] (or immediately after the pass when
//! `defer_finalizers` is off).

use crate::error::{EngineResult, Exception};
use crate::gc::{self, GcStats, Heap, HeapObject, ObjId, Reclaimed, RootSet};
use crate::object::{
    FunctionData, JsObject, NativeCallback, ObjectKind, PropertyAttributes, PropertySlot,
    WrapFinalizer, WrapSlot,
};
use crate::options::RuntimeOptions;
use crate::reference::{Reference, ReferenceTable};
use crate::value::{Value, ValueType};
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Receiver, arguments and construct target of a host function call.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// The function being called
    pub callee: Value,
    /// Receiver (`undefined` for plain calls)
    pub this: Value,
    /// Positional arguments
    pub args: Vec<Value>,
    /// The constructor `new` was applied to, if this is a construct call
    pub new_target: Option<Value>,
}

impl CallInfo {
    /// Argument at `index`, or undefined when omitted
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).copied().unwrap_or_default()
    }

    /// Number of arguments passed
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Whether no arguments were passed
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Whether the function was invoked through `new`
    pub fn is_construct_call(&self) -> bool {
        self.new_target.is_some()
    }
}

/// Depth marker returned by [`Runtime::open_scope`].
#[derive(Debug)]
#[must_use = "an open scope must be closed"]
pub struct ScopeMark(usize);

/// Work queued for the next turn.
pub type Task = Box<dyn FnOnce(&mut Runtime)>;

/// A single-threaded garbage-collected runtime.
pub struct Runtime {
    heap: Heap,
    roots: RootSet,
    references: Rc<RefCell<ReferenceTable>>,

    global: ObjId,
    object_prototype: ObjId,
    function_prototype: ObjId,
    array_prototype: ObjId,
    map_prototype: ObjId,

    options: RuntimeOptions,
    stats: GcStats,
    pending_finalizers: Vec<Reclaimed>,
    tasks: VecDeque<Task>,
    instance_data: Option<Rc<dyn Any>>,

    collecting: bool,
    torn_down: bool,
}

impl Runtime {
    /// Create a runtime with default options
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    /// Create a runtime with the given options
    pub fn with_options(options: RuntimeOptions) -> Self {
        let mut heap = Heap::new();
        let mut alloc = |proto: Option<ObjId>| {
            heap.alloc(HeapObject::Object(Box::new(JsObject::new(
                ObjectKind::Ordinary,
                proto,
            ))))
        };
        let object_prototype = alloc(None);
        let function_prototype = alloc(Some(object_prototype));
        let array_prototype = alloc(Some(object_prototype));
        let map_prototype = alloc(Some(object_prototype));
        let global = alloc(Some(object_prototype));

        let mut rt = Self {
            heap,
            roots: RootSet::new(),
            references: Rc::new(RefCell::new(ReferenceTable::default())),
            global,
            object_prototype,
            function_prototype,
            array_prototype,
            map_prototype,
            options,
            stats: GcStats::default(),
            pending_finalizers: Vec::new(),
            tasks: VecDeque::new(),
            instance_data: None,
            collecting: false,
            torn_down: false,
        };
        for id in [
            object_prototype,
            function_prototype,
            array_prototype,
            map_prototype,
            global,
        ] {
            rt.roots.add_global_root(Value::object(id));
        }

        rt.scope(|rt| {
            rt.install_builtin("Object", object_prototype, true);
            rt.install_builtin("Function", function_prototype, false);
            rt.install_builtin("Array", array_prototype, false);
            rt.install_builtin("Map", map_prototype, false);
        });
        rt
    }

    fn install_builtin(&mut self, name: &str, prototype: ObjId, constructible: bool) {
        let ctor = self.alloc_function(
            name,
            Rc::new(|_: &mut Runtime, _: &CallInfo| Ok(Value::undefined())),
            constructible,
        );
        let proto = Value::object(prototype);
        self.insert_slot(ctor, "prototype", PropertySlot::data(proto, PropertyAttributes::NONE));
        self.insert_slot(
            proto,
            "constructor",
            PropertySlot::data(ctor, PropertyAttributes::new(true, false, true)),
        );
        self.insert_slot(
            Value::object(self.global),
            name,
            PropertySlot::data(ctor, PropertyAttributes::new(true, false, true)),
        );
    }

    /// The global object
    pub fn global(&self) -> Value {
        Value::object(self.global)
    }

    /// `Object.prototype`
    pub fn object_prototype(&self) -> Value {
        Value::object(self.object_prototype)
    }

    /// Options this runtime was created with
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    // ========================================================================
    // Handle scopes
    // ========================================================================

    /// Open a handle scope
    pub fn open_scope(&mut self) -> ScopeMark {
        ScopeMark(self.roots.stack_depth())
    }

    /// Close a scope, releasing every value rooted since it opened
    pub fn close_scope(&mut self, mark: ScopeMark) {
        self.roots.truncate_stack(mark.0);
    }

    /// Close a scope and re-root `value` in the enclosing one
    pub fn close_scope_escaping(&mut self, mark: ScopeMark, value: Value) -> Value {
        self.roots.truncate_stack(mark.0);
        self.roots.add_stack_root(value);
        value
    }

    /// Run `f` inside a fresh handle scope
    pub fn scope<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let mark = self.open_scope();
        let result = f(self);
        self.close_scope(mark);
        result
    }

    /// Run `f` inside a fresh handle scope, keeping its result value rooted
    pub fn escape_scope<E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<Value, E>,
    ) -> Result<Value, E> {
        let mark = self.open_scope();
        match f(self) {
            Ok(value) => Ok(self.close_scope_escaping(mark, value)),
            Err(e) => {
                self.close_scope(mark);
                Err(e)
            }
        }
    }

    /// Root `value` in the innermost scope
    pub fn root(&mut self, value: Value) -> Value {
        self.roots.add_stack_root(value);
        value
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    fn alloc(&mut self, cell: HeapObject) -> ObjId {
        self.maybe_collect();
        self.heap.alloc(cell)
    }

    fn alloc_object(&mut self, kind: ObjectKind, prototype: Option<ObjId>) -> Value {
        let id = self.alloc(HeapObject::Object(Box::new(JsObject::new(kind, prototype))));
        self.root(Value::object(id))
    }

    fn alloc_function(&mut self, name: &str, callback: NativeCallback, constructible: bool) -> Value {
        let data = FunctionData {
            name: name.to_string(),
            callback,
            constructible,
        };
        let func = self.alloc_object(ObjectKind::Function(data), Some(self.function_prototype));
        let name = self.create_string(name);
        self.insert_slot(
            func,
            "name",
            PropertySlot::data(name, PropertyAttributes::new(false, false, true)),
        );
        func
    }

    fn maybe_collect(&mut self) {
        let threshold = self.options.gc_threshold;
        if threshold > 0
            && !self.collecting
            && !self.torn_down
            && self.heap.allocated_since_gc() >= threshold
        {
            self.collect_garbage();
        }
    }

    /// Create a string
    pub fn create_string(&mut self, s: &str) -> Value {
        let id = self.alloc(HeapObject::Str(s.to_string()));
        self.root(Value::string(id))
    }

    /// Contents of a string value
    pub fn string(&self, value: Value) -> Option<&str> {
        self.heap.string(value.as_string_id()?)
    }

    /// Create a plain object inheriting from `Object.prototype`
    pub fn create_object(&mut self) -> Value {
        self.alloc_object(ObjectKind::Ordinary, Some(self.object_prototype))
    }

    /// Create a plain object with an explicit prototype (`null` for none)
    pub fn create_object_with_prototype(&mut self, prototype: Value) -> EngineResult<Value> {
        let proto = self.prototype_arg(prototype)?;
        Ok(self.alloc_object(ObjectKind::Ordinary, proto))
    }

    /// Create an array holding `items`
    pub fn create_array(&mut self, items: &[Value]) -> Value {
        self.alloc_object(ObjectKind::Array(items.to_vec()), Some(self.array_prototype))
    }

    /// Create an empty map
    pub fn create_map(&mut self) -> Value {
        self.alloc_object(ObjectKind::Map(Vec::new()), Some(self.map_prototype))
    }

    /// Create a plain (non-constructible) function
    pub fn create_function<F>(&mut self, name: &str, f: F) -> Value
    where
        F: Fn(&mut Runtime, &CallInfo) -> EngineResult<Value> + 'static,
    {
        self.alloc_function(name, Rc::new(f), false)
    }

    /// Create a constructor function with its own `prototype` object
    pub fn create_constructor<F>(&mut self, name: &str, f: F) -> Value
    where
        F: Fn(&mut Runtime, &CallInfo) -> EngineResult<Value> + 'static,
    {
        let ctor = self.alloc_function(name, Rc::new(f), true);
        let proto = self.create_object();
        self.insert_slot(
            proto,
            "constructor",
            PropertySlot::data(ctor, PropertyAttributes::new(true, false, true)),
        );
        self.insert_slot(
            ctor,
            "prototype",
            PropertySlot::data(proto, PropertyAttributes::new(true, false, false)),
        );
        ctor
    }

    // ========================================================================
    // Type queries
    // ========================================================================

    /// Runtime type of a value
    pub fn type_of(&self, value: Value) -> ValueType {
        if value.is_undefined() {
            ValueType::Undefined
        } else if value.is_null() {
            ValueType::Null
        } else if value.is_bool() {
            ValueType::Boolean
        } else if value.is_number() {
            ValueType::Number
        } else if value.is_string() {
            ValueType::String
        } else if self.function_data(value).is_some() {
            ValueType::Function
        } else {
            ValueType::Object
        }
    }

    /// Whether the value is an array
    pub fn is_array(&self, value: Value) -> bool {
        matches!(
            self.object_ref(value).map(|o| &o.kind),
            Some(ObjectKind::Array(_))
        )
    }

    /// Whether the value is a map
    pub fn is_map(&self, value: Value) -> bool {
        matches!(
            self.object_ref(value).map(|o| &o.kind),
            Some(ObjectKind::Map(_))
        )
    }

    /// Whether the value can be used with [`construct`](Self::construct)
    pub fn is_constructor(&self, value: Value) -> bool {
        self.function_data(value).is_some_and(|f| f.constructible)
    }

    /// Name a function was created with
    pub fn function_name(&self, value: Value) -> Option<&str> {
        self.function_data(value).map(|f| f.name.as_str())
    }

    /// Whether a value is a primitive or a live heap value
    pub fn is_alive(&self, value: Value) -> bool {
        match value.heap_id() {
            Some(id) => self.heap.is_live(id),
            None => true,
        }
    }

    fn object_ref(&self, value: Value) -> Option<&JsObject> {
        self.heap.object(value.as_object()?)
    }

    fn function_data(&self, value: Value) -> Option<&FunctionData> {
        self.object_ref(value)?.function()
    }

    fn live_object(&self, value: Value) -> EngineResult<ObjId> {
        match value.as_object() {
            Some(id) if self.heap.is_live(id) => Ok(id),
            Some(_) => Err(Exception::error("Object has been collected")),
            None => Err(Exception::type_error(format!(
                "{} is not an object",
                self.describe(value)
            ))),
        }
    }

    fn object_mut(&mut self, id: ObjId) -> EngineResult<&mut JsObject> {
        self.heap
            .object_mut(id)
            .ok_or_else(|| Exception::error("Object has been collected"))
    }

    /// Short description of a value for diagnostics
    pub fn describe(&self, value: Value) -> String {
        if let Some(s) = self.string(value) {
            return format!("\"{}\"", s);
        }
        if let Some(name) = self.function_name(value) {
            return if name.is_empty() {
                "anonymous function".to_string()
            } else {
                name.to_string()
            };
        }
        match self.type_of(value) {
            ValueType::Boolean | ValueType::Number => format!("{:?}", value),
            ty => ty.name().to_string(),
        }
    }

    // ========================================================================
    // Properties
    // ========================================================================

    fn insert_slot(&mut self, target: Value, key: &str, slot: PropertySlot) {
        if let Some(obj) = target.as_object().and_then(|id| self.heap.object_mut(id)) {
            obj.insert(key, slot);
        }
    }

    fn lookup(&self, id: ObjId, key: &str) -> Option<(ObjId, PropertySlot)> {
        let mut current = Some(id);
        while let Some(cur) = current {
            let obj = self.heap.object(cur)?;
            if let Some(slot) = obj.own(key).or_else(|| obj.exotic(key)) {
                return Some((cur, slot));
            }
            current = obj.prototype;
        }
        None
    }

    /// Read a property, walking the prototype chain and invoking getters
    pub fn get(&mut self, target: Value, key: &str) -> EngineResult<Value> {
        if target.is_nullish() {
            return Err(Exception::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                self.describe(target),
                key
            )));
        }
        if !target.is_object() {
            if key == "length" {
                if let Some(s) = self.string(target) {
                    return Ok(Value::number(s.encode_utf16().count() as f64));
                }
            }
            return Ok(Value::undefined());
        }
        let id = self.live_object(target)?;
        let value = match self.lookup(id, key) {
            Some((_, PropertySlot::Data { value, .. })) => value,
            Some((_, PropertySlot::Accessor { getter: Some(getter), .. })) => {
                return self.call(getter, target, &[]);
            }
            Some((_, PropertySlot::Accessor { getter: None, .. })) | None => Value::undefined(),
        };
        Ok(self.root(value))
    }

    /// Assign a property with ordinary (non-strict) semantics: writes to
    /// read-only properties are ignored, setters are invoked, anything else
    /// becomes an own data property.
    pub fn set(&mut self, target: Value, key: &str, value: Value) -> EngineResult<()> {
        if target.is_nullish() {
            return Err(Exception::type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                self.describe(target),
                key
            )));
        }
        if !target.is_object() {
            return Ok(());
        }
        let id = self.live_object(target)?;
        if self.set_array_element(id, key, value)? {
            return Ok(());
        }
        match self.lookup(id, key) {
            Some((_, PropertySlot::Accessor { setter, .. })) => {
                if let Some(setter) = setter {
                    self.call(setter, target, &[value])?;
                }
                Ok(())
            }
            Some((_, PropertySlot::Data { attributes, .. })) if !attributes.writable => Ok(()),
            Some((owner, PropertySlot::Data { attributes, .. })) if owner == id => {
                self.object_mut(id)?
                    .insert(key, PropertySlot::data(value, attributes));
                Ok(())
            }
            _ => {
                self.object_mut(id)?
                    .insert(key, PropertySlot::data(value, PropertyAttributes::DEFAULT));
                Ok(())
            }
        }
    }

    fn set_array_element(&mut self, id: ObjId, key: &str, value: Value) -> EngineResult<bool> {
        let ObjectKind::Array(items) = &mut self.object_mut(id)?.kind else {
            return Ok(false);
        };
        if key == "length" {
            if let Some(len) = value.as_number().filter(|n| *n >= 0.0) {
                items.resize(len as usize, Value::undefined());
            }
            return Ok(true);
        }
        match key.parse::<usize>() {
            Ok(i) if i < items.len() => items[i] = value,
            Ok(i) if i == items.len() => items.push(value),
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Delete an own property. Returns `false` if it is not configurable.
    pub fn delete(&mut self, target: Value, key: &str) -> EngineResult<bool> {
        let id = self.live_object(target)?;
        let obj = self.object_mut(id)?;
        match obj.own(key) {
            None => Ok(true),
            Some(slot) if !slot.is_configurable() => Ok(false),
            Some(_) => {
                obj.remove(key);
                Ok(true)
            }
        }
    }

    /// Define (or redefine) an own property
    pub fn define_property(&mut self, target: Value, key: &str, slot: PropertySlot) -> EngineResult<()> {
        let id = self.live_object(target)?;
        let obj = self.object_mut(id)?;
        if let Some(existing) = obj.own(key) {
            if !existing.is_configurable() && existing != slot {
                return Err(Exception::type_error(format!(
                    "Cannot redefine property: {}",
                    key
                )));
            }
        }
        obj.insert(key, slot);
        Ok(())
    }

    /// Own property slot, if any
    pub fn own_property(&self, target: Value, key: &str) -> Option<PropertySlot> {
        let obj = self.object_ref(target)?;
        obj.own(key).or_else(|| obj.exotic(key))
    }

    /// Whether the property exists on the object or its prototype chain
    pub fn has_property(&self, target: Value, key: &str) -> bool {
        target
            .as_object()
            .is_some_and(|id| self.lookup(id, key).is_some())
    }

    /// Whether the object has an own enumerable property `key`
    pub fn property_is_enumerable(&self, target: Value, key: &str) -> bool {
        self.own_property(target, key)
            .is_some_and(|slot| slot.is_enumerable())
    }

    /// Own enumerable keys in insertion order (array indices first)
    pub fn own_keys(&self, target: Value) -> EngineResult<Vec<String>> {
        let obj = self.heap.object(self.live_object(target)?).ok_or_else(|| {
            Exception::error("Object has been collected")
        })?;
        let mut keys = Vec::new();
        if let ObjectKind::Array(items) = &obj.kind {
            keys.extend((0..items.len()).map(|i| i.to_string()));
        }
        keys.extend(
            obj.properties
                .iter()
                .filter(|(_, slot)| slot.is_enumerable())
                .map(|(name, _)| name.clone()),
        );
        Ok(keys)
    }

    fn prototype_arg(&self, prototype: Value) -> EngineResult<Option<ObjId>> {
        if prototype.is_null() {
            return Ok(None);
        }
        self.live_object(prototype).map(Some).map_err(|_| {
            Exception::type_error(format!(
                "Object prototype may only be an Object or null: {}",
                self.describe(prototype)
            ))
        })
    }

    /// Prototype of an object (`None` for null or non-objects)
    pub fn get_prototype_of(&self, target: Value) -> Option<Value> {
        self.object_ref(target)?.prototype.map(Value::object)
    }

    /// Replace the prototype of an object
    pub fn set_prototype_of(&mut self, target: Value, prototype: Value) -> EngineResult<()> {
        let id = self.live_object(target)?;
        let proto = self.prototype_arg(prototype)?;

        let mut current = proto;
        while let Some(cur) = current {
            if cur == id {
                return Err(Exception::type_error("Cyclic __proto__ value"));
            }
            current = self.heap.object(cur).and_then(|o| o.prototype);
        }
        self.object_mut(id)?.prototype = proto;
        Ok(())
    }

    // ========================================================================
    // Internal slots
    // ========================================================================

    /// Read a hidden internal slot
    pub fn internal_slot(&self, target: Value, key: &'static str) -> Option<Value> {
        self.object_ref(target)?.internal.get(key).copied()
    }

    /// Write a hidden internal slot; the value is traced through the object
    pub fn set_internal_slot(&mut self, target: Value, key: &'static str, value: Value) -> EngineResult<()> {
        let id = self.live_object(target)?;
        self.object_mut(id)?.internal.insert(key, value);
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call a function with an explicit receiver
    pub fn call(&mut self, func: Value, this: Value, args: &[Value]) -> EngineResult<Value> {
        self.invoke(func, this, args, None)
    }

    fn invoke(
        &mut self,
        func: Value,
        this: Value,
        args: &[Value],
        new_target: Option<Value>,
    ) -> EngineResult<Value> {
        let callback = match self.function_data(func) {
            Some(data) => Rc::clone(&data.callback),
            None => {
                return Err(Exception::type_error(format!(
                    "{} is not a function",
                    self.describe(func)
                )))
            }
        };

        let mark = self.open_scope();
        self.roots.add_stack_root(func);
        self.roots.add_stack_root(this);
        for arg in args {
            self.roots.add_stack_root(*arg);
        }
        let info = CallInfo {
            callee: func,
            this,
            args: args.to_vec(),
            new_target,
        };
        match callback(self, &info) {
            Ok(value) => Ok(self.close_scope_escaping(mark, value)),
            Err(e) => {
                self.close_scope(mark);
                Err(e)
            }
        }
    }

    /// `new ctor(...args)`
    pub fn construct(&mut self, ctor: Value, args: &[Value]) -> EngineResult<Value> {
        if !self.is_constructor(ctor) {
            return Err(Exception::type_error(format!(
                "{} is not a constructor",
                self.describe(ctor)
            )));
        }
        let mark = self.open_scope();
        let proto = match self.get(ctor, "prototype") {
            Ok(proto) => proto.as_object().unwrap_or(self.object_prototype),
            Err(e) => {
                self.close_scope(mark);
                return Err(e);
            }
        };
        let this = self.alloc_object(ObjectKind::Ordinary, Some(proto));
        match self.invoke(ctor, this, args, Some(ctor)) {
            Ok(result) => {
                let instance = if result.is_object() { result } else { this };
                Ok(self.close_scope_escaping(mark, instance))
            }
            Err(e) => {
                self.close_scope(mark);
                Err(e)
            }
        }
    }

    /// `value instanceof ctor`
    pub fn instance_of(&mut self, value: Value, ctor: Value) -> EngineResult<bool> {
        if self.function_data(ctor).is_none() {
            return Err(Exception::type_error(
                "Right-hand side of 'instanceof' is not callable",
            ));
        }
        let Some(proto) = self.get(ctor, "prototype")?.as_object() else {
            return Err(Exception::type_error(
                "Function has non-object prototype in instanceof check",
            ));
        };
        let mut current = value.as_object();
        while let Some(cur) = current {
            match self.heap.object(cur).and_then(|o| o.prototype) {
                Some(p) if p == proto => return Ok(true),
                next => current = next,
            }
        }
        Ok(false)
    }

    // ========================================================================
    // Equality
    // ========================================================================

    /// `===`: numbers by value, strings by contents, objects by identity
    pub fn strict_equals(&self, a: Value, b: Value) -> bool {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return x == y;
        }
        if let (Some(x), Some(y)) = (a.as_string_id(), b.as_string_id()) {
            return x == y || self.heap.string(x) == self.heap.string(y);
        }
        a == b
    }

    /// SameValueZero: like `===` except NaN equals NaN
    pub fn same_value_zero(&self, a: Value, b: Value) -> bool {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return x == y || (x.is_nan() && y.is_nan());
        }
        self.strict_equals(a, b)
    }

    // ========================================================================
    // Arrays and maps
    // ========================================================================

    /// Array length, or `None` for non-arrays
    pub fn array_len(&self, value: Value) -> Option<usize> {
        match &self.object_ref(value)?.kind {
            ObjectKind::Array(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Array element (unrooted; it stays alive while the array does)
    pub fn array_get(&self, value: Value, index: usize) -> Option<Value> {
        match &self.object_ref(value)?.kind {
            ObjectKind::Array(items) => items.get(index).copied(),
            _ => None,
        }
    }

    fn map_entries(&self, map: Value) -> EngineResult<&Vec<(Value, Value)>> {
        match self.object_ref(map).map(|o| &o.kind) {
            Some(ObjectKind::Map(entries)) => Ok(entries),
            _ => Err(Exception::type_error(format!(
                "{} is not a Map",
                self.describe(map)
            ))),
        }
    }

    fn map_entries_mut(&mut self, map: Value) -> EngineResult<&mut Vec<(Value, Value)>> {
        let id = self.live_object(map)?;
        match &mut self.object_mut(id)?.kind {
            ObjectKind::Map(entries) => Ok(entries),
            _ => Err(Exception::type_error("receiver is not a Map")),
        }
    }

    fn map_index(&self, map: Value, key: Value) -> EngineResult<Option<usize>> {
        Ok(self
            .map_entries(map)?
            .iter()
            .position(|(k, _)| self.same_value_zero(*k, key)))
    }

    /// `map.get(key)`; `None` when absent
    pub fn map_get(&mut self, map: Value, key: Value) -> EngineResult<Option<Value>> {
        let value = self
            .map_index(map, key)?
            .map(|i| self.map_entries(map).map(|entries| entries[i].1))
            .transpose()?;
        Ok(value.map(|v| self.root(v)))
    }

    /// `map.set(key, value)`
    pub fn map_set(&mut self, map: Value, key: Value, value: Value) -> EngineResult<()> {
        let index = self.map_index(map, key)?;
        let entries = self.map_entries_mut(map)?;
        match index {
            Some(i) => entries[i].1 = value,
            None => entries.push((key, value)),
        }
        Ok(())
    }

    /// `map.delete(key)`
    pub fn map_delete(&mut self, map: Value, key: Value) -> EngineResult<bool> {
        let Some(i) = self.map_index(map, key)? else {
            return Ok(false);
        };
        self.map_entries_mut(map)?.remove(i);
        Ok(true)
    }

    /// `map.size`
    pub fn map_len(&self, map: Value) -> EngineResult<usize> {
        Ok(self.map_entries(map)?.len())
    }

    // ========================================================================
    // Native payloads and finalizers
    // ========================================================================

    /// Attach a native payload to an object. At most one payload per object.
    pub fn wrap(
        &mut self,
        target: Value,
        data: Box<dyn Any>,
        finalize: Option<WrapFinalizer>,
    ) -> EngineResult<()> {
        let id = self.live_object(target)?;
        let obj = self.object_mut(id)?;
        if obj.wrapped.is_some() {
            return Err(Exception::error("Object is already wrapped"));
        }
        obj.wrapped = Some(WrapSlot { data, finalize });
        Ok(())
    }

    /// The payload attached by [`wrap`](Self::wrap), if the object is alive
    pub fn unwrap(&self, target: Value) -> Option<&dyn Any> {
        self.object_ref(target)?
            .wrapped
            .as_ref()
            .map(|slot| slot.data.as_ref())
    }

    /// Register a callback to run after `target` has been collected
    pub fn add_finalizer<F>(&mut self, target: Value, f: F) -> EngineResult<()>
    where
        F: FnOnce(&mut Runtime) + 'static,
    {
        let id = self.live_object(target)?;
        self.object_mut(id)?.finalizers.push(Box::new(f));
        Ok(())
    }

    // ========================================================================
    // References
    // ========================================================================

    /// Create a reference with an initial count (0 = weak)
    pub fn create_reference(&mut self, value: Value, count: u32) -> Reference {
        Reference::new(&self.references, value, count)
    }

    /// Read a reference, rooting the value in the current scope
    pub fn reference_value(&mut self, reference: &Reference) -> Option<Value> {
        let value = reference.peek()?;
        Some(self.root(value))
    }

    /// Number of live references
    pub fn reference_count(&self) -> usize {
        self.references.borrow().live_count()
    }

    // ========================================================================
    // Collection
    // ========================================================================

    /// Run one full collection pass. Returns the number of cells freed.
    pub fn collect_garbage(&mut self) -> usize {
        if self.collecting {
            return 0;
        }
        self.collecting = true;

        let roots: Vec<ObjId> = self.roots.iter().filter_map(Value::heap_id).collect();
        let outcome = {
            let mut references = self.references.borrow_mut();
            gc::collect(&mut self.heap, roots, &mut references, &mut self.stats)
        };
        let freed = outcome.freed;
        self.pending_finalizers.extend(outcome.reclaimed);
        // Closures of dead functions may release references on drop
        drop(outcome.dead);
        self.collecting = false;

        if !self.options.defer_finalizers {
            self.run_pending_finalizers();
        }
        freed
    }

    /// Run every finalizer whose object has already been collected
    pub fn run_pending_finalizers(&mut self) -> usize {
        let mut ran = 0;
        while !self.pending_finalizers.is_empty() {
            let batch = std::mem::take(&mut self.pending_finalizers);
            for reclaimed in batch {
                if let Some(WrapSlot { data, finalize }) = reclaimed.wrapped {
                    match finalize {
                        Some(finalize) => {
                            self.scope(|rt| finalize(rt, data));
                            ran += 1;
                        }
                        None => drop(data),
                    }
                }
                for finalizer in reclaimed.finalizers {
                    self.scope(|rt| finalizer(rt));
                    ran += 1;
                }
            }
        }
        self.stats.finalizers_run += ran;
        ran
    }

    /// Number of finalizers waiting for the next turn
    pub fn pending_finalizer_count(&self) -> usize {
        self.pending_finalizers
            .iter()
            .map(|r| r.finalizers.len() + usize::from(r.wrapped.is_some()))
            .sum()
    }

    /// Collector statistics
    pub fn gc_stats(&self) -> &GcStats {
        &self.stats
    }

    /// Number of live heap cells
    pub fn live_objects(&self) -> usize {
        self.heap.live_count()
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Queue work for the next turn
    pub fn enqueue_task<F>(&mut self, task: F)
    where
        F: FnOnce(&mut Runtime) + 'static,
    {
        self.tasks.push_back(Box::new(task));
    }

    /// End the current turn: run pending finalizers, then every task queued
    /// before this call. Returns how many callbacks ran.
    pub fn yield_turn(&mut self) -> usize {
        let mut ran = self.run_pending_finalizers();
        let tasks: Vec<Task> = self.tasks.drain(..).collect();
        for task in tasks {
            self.scope(|rt| task(rt));
            ran += 1;
        }
        ran
    }

    // ========================================================================
    // Embedder data
    // ========================================================================

    /// Install per-runtime embedder data, returning the previous value
    pub fn set_instance_data<T: Any>(&mut self, data: Rc<T>) -> Option<Rc<dyn Any>> {
        self.instance_data.replace(data)
    }

    /// Per-runtime embedder data of type `T`
    pub fn instance_data<T: Any>(&self) -> Option<Rc<T>> {
        self.instance_data.clone()?.downcast::<T>().ok()
    }

    /// Remove the embedder data
    pub fn take_instance_data(&mut self) -> Option<Rc<dyn Any>> {
        self.instance_data.take()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Finalize every object that is still alive. The runtime stops
    /// collecting afterwards; dropping a runtime tears it down.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        log::debug!(
            "runtime teardown: {} live objects, {} pending finalizers",
            self.heap.live_count(),
            self.pending_finalizer_count()
        );
        self.torn_down = true;
        self.tasks.clear();
        loop {
            self.run_pending_finalizers();
            let rest = self.heap.drain_finalizers();
            if rest.is_empty() {
                break;
            }
            self.pending_finalizers.extend(rest);
        }
    }

    /// Whether [`teardown`](Self::teardown) has run
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.teardown();
    }
}
