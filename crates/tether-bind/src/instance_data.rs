//! Per-runtime bridge state
//!
//! Installed as the runtime's instance data by [`init`](crate::init). Holds
//! the identity map (native address to weak wrapper) and the class cache.
//! Borrows of the inner cells never span a call back into the runtime.

use rustc_hash::FxHashMap;
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tether_engine::{Runtime, Value};

use crate::class::ClassState;
use crate::error::{BridgeError, BridgeResult};
use crate::options::BridgeOptions;
use crate::persistent::Persistent;

struct IdentityEntry {
    wrapper: Persistent,
    serial: u64,
}

/// Cached definition of a class in one runtime.
pub(crate) struct ClassDescriptor {
    pub name: &'static str,
    pub parent: Option<&'static str>,
    pub constructible: bool,
    pub constructor: Persistent,
}

/// Bridge state owned by one runtime.
pub struct InstanceData {
    options: BridgeOptions,
    identity: RefCell<FxHashMap<usize, IdentityEntry>>,
    classes: RefCell<FxHashMap<TypeId, ClassDescriptor>>,
    creating_instance: Cell<bool>,
    next_serial: Cell<u64>,
}

impl InstanceData {
    pub(crate) fn new(options: BridgeOptions) -> Self {
        Self {
            options,
            identity: RefCell::new(FxHashMap::default()),
            classes: RefCell::new(FxHashMap::default()),
            creating_instance: Cell::new(false),
            next_serial: Cell::new(1),
        }
    }

    /// The bridge state of `rt`
    pub fn get(rt: &Runtime) -> BridgeResult<Rc<Self>> {
        rt.instance_data::<Self>().ok_or(BridgeError::NotInitialized)
    }

    /// Options the bridge was initialized with
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    // ========================================================================
    // Identity map
    // ========================================================================

    /// Live wrapper of the native object at `addr`, rooted in the current scope
    pub(crate) fn lookup_wrapper(&self, rt: &mut Runtime, addr: usize) -> Option<Value> {
        let wrapper = self.identity.borrow().get(&addr)?.wrapper.peek()?;
        Some(rt.root(wrapper))
    }

    /// Record `wrapper` for `addr`, returning the entry's serial
    pub(crate) fn insert_wrapper(&self, rt: &mut Runtime, addr: usize, wrapper: Value) -> u64 {
        let serial = self.next_serial.get();
        self.next_serial.set(serial + 1);
        let entry = IdentityEntry {
            wrapper: Persistent::weak(rt, wrapper),
            serial,
        };
        let previous = self.identity.borrow_mut().insert(addr, entry);
        drop(previous);
        serial
    }

    /// Remove the entry for `addr` if it still belongs to `serial`
    pub(crate) fn remove_wrapper(&self, addr: usize, serial: u64) -> bool {
        let removed = {
            let mut identity = self.identity.borrow_mut();
            match identity.get(&addr) {
                Some(entry) if entry.serial == serial => identity.remove(&addr),
                _ => None,
            }
        };
        removed.is_some()
    }

    /// Number of identity entries
    pub fn wrapper_count(&self) -> usize {
        self.identity.borrow().len()
    }

    // ========================================================================
    // Classes
    // ========================================================================

    pub(crate) fn class_constructor(&self, rt: &mut Runtime, id: TypeId) -> Option<Value> {
        let ctor = self.classes.borrow().get(&id)?.constructor.peek()?;
        Some(rt.root(ctor))
    }

    pub(crate) fn register_class(&self, id: TypeId, descriptor: ClassDescriptor) {
        log::debug!(
            "class {} registered (parent: {}, constructible: {})",
            descriptor.name,
            descriptor.parent.unwrap_or("none"),
            descriptor.constructible
        );
        let previous = self.classes.borrow_mut().insert(id, descriptor);
        drop(previous);
    }

    pub(crate) fn unregister_class(&self, id: TypeId) {
        let removed = self.classes.borrow_mut().remove(&id);
        drop(removed);
    }

    pub(crate) fn class_state(&self, id: TypeId) -> ClassState {
        match self.classes.borrow().get(&id) {
            None => ClassState::Unregistered,
            Some(class) if class.constructible => ClassState::Constructible,
            Some(_) => ClassState::Registered,
        }
    }

    /// Number of classes defined in this runtime
    pub fn class_count(&self) -> usize {
        self.classes.borrow().len()
    }

    // ========================================================================
    // Instance creation
    // ========================================================================

    /// Mark that the bridge itself is constructing a wrapper, so class
    /// constructors skip native construction. Returns the previous flag.
    pub(crate) fn set_creating_instance(&self, creating: bool) -> bool {
        self.creating_instance.replace(creating)
    }

    pub(crate) fn is_creating_instance(&self) -> bool {
        self.creating_instance.get()
    }

    /// Drop every entry
    pub(crate) fn clear(&self) {
        let identity = std::mem::take(&mut *self.identity.borrow_mut());
        let classes = std::mem::take(&mut *self.classes.borrow_mut());
        log::debug!(
            "bridge state cleared: {} identity entries, {} classes",
            identity.len(),
            classes.len()
        );
    }
}
