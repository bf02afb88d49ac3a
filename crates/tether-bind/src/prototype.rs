//! Class construction and the native-object-to-wrapper bijection
//!
//! Every native object crossing into the runtime gets exactly one live
//! wrapper: an instance of its concrete class carrying a hidden
//! payload. The identity map in `InstanceData` finds that wrapper again by
//! the object's address; the payload's finalizer removes the entry and
//! releases the object once the collector reclaims the wrapper.

use std::any::{Any, TypeId};
use std::rc::Rc;
use tether_engine::{CallInfo, Exception, Runtime, Value};

use crate::arguments::{Arguments, CallFlags};
use crate::class::{ClassBuilder, ClassState, Constructor, Hold, NativeClass};
use crate::error::{BridgeError, BridgeResult};
use crate::instance_data::{ClassDescriptor, InstanceData};
use crate::object::{has_base, ClassVTable, Obj, SharedCell, WeakCell};
use crate::persistent::Persistent;

enum Holder {
    Strong(SharedCell),
    Weak(WeakCell),
}

impl Holder {
    fn new(cell: &SharedCell, hold: Hold) -> Self {
        match hold {
            Hold::Strong => Holder::Strong(Rc::clone(cell)),
            Hold::Weak => Holder::Weak(Rc::downgrade(cell)),
        }
    }

    fn upgrade(&self) -> Option<SharedCell> {
        match self {
            Holder::Strong(cell) => Some(Rc::clone(cell)),
            Holder::Weak(cell) => cell.upgrade(),
        }
    }

    /// An allocation stays reserved while a weak pointer to it exists, so
    /// comparing addresses is enough to recognise the same object.
    fn points_to(&self, cell: &SharedCell) -> bool {
        let addr = match self {
            Holder::Strong(held) => cell_addr(held),
            Holder::Weak(held) => held.as_ptr() as *const () as usize,
        };
        addr == cell_addr(cell)
    }
}

/// Hidden payload of a wrapper object.
struct WrapperData {
    holder: Holder,
    vtable: ClassVTable,
    addr: usize,
    serial: u64,
}

fn cell_addr(cell: &SharedCell) -> usize {
    Rc::as_ptr(cell) as *const () as usize
}

// ============================================================================
// Classes
// ============================================================================

/// Constructor function of `T`, defining the class on first use.
pub(crate) fn constructor_of<T: NativeClass>(rt: &mut Runtime) -> BridgeResult<Value> {
    let data = InstanceData::get(rt)?;
    if let Some(ctor) = data.class_constructor(rt, TypeId::of::<T>()) {
        return Ok(ctor);
    }
    rt.escape_scope(|rt| define_class::<T>(rt, &data))
}

fn define_class<T: NativeClass>(rt: &mut Runtime, data: &InstanceData) -> BridgeResult<Value> {
    let native = T::constructor();
    let constructible = native.is_some();
    let ctor = rt.create_constructor(T::NAME, move |rt, info| {
        construct_dispatch::<T>(rt, info, native.as_ref()).map_err(Exception::from)
    });
    let prototype = rt.get(ctor, "prototype")?;

    // Registered before members are defined, so they can refer to the class
    data.register_class(
        TypeId::of::<T>(),
        ClassDescriptor {
            name: T::NAME,
            parent: has_base::<T>().then_some(<T::Base as NativeClass>::NAME),
            constructible,
            constructor: Persistent::new(rt, ctor),
        },
    );
    if let Err(e) = link_and_define::<T>(rt, ctor, prototype) {
        data.unregister_class(TypeId::of::<T>());
        return Err(e);
    }
    log::debug!("defined class {}", T::NAME);
    Ok(ctor)
}

fn link_and_define<T: NativeClass>(rt: &mut Runtime, ctor: Value, prototype: Value) -> BridgeResult<()> {
    if has_base::<T>() {
        let parent = constructor_of::<T::Base>(rt)?;
        let parent_prototype = rt.get(parent, "prototype")?;
        rt.set_prototype_of(prototype, parent_prototype)?;
        rt.set_prototype_of(ctor, parent)?;
    }
    T::define(&mut ClassBuilder::new(rt, ctor, prototype))
}

fn construct_dispatch<T: NativeClass>(
    rt: &mut Runtime,
    info: &CallInfo,
    native: Option<&Constructor<T>>,
) -> BridgeResult<Value> {
    let data = InstanceData::get(rt)?;
    if data.is_creating_instance() {
        // The bridge is allocating a wrapper for an existing object
        return Ok(Value::undefined());
    }
    let native = native.ok_or(BridgeError::NoConstructor)?;
    let construct_call = info.is_construct_call();
    if !construct_call && !T::ALLOW_FUNCTION_CALL {
        return Err(BridgeError::ConstructorWithoutNew);
    }

    let obj = {
        let mut args = Arguments::new(rt, info, CallFlags::NONE);
        native.invoke(&mut args)?
    };
    if obj.vtable().hold == Hold::Weak && obj.strong_count() == 1 {
        // A weak wrapper would be the last handle, leaving it empty on return
        return Err(BridgeError::error(format!(
            "{} is held weakly, so its constructor must keep the object alive natively",
            obj.vtable().name
        )));
    }
    if let Some(existing) = live_wrapper(rt, &data, obj.cell()) {
        return Ok(existing);
    }

    let target = if construct_call && obj.vtable().type_id == TypeId::of::<T>() {
        info.this
    } else {
        create_instance(rt, &data, obj.vtable())?
    };
    attach(rt, &data, target, obj.cell(), obj.vtable())?;
    Ok(target)
}

/// Registration state of `T` in this runtime
pub fn class_state<T: NativeClass>(rt: &Runtime) -> ClassState {
    InstanceData::get(rt)
        .map(|data| data.class_state(TypeId::of::<T>()))
        .unwrap_or(ClassState::Unregistered)
}

// ============================================================================
// Wrappers
// ============================================================================

fn live_wrapper(rt: &mut Runtime, data: &InstanceData, cell: &SharedCell) -> Option<Value> {
    let wrapper = data.lookup_wrapper(rt, cell_addr(cell))?;
    let payload = rt.unwrap(wrapper)?.downcast_ref::<WrapperData>()?;
    payload.holder.points_to(cell).then_some(wrapper)
}

/// New instance of the class in `vtable`, without running its native constructor
fn create_instance(rt: &mut Runtime, data: &InstanceData, vtable: ClassVTable) -> BridgeResult<Value> {
    let ctor = (vtable.constructor)(rt)?;
    let previous = data.set_creating_instance(true);
    let instance = rt.construct(ctor, &[]);
    data.set_creating_instance(previous);
    Ok(instance?)
}

fn attach(
    rt: &mut Runtime,
    data: &InstanceData,
    target: Value,
    cell: &SharedCell,
    vtable: ClassVTable,
) -> BridgeResult<()> {
    let addr = cell_addr(cell);
    let serial = data.insert_wrapper(rt, addr, target);
    let payload = WrapperData {
        holder: Holder::new(cell, vtable.hold),
        vtable,
        addr,
        serial,
    };
    if let Err(e) = rt.wrap(target, Box::new(payload), Some(Box::new(finalize_wrapper))) {
        data.remove_wrapper(addr, serial);
        return Err(e.into());
    }
    log::debug!("wrapped {} at {:#x} (serial {})", vtable.name, addr, serial);
    (vtable.on_wrap)(cell);
    Ok(())
}

fn finalize_wrapper(rt: &mut Runtime, payload: Box<dyn Any>) {
    let Ok(wrapper) = payload.downcast::<WrapperData>() else {
        return;
    };
    if let Ok(data) = InstanceData::get(rt) {
        data.remove_wrapper(wrapper.addr, wrapper.serial);
    }
    if let Some(cell) = wrapper.holder.upgrade() {
        (wrapper.vtable.on_finalize)(&cell);
    }
    log::debug!(
        "finalized {} wrapper at {:#x} (serial {})",
        wrapper.vtable.name,
        wrapper.addr,
        wrapper.serial
    );
}

/// The wrapper of `obj`, creating it on first use.
///
/// A live wrapper is returned unchanged; otherwise a new instance of the
/// object's concrete class is created and the class's wrap hook runs.
pub fn wrap<T: NativeClass>(rt: &mut Runtime, obj: &Obj<T>) -> BridgeResult<Value> {
    let data = InstanceData::get(rt)?;
    if let Some(existing) = live_wrapper(rt, &data, obj.cell()) {
        log::trace!("reusing {} wrapper at {:#x}", obj.class_name(), obj.addr());
        return Ok(existing);
    }
    let target = create_instance(rt, &data, obj.vtable())?;
    attach(rt, &data, target, obj.cell(), obj.vtable())?;
    Ok(target)
}

/// The native object behind `value`, if it is a live wrapper of a `T` or of
/// a class deriving from `T` whose object still exists.
pub fn unwrap<T: NativeClass>(rt: &Runtime, value: Value) -> Option<Obj<T>> {
    let payload = rt.unwrap(value)?.downcast_ref::<WrapperData>()?;
    if !payload.vtable.is_a(TypeId::of::<T>()) {
        return None;
    }
    let cell = payload.holder.upgrade()?;
    Some(Obj::from_parts(cell, payload.vtable))
}
