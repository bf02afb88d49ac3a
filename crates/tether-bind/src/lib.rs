//! Tether bind - expose native Rust objects to the Tether runtime
//!
//! The bridge converts values across the boundary, gives every native object
//! exactly one live wrapper, marshals callables in both directions and builds
//! classes with prototype chains from [`NativeClass`] declarations.
//!
//! # Example
//!
//! ```ignore
//! use tether_bind::{init, set, Class, Function};
//! use tether_engine::Runtime;
//!
//! let mut rt = Runtime::new();
//! init(&mut rt);
//!
//! let global = rt.global();
//! set(&mut rt, global, "addOne", Function::new(|_, (n,): (i32,)| Ok(n + 1)))?;
//! set(&mut rt, global, "Counter", Class::<Counter>::new())?;
//! ```
//!
//! State lives in the runtime's instance data: call [`init`] once per
//! runtime and [`shutdown`] to drop every wrapper and finalize the objects
//! they own.

#![warn(missing_docs)]

pub mod arguments;
pub mod attached_table;
pub mod callback;
pub mod class;
pub mod convert;
pub mod error;
pub mod instance_data;
pub mod object;
pub mod options;
pub mod persistent;
pub mod poll;
pub mod property;
pub mod prototype;
pub mod std_types;

pub use arguments::{Arguments, CallFlags, FromArgs, IntoArgs};
pub use attached_table::AttachedTable;
pub use callback::{Callback, Function};
pub use class::{Class, ClassBuilder, ClassState, Constructor, Hold, NativeClass, NoBase};
pub use convert::{from_runtime, runtime_type_name, to_runtime, FromRuntime, ToRuntime};
pub use error::{BridgeError, BridgeResult, ErrorCategory};
pub use instance_data::InstanceData;
pub use object::{Obj, WeakObj};
pub use options::BridgeOptions;
pub use persistent::{Persistent, PersistentMap, WeakSlot};
pub use poll::{gc_until, GcPoller};
pub use property::{define_properties, CacheMode, Getter, Property, Setter};
pub use prototype::{class_state, unwrap, wrap};
pub use std_types::{Monostate, Null, PropertyKey, Variant2, Variant3, Variant4, WideString};

use std::rc::Rc;
use tether_engine::{Runtime, Value};

/// Set up the bridge for `rt` with default options
pub fn init(rt: &mut Runtime) {
    init_with_options(rt, BridgeOptions::default());
}

/// Set up the bridge for `rt`. Does nothing if it is already set up.
pub fn init_with_options(rt: &mut Runtime, options: BridgeOptions) {
    if InstanceData::get(rt).is_ok() {
        return;
    }
    log::debug!("bridge initialized: {:?}", options);
    rt.set_instance_data(Rc::new(InstanceData::new(options)));
}

/// Tear down the bridge: drop the identity map and class cache, then finalize
/// every remaining wrapper so that objects they own are released.
pub fn shutdown(rt: &mut Runtime) {
    if let Ok(data) = InstanceData::get(rt) {
        rt.take_instance_data();
        data.clear();
    }
    rt.run_pending_finalizers();
    rt.teardown();
    log::debug!("bridge shut down");
}

/// Convert `value` and assign it to `target[key]`
pub fn set<V: ToRuntime>(rt: &mut Runtime, target: Value, key: &str, value: V) -> BridgeResult<()> {
    rt.scope(|rt| {
        let value = value.to_runtime(rt)?;
        rt.set(target, key, value)?;
        Ok(())
    })
}

/// Read `target[key]` as a `T`
pub fn get<T: FromRuntime>(rt: &mut Runtime, target: Value, key: &str) -> BridgeResult<T> {
    let value = rt.get(target, key)?;
    from_runtime(rt, value)
}
