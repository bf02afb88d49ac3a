//! Shared helpers for the bridge integration tests

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;
use tether_bind::ToRuntime;
use tether_engine::{EngineResult, Runtime, RuntimeOptions, Value};

/// Runtime with the bridge installed and automatic collection disabled
pub fn setup() -> Runtime {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rt = Runtime::with_options(RuntimeOptions::manual_gc());
    tether_bind::init(&mut rt);
    rt
}

/// Install `value` as a global
pub fn expose<V: ToRuntime>(rt: &mut Runtime, name: &str, value: V) {
    let global = rt.global();
    tether_bind::set(rt, global, name, value).unwrap();
}

/// A global, rooted in the current scope
pub fn global(rt: &mut Runtime, name: &str) -> Value {
    let global = rt.global();
    rt.get(global, name).unwrap()
}

/// `name(...args)` on a global function
pub fn call(rt: &mut Runtime, name: &str, args: &[Value]) -> EngineResult<Value> {
    let func = global(rt, name);
    rt.call(func, Value::undefined(), args)
}

/// `target.name(...args)`
pub fn invoke(rt: &mut Runtime, target: Value, name: &str, args: &[Value]) -> EngineResult<Value> {
    let method = rt.get(target, name)?;
    rt.call(method, target, args)
}

/// `new name(...args)` on a global constructor
pub fn construct(rt: &mut Runtime, name: &str, args: &[Value]) -> EngineResult<Value> {
    let ctor = global(rt, name);
    rt.construct(ctor, args)
}

/// Message of a thrown exception
pub fn thrown(result: EngineResult<Value>) -> String {
    match result {
        Ok(value) => panic!("expected an exception, got {:?}", value),
        Err(e) => e.message,
    }
}

/// Flag that flips once `value` has been collected
pub fn flag_on_collect(rt: &mut Runtime, value: Value) -> Rc<Cell<bool>> {
    let flag = Rc::new(Cell::new(false));
    let observer = Rc::clone(&flag);
    rt.add_finalizer(value, move |_| observer.set(true)).unwrap();
    flag
}
