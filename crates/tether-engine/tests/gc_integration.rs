//! Collector integration tests
//!
//! Exercises the runtime the way the bridge uses it: handle scopes, counted
//! references, wrap payloads, finalizers and the turn queue.
//!
//! # Running Tests
//! ```bash
//! cargo test -p tether-engine --test gc_integration
//! ```

use std::cell::Cell;
use std::rc::Rc;
use tether_engine::{
    CallInfo, EngineResult, Exception, ExceptionKind, PropertyAttributes, PropertySlot, Runtime,
    RuntimeOptions, Value,
};

/// Runtime with automatic collection disabled, so tests decide when passes run
fn manual_runtime() -> Runtime {
    let _ = env_logger::builder().is_test(true).try_init();
    Runtime::with_options(RuntimeOptions::manual_gc())
}

fn flag_on_collect(rt: &mut Runtime, value: Value) -> Rc<Cell<bool>> {
    let flag = Rc::new(Cell::new(false));
    let observer = Rc::clone(&flag);
    rt.add_finalizer(value, move |_| observer.set(true)).unwrap();
    flag
}

// ===== References =====

#[test]
fn test_weak_reference_cleared_after_collection() {
    let mut rt = manual_runtime();
    let weak = rt.scope(|rt| {
        let obj = rt.create_object();
        rt.create_reference(obj, 0)
    });

    rt.collect_garbage();
    assert_eq!(rt.reference_value(&weak), None);
}

#[test]
fn test_strong_reference_keeps_target_alive() {
    let mut rt = manual_runtime();
    let strong = rt.scope(|rt| {
        let s = rt.create_string("pinned");
        rt.create_reference(s, 1)
    });

    rt.collect_garbage();
    rt.scope(|rt| {
        let value = rt.reference_value(&strong).unwrap();
        assert_eq!(rt.string(value), Some("pinned"));
    });

    // Weakening lets the next pass take it
    strong.decrement();
    rt.scope(|rt| rt.collect_garbage());
    assert_eq!(strong.peek(), None);
}

#[test]
fn test_reference_drop_releases_slot() {
    let mut rt = manual_runtime();
    let before = rt.reference_count();
    let r = rt.create_reference(Value::i32(7), 1);
    assert_eq!(rt.reference_count(), before + 1);
    drop(r);
    assert_eq!(rt.reference_count(), before);
}

#[test]
fn test_collected_function_releases_captured_reference() {
    let mut rt = manual_runtime();
    let before = rt.reference_count();
    let target = rt.scope(|rt| {
        let target = rt.create_object();
        let strong = rt.create_reference(target, 1);
        rt.create_function(
            "holder",
            move |_rt: &mut Runtime, _info: &CallInfo| -> EngineResult<Value> {
                Ok(strong.peek().unwrap_or(Value::undefined()))
            },
        );
        rt.create_reference(target, 0)
    });
    assert_eq!(rt.reference_count(), before + 2);

    // The function goes first, and its closure hands the strong slot back
    rt.collect_garbage();
    assert_eq!(rt.reference_count(), before + 1);
    assert!(target.peek().is_some());

    rt.collect_garbage();
    assert_eq!(target.peek(), None);
}

// ===== Finalizers =====

#[test]
fn test_finalizers_deferred_to_next_turn() {
    let mut rt = manual_runtime();
    let collected = rt.scope(|rt| {
        let obj = rt.create_object();
        flag_on_collect(rt, obj)
    });

    rt.collect_garbage();
    assert!(!collected.get(), "finalizer must not run inside the pass");
    assert_eq!(rt.pending_finalizer_count(), 1);

    rt.yield_turn();
    assert!(collected.get());
    assert_eq!(rt.gc_stats().finalizers_run, 1);
}

#[test]
fn test_immediate_finalizers() {
    let mut rt = Runtime::with_options(RuntimeOptions {
        gc_threshold: 0,
        defer_finalizers: false,
    });
    let collected = rt.scope(|rt| {
        let obj = rt.create_object();
        flag_on_collect(rt, obj)
    });
    rt.collect_garbage();
    assert!(collected.get());
}

#[test]
fn test_weak_reference_already_empty_when_finalizer_runs() {
    let mut rt = manual_runtime();
    let seen = Rc::new(Cell::new(None));
    rt.scope(|rt| {
        let obj = rt.create_object();
        let weak = Rc::new(rt.create_reference(obj, 0));
        let seen = Rc::clone(&seen);
        rt.add_finalizer(obj, move |_| seen.set(Some(weak.peek().is_none())))
            .unwrap();
    });

    rt.collect_garbage();
    rt.yield_turn();
    assert_eq!(seen.get(), Some(true));
}

#[test]
fn test_wrap_payload_returned_to_finalizer() {
    let mut rt = manual_runtime();
    let got = Rc::new(Cell::new(0u32));
    rt.scope(|rt| {
        let obj = rt.create_object();
        let got = Rc::clone(&got);
        rt.wrap(
            obj,
            Box::new(42u32),
            Some(Box::new(move |_: &mut Runtime, data: Box<dyn std::any::Any>| {
                got.set(*data.downcast::<u32>().unwrap());
            })),
        )
        .unwrap();
        assert_eq!(rt.unwrap(obj).and_then(|d| d.downcast_ref::<u32>()), Some(&42));
    });

    rt.collect_garbage();
    rt.yield_turn();
    assert_eq!(got.get(), 42);
}

#[test]
fn test_double_wrap_rejected() {
    let mut rt = manual_runtime();
    let obj = rt.create_object();
    rt.wrap(obj, Box::new(()), None).unwrap();
    let err = rt.wrap(obj, Box::new(()), None).unwrap_err();
    assert_eq!(err.message, "Object is already wrapped");
}

#[test]
fn test_teardown_runs_remaining_finalizers() {
    let mut rt = manual_runtime();
    let obj = rt.create_object();
    let collected = flag_on_collect(&mut rt, obj);

    rt.teardown();
    assert!(collected.get());
    assert!(rt.is_torn_down());
}

// ===== Tasks =====

#[test]
fn test_tasks_run_on_yield_in_order() {
    let mut rt = manual_runtime();
    let log = Rc::new(std::cell::RefCell::new(Vec::new()));
    for i in 0..3 {
        let log = Rc::clone(&log);
        rt.enqueue_task(move |_| log.borrow_mut().push(i));
    }
    assert_eq!(rt.yield_turn(), 3);
    assert_eq!(*log.borrow(), vec![0, 1, 2]);
}

// ===== Properties and calls =====

#[test]
fn test_accessor_and_configurability() {
    let mut rt = manual_runtime();
    let obj = rt.create_object();
    let getter = rt.create_function("get", |_, _| Ok(Value::i32(19890604)));
    rt.define_property(
        obj,
        "number",
        PropertySlot::Accessor {
            getter: Some(getter),
            setter: None,
            enumerable: false,
            configurable: false,
        },
    )
    .unwrap();

    assert_eq!(rt.get(obj, "number").unwrap(), Value::i32(19890604));
    assert!(!rt.delete(obj, "number").unwrap());
    assert_eq!(rt.get(obj, "number").unwrap(), Value::i32(19890604));

    // Assignment without a setter is ignored
    rt.set(obj, "number", Value::i32(1)).unwrap();
    assert_eq!(rt.get(obj, "number").unwrap(), Value::i32(19890604));
    assert!(!rt.property_is_enumerable(obj, "number"));
}

#[test]
fn test_read_only_data_property_ignores_writes() {
    let mut rt = manual_runtime();
    let obj = rt.create_object();
    rt.define_property(
        obj,
        "fixed",
        PropertySlot::data(Value::i32(1), PropertyAttributes::new(false, true, true)),
    )
    .unwrap();
    rt.set(obj, "fixed", Value::i32(2)).unwrap();
    assert_eq!(rt.get(obj, "fixed").unwrap(), Value::i32(1));
    assert!(rt.delete(obj, "fixed").unwrap());
    assert_eq!(rt.get(obj, "fixed").unwrap(), Value::undefined());
}

#[test]
fn test_construct_and_instance_of() {
    let mut rt = manual_runtime();
    let parent = rt.create_constructor("Parent", |_, _| Ok(Value::undefined()));
    let child = rt.create_constructor("Child", |rt, info| {
        assert!(info.is_construct_call());
        rt.set(info.this, "tag", Value::i32(1))?;
        Ok(Value::undefined())
    });
    let parent_proto = rt.get(parent, "prototype").unwrap();
    let child_proto = rt.get(child, "prototype").unwrap();
    rt.set_prototype_of(child_proto, parent_proto).unwrap();

    let instance = rt.construct(child, &[]).unwrap();
    assert_eq!(rt.get(instance, "tag").unwrap(), Value::i32(1));
    assert!(rt.instance_of(instance, child).unwrap());
    assert!(rt.instance_of(instance, parent).unwrap());

    let plain = rt.construct(parent, &[]).unwrap();
    assert!(!rt.instance_of(plain, child).unwrap());

    let ctor = rt.get(instance, "constructor").unwrap();
    assert_eq!(rt.function_name(ctor), Some("Child"));
}

#[test]
fn test_plain_function_is_not_constructor() {
    let mut rt = manual_runtime();
    let f = rt.create_function("plain", |_, _| Ok(Value::undefined()));
    let err = rt.construct(f, &[]).unwrap_err();
    assert_eq!(err.kind, ExceptionKind::TypeError);
    assert_eq!(err.message, "plain is not a constructor");
}

#[test]
fn test_call_propagates_exceptions() {
    let mut rt = manual_runtime();
    let f = rt.create_function("thrower", |_, _| Err(Exception::error("boom")));
    let err = rt.call(f, Value::undefined(), &[]).unwrap_err();
    assert_eq!(err, Exception::error("boom"));
}

#[test]
fn test_prototype_cycle_rejected() {
    let mut rt = manual_runtime();
    let a = rt.create_object();
    let b = rt.create_object_with_prototype(a).unwrap();
    assert!(rt.set_prototype_of(a, b).is_err());
}

#[test]
fn test_call_result_survives_scope_of_callee() {
    let mut rt = manual_runtime();
    let f = rt.create_function("make", |rt, _| Ok(rt.create_string("made")));
    let value = rt.call(f, Value::undefined(), &[]).unwrap();
    rt.collect_garbage();
    assert_eq!(rt.string(value), Some("made"));
}

#[test]
fn test_stale_handle_is_detected() {
    let mut rt = manual_runtime();
    let stale = rt.scope(|rt| rt.create_object());
    rt.collect_garbage();

    assert!(!rt.is_alive(stale));
    assert!(rt.unwrap(stale).is_none());
    let err = rt.get(stale, "x").unwrap_err();
    assert_eq!(err.message, "Object has been collected");
}

#[test]
fn test_strict_equals() {
    let mut rt = manual_runtime();
    let a = rt.create_string("same");
    let b = rt.create_string("same");
    let o1 = rt.create_object();
    let o2 = rt.create_object();
    assert!(rt.strict_equals(a, b));
    assert!(rt.strict_equals(Value::i32(1), Value::number(1.0)));
    assert!(!rt.strict_equals(Value::number(f64::NAN), Value::number(f64::NAN)));
    assert!(rt.strict_equals(o1, o1));
    assert!(!rt.strict_equals(o1, o2));
}

#[test]
fn test_internal_slots_are_traced_and_hidden() {
    let mut rt = manual_runtime();
    let owner = rt.create_object();
    rt.scope(|rt| {
        let hidden = rt.create_string("hidden");
        rt.set_internal_slot(owner, "slot", hidden).unwrap();
    });
    rt.collect_garbage();

    let hidden = rt.internal_slot(owner, "slot").unwrap();
    assert_eq!(rt.string(hidden), Some("hidden"));
    assert!(rt.own_keys(owner).unwrap().is_empty());
}
