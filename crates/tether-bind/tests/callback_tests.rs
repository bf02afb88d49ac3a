//! Callback marshaling tests
//!
//! Native closures called from the runtime, runtime functions held and
//! called by native code, and what happens when the latter are collected.
//!
//! # Running Tests
//! ```bash
//! cargo test -p tether-bind --test callback_tests
//! ```

mod common;

use common::{call, construct, expose, global, invoke, setup, thrown};
use std::cell::RefCell;
use std::rc::Rc;
use tether_bind::{
    gc_until, BridgeError, CallFlags, Callback, Class, ClassBuilder, Constructor, Function,
    GcPoller, NativeClass, NoBase, Obj, Persistent, ToRuntime,
};
use tether_engine::{CallInfo, EngineResult, Exception, ExceptionKind, Runtime, Value};

struct Calculator {
    base: i32,
}

impl NativeClass for Calculator {
    const NAME: &'static str = "Calculator";
    type Base = NoBase;

    fn constructor() -> Option<Constructor<Self>> {
        Some(Constructor::new(|_, (base,): (i32,)| Ok(Calculator { base })))
    }

    fn define(class: &mut ClassBuilder<'_, Self>) -> tether_bind::BridgeResult<()> {
        class.method("plus", |_, this: &Obj<Calculator>, (n,): (i32,)| {
            Ok(this.borrow().base + n)
        })?;
        Ok(())
    }
}

/// A runtime-side function doubling its argument
fn doubler(rt: &mut Runtime) -> Value {
    rt.create_function("double", |_rt: &mut Runtime, info: &CallInfo| -> EngineResult<Value> {
        let n = info.arg(0).as_i32().unwrap_or(0);
        Ok(Value::i32(n * 2))
    })
}

// ===== Native functions called from the runtime =====

#[test]
fn test_return_void_is_undefined() {
    let mut rt = setup();
    expose(&mut rt, "returnVoid", Function::new(|_, ()| Ok(())));

    rt.scope(|rt| {
        assert!(call(rt, "returnVoid", &[]).unwrap().is_undefined());
    });
}

#[test]
fn test_add_one() {
    let mut rt = setup();
    expose(&mut rt, "addOne", Function::new(|_, (n,): (i32,)| Ok(n + 1)));

    rt.scope(|rt| {
        assert_eq!(call(rt, "addOne", &[Value::i32(123)]).unwrap().as_i32(), Some(124));

        let s = rt.create_string("123");
        assert_eq!(
            thrown(call(rt, "addOne", &[s])),
            "Error processing argument at index 0, conversion failure from String to Integer."
        );
        assert_eq!(thrown(call(rt, "addOne", &[])), "Insufficient number of arguments.");
    });
}

#[test]
fn test_string_arguments_and_results() {
    let mut rt = setup();
    expose(
        &mut rt,
        "append64",
        Function::new(|_, (s,): (String,)| Ok(format!("{}64", s))),
    );

    rt.scope(|rt| {
        let s = rt.create_string("89");
        let ret = call(rt, "append64", &[s]).unwrap();
        assert_eq!(rt.string(ret), Some("8964"));
    });
}

#[test]
fn test_function_name() {
    let mut rt = setup();
    expose(&mut rt, "f", Function::new(|_, ()| Ok(())).named("returnVoid"));

    rt.scope(|rt| {
        let f = global(rt, "f");
        assert_eq!(rt.function_name(f), Some("returnVoid"));
    });
}

#[test]
fn test_native_error_becomes_exception() {
    let mut rt = setup();
    expose(
        &mut rt,
        "fail",
        Function::new(|_, ()| -> tether_bind::BridgeResult<()> {
            Err(BridgeError::Thrown(Exception::range_error("out of range")))
        }),
    );

    rt.scope(|rt| {
        let err = call(rt, "fail", &[]).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::RangeError);
        assert_eq!(err.message, "out of range");
    });
}

// ===== Methods =====

#[test]
fn test_method_receives_receiver() {
    let mut rt = setup();
    expose(&mut rt, "Calculator", Class::<Calculator>::new());

    rt.scope(|rt| {
        let calc = construct(rt, "Calculator", &[Value::i32(8900)]).unwrap();
        let ret = invoke(rt, calc, "plus", &[Value::i32(64)]).unwrap();
        assert_eq!(ret.as_i32(), Some(8964));
    });
}

#[test]
fn test_method_rejects_foreign_receiver() {
    let mut rt = setup();
    expose(&mut rt, "Calculator", Class::<Calculator>::new());

    rt.scope(|rt| {
        let calc = construct(rt, "Calculator", &[Value::i32(1)]).unwrap();
        let plus = rt.get(calc, "plus").unwrap();

        let plain = rt.create_object();
        assert_eq!(
            thrown(rt.call(plus, plain, &[Value::i32(1)])),
            "Error converting \"this\" to Calculator."
        );
        assert_eq!(
            thrown(rt.call(plus, Value::undefined(), &[Value::i32(1)])),
            "Error converting \"this\" to Calculator."
        );
    });
}

#[test]
fn test_receiver_checked_before_arguments() {
    let mut rt = setup();
    expose(&mut rt, "Calculator", Class::<Calculator>::new());

    rt.scope(|rt| {
        let calc = construct(rt, "Calculator", &[Value::i32(1)]).unwrap();
        let plus = rt.get(calc, "plus").unwrap();
        assert_eq!(
            thrown(rt.call(plus, Value::null(), &[])),
            "Error converting \"this\" to Calculator."
        );
    });
}

// ===== Runtime functions held by native code =====

#[test]
fn test_callback_call_converts_both_ways() {
    let mut rt = setup();
    let (double, as_string) = rt.scope(|rt| {
        let f = doubler(rt);
        let double = Callback::<(i32,), i32>::new(rt, f).unwrap();
        let as_string = Callback::<(i32,), String>::new(rt, f).unwrap();
        (double, as_string)
    });

    assert_eq!(double.call(&mut rt, (21,)).unwrap(), 42);

    let err = as_string.call(&mut rt, (1,)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Error converting return value from Number to String."
    );
}

#[test]
fn test_callback_requires_function() {
    let mut rt = setup();
    rt.scope(|rt| {
        let obj = rt.create_object();
        let err = Callback::<(), ()>::new(rt, obj).unwrap_err();
        assert_eq!(err.to_string(), "Conversion failure from Object to Function.");
    });
}

#[test]
fn test_exception_from_callback_propagates() {
    let mut rt = setup();
    let cb = rt.scope(|rt| {
        let f = rt.create_function("boom", |_rt: &mut Runtime, _info: &CallInfo| -> EngineResult<Value> {
            Err(Exception::error("boom"))
        });
        Callback::<(), ()>::new(rt, f).unwrap()
    });

    let err = cb.call(&mut rt, ()).unwrap_err();
    assert_eq!(err.to_string(), "boom");
}

type Slot = Rc<RefCell<Option<Callback<(i32,), i32>>>>;

fn expose_store(rt: &mut Runtime, name: &str, flags: CallFlags) -> Slot {
    let slot: Slot = Rc::new(RefCell::new(None));
    let stored = Rc::clone(&slot);
    expose(
        rt,
        name,
        Function::with_flags(flags, move |_, (cb,): (Callback<(i32,), i32>,)| {
            *stored.borrow_mut() = Some(cb);
            Ok(())
        }),
    );
    slot
}

#[test]
fn test_weak_function_argument_is_collected() {
    let mut rt = setup();
    let slot = expose_store(&mut rt, "storeWeak", CallFlags::WEAK_FUNCTIONS);

    rt.scope(|rt| {
        let f = doubler(rt);
        call(rt, "storeWeak", &[f]).unwrap();
    });
    {
        let cb = slot.borrow();
        let cb = cb.as_ref().unwrap();
        assert!(cb.is_weak());
        // Call inside a scope so the function is not rooted afterwards
        assert_eq!(rt.scope(|rt| cb.call(rt, (4,))).unwrap(), 8);
    }

    gc_until(&mut rt, |_| slot.borrow().as_ref().is_some_and(|cb| cb.is_collected())).unwrap();

    let cb = slot.borrow_mut().take().unwrap();
    let err = cb.call(&mut rt, (1,)).unwrap_err();
    assert_eq!(err, BridgeError::FunctionCollected);
    assert_eq!(err.to_string(), "The function has been garbage collected");
}

#[test]
fn test_strong_function_argument_survives() {
    let mut rt = setup();
    let slot = expose_store(&mut rt, "storeStrong", CallFlags::NONE);

    rt.scope(|rt| {
        let f = doubler(rt);
        call(rt, "storeStrong", &[f]).unwrap();
    });

    let result = GcPoller::new(3).poll(&mut rt, |_| {
        slot.borrow().as_ref().is_some_and(|cb| cb.is_collected())
    });
    assert!(matches!(result, Err(BridgeError::PollTimeout { attempts: 3 })));

    let cb = slot.borrow_mut().take().unwrap();
    assert!(!cb.is_weak());
    assert_eq!(cb.call(&mut rt, (32,)).unwrap(), 64);
}

#[test]
fn test_dropping_callback_releases_function() {
    let mut rt = setup();
    let slot = expose_store(&mut rt, "store", CallFlags::NONE);
    let before = rt.reference_count();

    rt.scope(|rt| {
        let f = doubler(rt);
        call(rt, "store", &[f]).unwrap();
    });
    assert_eq!(rt.reference_count(), before + 1);

    slot.borrow_mut().take();
    assert_eq!(rt.reference_count(), before);
}

#[test]
fn test_reset_releases_immediately() {
    let mut rt = setup();
    let mut cb = rt.scope(|rt| {
        let f = doubler(rt);
        Callback::<(i32,), i32>::new(rt, f).unwrap()
    });

    cb.reset();
    assert!(cb.is_collected());
    assert_eq!(cb.call(&mut rt, (1,)).unwrap_err(), BridgeError::FunctionCollected);
}

#[test]
fn test_collected_function_releases_captured_callback() {
    let mut rt = setup();
    let before = rt.reference_count();

    let target = rt.scope(|rt| {
        let target = doubler(rt);
        let cb = Callback::<(i32,), i32>::new(rt, target).unwrap();
        // Nothing keeps the forwarding function alive past this scope
        Function::new(move |rt, (n,): (i32,)| cb.call(rt, (n,)))
            .to_runtime(rt)
            .unwrap();
        Persistent::weak(rt, target)
    });
    assert_eq!(rt.reference_count(), before + 2);

    gc_until(&mut rt, |_| target.is_empty()).unwrap();
    assert_eq!(rt.reference_count(), before + 1);
}
