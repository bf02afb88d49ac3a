//! Object lifetime tests
//!
//! When native objects are released relative to their wrappers, weakly held
//! classes, handles, bridge setup and shutdown.
//!
//! # Running Tests
//! ```bash
//! cargo test -p tether-bind --test lifetime_tests
//! ```

mod common;

use common::{construct, expose, flag_on_collect, global, invoke, setup, thrown};
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;
use tether_bind::{
    gc_until, unwrap, wrap, BridgeError, BridgeOptions, BridgeResult, Class, ClassBuilder,
    Constructor, GcPoller, Hold, InstanceData, NativeClass, NoBase, Obj, Persistent,
    PersistentMap, ToRuntime, WeakSlot,
};
use tether_engine::{Runtime, RuntimeOptions};

thread_local! {
    static FINALIZED: Cell<u32> = const { Cell::new(0) };
    static WINDOWS: RefCell<Vec<Obj<Window>>> = const { RefCell::new(Vec::new()) };
}

fn finalized() -> u32 {
    FINALIZED.with(Cell::get)
}

struct Tracked {
    dropped: Rc<Cell<bool>>,
}

impl Tracked {
    fn new() -> (Obj<Tracked>, Rc<Cell<bool>>) {
        let dropped = Rc::new(Cell::new(false));
        let obj = Obj::new(Tracked {
            dropped: Rc::clone(&dropped),
        });
        (obj, dropped)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}

impl NativeClass for Tracked {
    const NAME: &'static str = "Tracked";
    type Base = NoBase;

    fn on_finalize(obj: &Obj<Self>) {
        assert!(!obj.borrow().dropped.get());
        FINALIZED.with(|f| f.set(f.get() + 1));
    }
}

/// Natively owned: the wrapper only observes the window
struct Window {
    title: String,
}

impl NativeClass for Window {
    const NAME: &'static str = "Window";
    type Base = NoBase;
    const HOLD: Hold = Hold::Weak;

    fn constructor() -> Option<Constructor<Self>> {
        Some(Constructor::shared(|_, (title,): (String,)| {
            let window = Obj::new(Window { title });
            WINDOWS.with(|ws| ws.borrow_mut().push(window.clone()));
            Ok(window)
        }))
    }

    fn define(class: &mut ClassBuilder<'_, Self>) -> BridgeResult<()> {
        class
            .method("getTitle", |_, this: &Obj<Window>, ()| {
                Ok(this.borrow().title.clone())
            })?
            .method("destroy", |_, this: &Obj<Window>, ()| {
                WINDOWS.with(|ws| ws.borrow_mut().retain(|w| !w.ptr_eq(this)));
                Ok(())
            })?;
        Ok(())
    }
}

/// Weakly held, but built by value: nothing native would keep it
struct Overlay;

impl NativeClass for Overlay {
    const NAME: &'static str = "Overlay";
    type Base = NoBase;
    const HOLD: Hold = Hold::Weak;

    fn constructor() -> Option<Constructor<Self>> {
        Some(Constructor::new(|_, ()| Ok(Overlay)))
    }
}

// ===== Strongly held objects =====

#[test]
fn test_unique_object_released_after_wrapper_collected() {
    let mut rt = setup();
    let before = finalized();
    let dropped = rt.scope(|rt| {
        let (obj, dropped) = Tracked::new();
        wrap(rt, &obj).unwrap();
        dropped
    });
    assert!(!dropped.get());

    // Finalizers wait for the end of the turn
    rt.collect_garbage();
    assert!(!dropped.get());
    rt.yield_turn();
    assert!(dropped.get());
    assert_eq!(finalized(), before + 1);
    assert_eq!(InstanceData::get(&rt).unwrap().wrapper_count(), 0);
}

#[test]
fn test_shared_object_survives_wrapper() {
    let mut rt = setup();
    let before = finalized();
    let (obj, dropped) = Tracked::new();

    let wrapper = rt.scope(|rt| {
        let w = wrap(rt, &obj).unwrap();
        Persistent::weak(rt, w)
    });
    gc_until(&mut rt, |_| wrapper.is_empty()).unwrap();

    assert!(!dropped.get());
    assert_eq!(finalized(), before + 1);
    assert_eq!(obj.strong_count(), 1);
    drop(obj);
    assert!(dropped.get());
}

// ===== Weakly held objects =====

#[test]
fn test_destroyed_native_object_fails_receiver_check() {
    let mut rt = setup();
    expose(&mut rt, "Window", Class::<Window>::new());
    let before = InstanceData::get(&rt).unwrap().wrapper_count();

    let (mut handle, native) = rt.scope(|rt| {
        let title = rt.create_string("main");
        let w = construct(rt, "Window", &[title]).unwrap();
        let native = unwrap::<Window>(rt, w).unwrap().downgrade();
        (Persistent::new(rt, w), native)
    });

    rt.scope(|rt| {
        let w = handle.value(rt).unwrap();
        let title = invoke(rt, w, "getTitle", &[]).unwrap();
        assert_eq!(rt.string(title), Some("main"));
        invoke(rt, w, "destroy", &[]).unwrap();
    });
    assert!(native.upgrade().is_none());

    rt.scope(|rt| {
        let w = handle.value(rt).unwrap();
        let err = invoke(rt, w, "getTitle", &[]).unwrap_err();
        assert_eq!(err.message, "Error converting \"this\" to Window.");
        assert!(unwrap::<Window>(rt, w).is_none());
    });

    // The orphaned wrapper is still an ordinary collectable object
    assert_eq!(InstanceData::get(&rt).unwrap().wrapper_count(), before + 1);
    handle.make_weak();
    gc_until(&mut rt, |_| handle.is_empty()).unwrap();
    handle.reset();
    assert_eq!(InstanceData::get(&rt).unwrap().wrapper_count(), before);
}

#[test]
fn test_method_on_collected_wrapper_fails_receiver_check() {
    let mut rt = setup();
    expose(&mut rt, "Window", Class::<Window>::new());
    let get_title = rt.scope(|rt| {
        let ctor = global(rt, "Window");
        let proto = rt.get(ctor, "prototype").unwrap();
        let method = rt.get(proto, "getTitle").unwrap();
        Persistent::new(rt, method)
    });

    // Only a raw value survives the scope; the window itself stays open
    let (stale, collected, native) = rt.scope(|rt| {
        let title = rt.create_string("detached");
        let w = construct(rt, "Window", &[title]).unwrap();
        let collected = flag_on_collect(rt, w);
        (w, collected, unwrap::<Window>(rt, w).unwrap())
    });
    gc_until(&mut rt, |_| collected.get()).unwrap();
    rt.yield_turn();
    assert_eq!(native.borrow().title, "detached");

    rt.scope(|rt| {
        let method = get_title.value(rt).unwrap();
        assert_eq!(
            thrown(rt.call(method, stale, &[])),
            "Error converting \"this\" to Window."
        );
        assert!(unwrap::<Window>(rt, stale).is_none());
    });

    WINDOWS.with(|ws| ws.borrow_mut().retain(|w| !w.ptr_eq(&native)));
}

#[test]
fn test_weak_class_rejects_unowned_construction() {
    let mut rt = setup();
    expose(&mut rt, "Overlay", Class::<Overlay>::new());
    let before = InstanceData::get(&rt).unwrap().wrapper_count();

    rt.scope(|rt| {
        assert_eq!(
            thrown(construct(rt, "Overlay", &[])),
            "Overlay is held weakly, so its constructor must keep the object alive natively"
        );
    });
    assert_eq!(InstanceData::get(&rt).unwrap().wrapper_count(), before);
}

#[test]
fn test_weak_wrapper_does_not_extend_object() {
    let mut rt = setup();
    expose(&mut rt, "Window", Class::<Window>::new());

    let native = rt.scope(|rt| {
        let title = rt.create_string("popup");
        let w = construct(rt, "Window", &[title]).unwrap();
        unwrap::<Window>(rt, w).unwrap()
    });
    assert_eq!(native.strong_count(), 2);

    WINDOWS.with(|ws| ws.borrow_mut().retain(|w| !w.ptr_eq(&native)));
    let weak = native.downgrade();
    drop(native);
    assert!(weak.upgrade().is_none());
}

// ===== Handles =====

#[test]
fn test_weak_slot_runs_callback_on_collection() {
    let mut rt = setup();
    let notified = Rc::new(Cell::new(false));
    let mut slot = WeakSlot::new();

    rt.scope(|rt| {
        let obj = rt.create_object();
        let flag = Rc::clone(&notified);
        slot.observe(rt, obj, move |_| flag.set(true)).unwrap();
        assert!(slot.get(rt).is_some());
    });

    gc_until(&mut rt, |_| notified.get()).unwrap();
    assert!(slot.is_empty());
}

#[test]
fn test_persistent_map_drops_collected_entries() {
    let mut rt = setup();
    let mut map = PersistentMap::new();

    let kept_flag = rt.scope(|rt| {
        let kept = rt.create_object();
        map.insert(rt, 1u32, kept);
        for key in [2u32, 3] {
            let obj = rt.create_object();
            map.insert_weak(rt, key, obj);
        }
        flag_on_collect(rt, kept)
    });
    assert_eq!(map.len(), 3);

    gc_until(&mut rt, |rt| map.get(rt, &2).is_none()).unwrap();
    assert!(!map.contains_key(&2));
    assert_eq!(map.prune(), 1);
    assert_eq!(map.len(), 1);

    assert!(map.make_weak(&1));
    gc_until(&mut rt, |_| kept_flag.get()).unwrap();
    assert_eq!(map.prune(), 1);
    assert!(map.is_empty());
}

// ===== Setup and shutdown =====

#[test]
fn test_uninitialized_runtime_reports_error() {
    let mut rt = Runtime::with_options(RuntimeOptions::manual_gc());
    let err = Class::<Tracked>::new().to_runtime(&mut rt).unwrap_err();
    assert_eq!(err, BridgeError::NotInitialized);
    assert_eq!(err.to_string(), "Bridge is not initialized for this runtime");

    let (obj, _dropped) = Tracked::new();
    assert_eq!(wrap(&mut rt, &obj).unwrap_err(), BridgeError::NotInitialized);
}

#[test]
fn test_init_is_idempotent() {
    let mut rt = setup();
    let first = InstanceData::get(&rt).unwrap();
    tether_bind::init(&mut rt);
    let second = InstanceData::get(&rt).unwrap();
    assert!(Rc::ptr_eq(&first, &second));
}

#[test]
fn test_shutdown_releases_every_object() {
    let mut rt = setup();
    let mut handles = Vec::new();
    let mut flags = Vec::new();
    for _ in 0..3 {
        let (obj, dropped) = Tracked::new();
        let handle = rt.scope(|rt| {
            let w = wrap(rt, &obj).unwrap();
            Persistent::new(rt, w)
        });
        handles.push(handle);
        flags.push(dropped);
    }
    assert!(flags.iter().all(|f| !f.get()));

    tether_bind::shutdown(&mut rt);
    assert!(flags.iter().all(|f| f.get()));
    assert!(matches!(InstanceData::get(&rt), Err(BridgeError::NotInitialized)));
    assert!(rt.is_torn_down());
}

#[test]
fn test_poll_budget_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "gc_poll_attempts = 2").unwrap();
    let options = BridgeOptions::from_file(file.path()).unwrap();
    assert!(options.weak_setter_functions);

    let mut rt = Runtime::with_options(RuntimeOptions::manual_gc());
    tether_bind::init_with_options(&mut rt, options);
    assert_eq!(GcPoller::for_runtime(&rt).max_attempts(), 2);

    let err = gc_until(&mut rt, |_| false).unwrap_err();
    assert_eq!(err, BridgeError::PollTimeout { attempts: 2 });
}

#[test]
fn test_wrapper_outlives_native_scope() {
    let mut rt = setup();
    let handle = rt.scope(|rt| {
        let (obj, _dropped) = Tracked::new();
        let w = wrap(rt, &obj).unwrap();
        Persistent::new(rt, w)
    });

    // The wrapper holds the only reference
    rt.collect_garbage();
    rt.yield_turn();
    rt.scope(|rt| {
        let w = handle.value(rt).unwrap();
        let obj = unwrap::<Tracked>(rt, w).unwrap();
        assert_eq!(obj.strong_count(), 2);
        assert!(!obj.borrow().dropped.get());
    });
}
