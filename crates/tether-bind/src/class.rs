//! Native class declarations
//!
//! A native type becomes visible to the runtime by implementing
//! [`NativeClass`]. The bridge creates the constructor function and the
//! prototype lazily, the first time the class is needed in a runtime, and
//! caches both for the lifetime of the bridge.
//!
//! # Example
//!
//! ```ignore
//! struct Counter { n: i32 }
//!
//! impl NativeClass for Counter {
//!     const NAME: &'static str = "Counter";
//!     type Base = NoBase;
//!
//!     fn constructor() -> Option<Constructor<Self>> {
//!         Some(Constructor::new(|_, (n,): (i32,)| Ok(Counter { n })))
//!     }
//!
//!     fn define(class: &mut ClassBuilder<'_, Self>) -> BridgeResult<()> {
//!         class.method("increment", |_, this: &Obj<Counter>, ()| {
//!             this.borrow_mut().n += 1;
//!             Ok(this.borrow().n)
//!         })?;
//!         Ok(())
//!     }
//! }
//! ```

use std::marker::PhantomData;
use std::rc::Rc;
use tether_engine::{PropertyAttributes, PropertySlot, Runtime, Value};

use crate::arguments::{Arguments, FromArgs};
use crate::callback::Function;
use crate::convert::ToRuntime;
use crate::error::BridgeResult;
use crate::object::Obj;
use crate::property::{define_properties, Property};

/// How a wrapper holds its native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hold {
    /// The wrapper owns a strong count; the object lives at least as long
    #[default]
    Strong,
    /// The wrapper only observes the object; native code decides when it dies.
    ///
    /// A constructor for such a class has to use [`Constructor::shared`] and
    /// keep a handle; a freshly built object nobody else owns is rejected.
    Weak,
}

/// A native type exposed to the runtime as a class.
pub trait NativeClass: Sized + 'static {
    /// Class name, used for the constructor and in error messages
    const NAME: &'static str;

    /// Parent class, or [`NoBase`]
    type Base: NativeClass;

    /// How wrappers hold instances
    const HOLD: Hold = Hold::Strong;

    /// Whether calling the constructor without `new` creates an instance
    /// instead of failing
    const ALLOW_FUNCTION_CALL: bool = false;

    /// The embedded parent object
    fn as_base(&self) -> Option<&Self::Base> {
        None
    }

    /// The embedded parent object, mutably
    fn as_base_mut(&mut self) -> Option<&mut Self::Base> {
        None
    }

    /// How `new` creates instances; `None` makes construction fail
    fn constructor() -> Option<Constructor<Self>> {
        None
    }

    /// Install prototype members
    fn define(class: &mut ClassBuilder<'_, Self>) -> BridgeResult<()> {
        let _ = class;
        Ok(())
    }

    /// Runs once when an object first gets a wrapper
    fn on_wrap(obj: &Obj<Self>) {
        let _ = obj;
    }

    /// Runs when the wrapper is finalized, if the object still exists
    fn on_finalize(obj: &Obj<Self>) {
        let _ = obj;
    }
}

/// Root of every class hierarchy.
#[derive(Debug)]
pub enum NoBase {}

impl NativeClass for NoBase {
    const NAME: &'static str = "Object";
    type Base = NoBase;
}

type ConstructFn<T> = Rc<dyn Fn(&mut Arguments<'_>) -> BridgeResult<Obj<T>>>;

fn construct_fn<T, F>(f: F) -> ConstructFn<T>
where
    T: NativeClass,
    F: Fn(&mut Arguments<'_>) -> BridgeResult<Obj<T>> + 'static,
{
    Rc::new(f)
}

/// Native constructor of a class.
pub struct Constructor<T: NativeClass> {
    f: ConstructFn<T>,
}

impl<T: NativeClass> Constructor<T> {
    /// Build a fresh object from the converted arguments.
    ///
    /// The wrapper ends up as the only owner, so this does not work for
    /// classes with [`Hold::Weak`].
    pub fn new<A, F>(f: F) -> Self
    where
        A: FromArgs,
        F: Fn(&mut Runtime, A) -> BridgeResult<T> + 'static,
    {
        Self {
            f: construct_fn(move |args| {
                let parsed = A::from_args(args)?;
                f(args.runtime(), parsed).map(Obj::new)
            }),
        }
    }

    /// Return an existing shared object; native code keeps its own handles
    pub fn shared<A, F>(f: F) -> Self
    where
        A: FromArgs,
        F: Fn(&mut Runtime, A) -> BridgeResult<Obj<T>> + 'static,
    {
        Self {
            f: construct_fn(move |args| {
                let parsed = A::from_args(args)?;
                f(args.runtime(), parsed)
            }),
        }
    }

    pub(crate) fn invoke(&self, args: &mut Arguments<'_>) -> BridgeResult<Obj<T>> {
        (self.f)(args)
    }
}

/// Registration state of a class in one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassState {
    /// Never used in this runtime
    Unregistered,
    /// Defined, but has no constructor
    Registered,
    /// Defined with a constructor
    Constructible,
}

/// Converts to the constructor function of `T`.
pub struct Class<T: NativeClass>(PhantomData<T>);

impl<T: NativeClass> Class<T> {
    /// Marker for class `T`
    pub fn new() -> Self {
        Class(PhantomData)
    }
}

impl<T: NativeClass> Default for Class<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NativeClass> ToRuntime for Class<T> {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        crate::prototype::constructor_of::<T>(rt)
    }
}

/// Installs members on a class while it is being defined.
pub struct ClassBuilder<'a, T: NativeClass> {
    rt: &'a mut Runtime,
    constructor: Value,
    prototype: Value,
    _marker: PhantomData<T>,
}

impl<'a, T: NativeClass> ClassBuilder<'a, T> {
    pub(crate) fn new(rt: &'a mut Runtime, constructor: Value, prototype: Value) -> Self {
        Self {
            rt,
            constructor,
            prototype,
            _marker: PhantomData,
        }
    }

    /// The runtime the class is defined in
    pub fn runtime(&mut self) -> &mut Runtime {
        self.rt
    }

    /// The constructor function
    pub fn constructor(&self) -> Value {
        self.constructor
    }

    /// The prototype object
    pub fn prototype(&self) -> Value {
        self.prototype
    }

    /// Add a writable, configurable, non-enumerable prototype member
    pub fn set<V: ToRuntime>(&mut self, name: &str, value: V) -> BridgeResult<&mut Self> {
        let prototype = self.prototype;
        self.rt.scope(|rt| -> BridgeResult<()> {
            let value = value.to_runtime(rt)?;
            rt.define_property(
                prototype,
                name,
                PropertySlot::data(value, PropertyAttributes::new(true, false, true)),
            )?;
            Ok(())
        })?;
        Ok(self)
    }

    /// Add a member function; the receiver must be a `T`
    pub fn method<A, R, F>(&mut self, name: &str, f: F) -> BridgeResult<&mut Self>
    where
        A: FromArgs,
        R: ToRuntime,
        F: Fn(&mut Runtime, &Obj<T>, A) -> BridgeResult<R> + 'static,
    {
        self.set(name, Function::method(f).named(name))
    }

    /// Add a member function that stores function arguments weakly and runs
    /// `after` once it returned successfully
    pub fn wrap_method<A, R, F, G>(&mut self, name: &str, f: F, after: G) -> BridgeResult<&mut Self>
    where
        A: FromArgs,
        R: ToRuntime,
        F: Fn(&mut Runtime, &Obj<T>, A) -> BridgeResult<R> + 'static,
        G: Fn(&mut Runtime, &tether_engine::CallInfo, Value) -> BridgeResult<()> + 'static,
    {
        self.set(name, Function::wrap_method(f, after).named(name))
    }

    /// Define accessor or data properties on the prototype
    pub fn properties<I>(&mut self, properties: I) -> BridgeResult<&mut Self>
    where
        I: IntoIterator<Item = Property>,
    {
        let prototype = self.prototype;
        define_properties(self.rt, prototype, properties)?;
        Ok(self)
    }

    /// Add a property to the constructor itself
    pub fn static_value<V: ToRuntime>(&mut self, name: &str, value: V) -> BridgeResult<&mut Self> {
        let constructor = self.constructor;
        self.rt.scope(|rt| -> BridgeResult<()> {
            let value = value.to_runtime(rt)?;
            rt.define_property(
                constructor,
                name,
                PropertySlot::data(value, PropertyAttributes::new(true, false, true)),
            )?;
            Ok(())
        })?;
        Ok(self)
    }
}
