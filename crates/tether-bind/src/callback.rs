//! Callables crossing the boundary
//!
//! [`Function`] exposes a native closure to the runtime, converting its
//! arguments and return value. [`Callback`] goes the other way: it holds a
//! runtime function, strongly or weakly, so native code can call it later.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use tether_engine::{CallInfo, Exception, Runtime, Value, ValueType};

use crate::arguments::{Arguments, CallFlags, FromArgs, IntoArgs};
use crate::class::NativeClass;
use crate::convert::{runtime_type_name, FromRuntime, ToRuntime};
use crate::error::{BridgeError, BridgeResult};
use crate::object::Obj;
use crate::persistent::Persistent;

pub(crate) type RawCallback = Rc<dyn Fn(&mut Runtime, &CallInfo) -> BridgeResult<Value>>;

pub(crate) fn raw_callback<F>(f: F) -> RawCallback
where
    F: Fn(&mut Runtime, &CallInfo) -> BridgeResult<Value> + 'static,
{
    Rc::new(f)
}

/// A native callable, ready to be converted into a runtime function.
#[derive(Clone)]
pub struct Function {
    name: String,
    raw: RawCallback,
}

impl Function {
    /// Wrap a free function
    pub fn new<A, R, F>(f: F) -> Self
    where
        A: FromArgs,
        R: ToRuntime,
        F: Fn(&mut Runtime, A) -> BridgeResult<R> + 'static,
    {
        Self::with_flags(CallFlags::NONE, f)
    }

    /// Wrap a free function with conversion flags
    pub fn with_flags<A, R, F>(flags: CallFlags, f: F) -> Self
    where
        A: FromArgs,
        R: ToRuntime,
        F: Fn(&mut Runtime, A) -> BridgeResult<R> + 'static,
    {
        Self::from_raw(move |rt, info| {
            let mut args = Arguments::new(rt, info, flags);
            let parsed = A::from_args(&mut args)?;
            let ret = f(rt, parsed)?;
            ret.to_runtime(rt)
        })
    }

    /// Wrap a member function. Calls fail with a receiver error unless
    /// `this` is a live `T`.
    pub fn method<T, A, R, F>(f: F) -> Self
    where
        T: NativeClass,
        A: FromArgs,
        R: ToRuntime,
        F: Fn(&mut Runtime, &Obj<T>, A) -> BridgeResult<R> + 'static,
    {
        Self::method_with_flags(CallFlags::NONE, f)
    }

    /// Wrap a member function with conversion flags
    pub fn method_with_flags<T, A, R, F>(flags: CallFlags, f: F) -> Self
    where
        T: NativeClass,
        A: FromArgs,
        R: ToRuntime,
        F: Fn(&mut Runtime, &Obj<T>, A) -> BridgeResult<R> + 'static,
    {
        Self::from_raw(move |rt, info| {
            let mut args = Arguments::new(rt, info, flags);
            let this: Obj<T> = args.this_as()?;
            let parsed = A::from_args(&mut args)?;
            let ret = f(rt, &this, parsed)?;
            ret.to_runtime(rt)
        })
    }

    /// Wrap a member function whose function arguments are held weakly, and
    /// run `after` with the call and its result when it succeeds.
    ///
    /// `after` typically records the arguments that must stay alive in the
    /// receiver's [`AttachedTable`](crate::AttachedTable).
    pub fn wrap_method<T, A, R, F, G>(f: F, after: G) -> Self
    where
        T: NativeClass,
        A: FromArgs,
        R: ToRuntime,
        F: Fn(&mut Runtime, &Obj<T>, A) -> BridgeResult<R> + 'static,
        G: Fn(&mut Runtime, &CallInfo, Value) -> BridgeResult<()> + 'static,
    {
        let inner = Self::method_with_flags(CallFlags::WEAK_FUNCTIONS, f).raw;
        Self::from_raw(move |rt, info| {
            let ret = inner(rt, info)?;
            after(rt, info, ret)?;
            Ok(ret)
        })
    }

    /// Wrap a closure that works on the raw call
    pub fn from_raw<F>(f: F) -> Self
    where
        F: Fn(&mut Runtime, &CallInfo) -> BridgeResult<Value> + 'static,
    {
        Self {
            name: String::new(),
            raw: raw_callback(f),
        }
    }

    /// Set the function's `name`
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// The function's `name`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the native closure directly
    pub fn invoke(&self, rt: &mut Runtime, info: &CallInfo) -> BridgeResult<Value> {
        (self.raw)(rt, info)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("name", &self.name).finish()
    }
}

impl ToRuntime for Function {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        let raw = self.raw;
        Ok(rt.create_function(&self.name, move |rt, info| {
            raw(rt, info).map_err(Exception::from)
        }))
    }
}

/// A runtime function held by native code.
///
/// `A` is the argument tuple and `R` the expected return type.
pub struct Callback<A = (), R = ()> {
    handle: Persistent,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A, R> Callback<A, R> {
    fn checked(rt: &mut Runtime, value: Value, weak: bool) -> BridgeResult<Self> {
        if rt.type_of(value) != ValueType::Function {
            return Err(BridgeError::ValueConversion {
                actual: runtime_type_name(rt, value),
                expected: ValueType::Function.name(),
            });
        }
        let handle = if weak {
            Persistent::weak(rt, value)
        } else {
            Persistent::new(rt, value)
        };
        Ok(Self {
            handle,
            _marker: PhantomData,
        })
    }

    /// Hold `func` strongly
    pub fn new(rt: &mut Runtime, func: Value) -> BridgeResult<Self> {
        Self::checked(rt, func, false)
    }

    /// Hold `func` without keeping it alive
    pub fn weak(rt: &mut Runtime, func: Value) -> BridgeResult<Self> {
        Self::checked(rt, func, true)
    }

    /// Whether the function is held weakly
    pub fn is_weak(&self) -> bool {
        self.handle.is_weak()
    }

    /// Whether the function is gone
    pub fn is_collected(&self) -> bool {
        self.handle.is_empty()
    }

    /// The function, rooted in the current scope
    pub fn value(&self, rt: &mut Runtime) -> Option<Value> {
        self.handle.value(rt)
    }

    /// Release the function now
    pub fn reset(&mut self) {
        self.handle.reset();
    }
}

impl<A: IntoArgs, R: FromRuntime> Callback<A, R> {
    /// Call the function with an undefined receiver
    pub fn call(&self, rt: &mut Runtime, args: A) -> BridgeResult<R> {
        let func = self.handle.value(rt).ok_or(BridgeError::FunctionCollected)?;
        let argv = args.into_args(rt)?;
        let ret = rt.call(func, Value::undefined(), &argv)?;
        match R::from_runtime(rt, ret) {
            Some(converted) => Ok(converted),
            None => Err(BridgeError::ReturnConversion {
                actual: runtime_type_name(rt, ret),
                expected: R::TYPE_NAME,
            }),
        }
    }
}

impl<A, R> Clone for Callback<A, R> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A, R> fmt::Debug for Callback<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("weak", &self.is_weak())
            .field("collected", &self.is_collected())
            .finish()
    }
}

impl<A, R> FromRuntime for Callback<A, R> {
    const TYPE_NAME: &'static str = "Function";

    fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
        Self::new(rt, value).ok()
    }

    fn from_arg(rt: &mut Runtime, value: Value, flags: CallFlags) -> Option<Self> {
        Self::checked(rt, value, flags.weak_functions).ok()
    }
}

impl<A, R> ToRuntime for &Callback<A, R> {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        Ok(self.value(rt).unwrap_or_default())
    }
}

impl<A, R> ToRuntime for Callback<A, R> {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        (&self).to_runtime(rt)
    }
}
