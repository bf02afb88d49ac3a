//! Property and accessor definitions
//!
//! A [`Property`] describes one named slot: a data value, or a getter and
//! setter pair backed by free functions, member functions or field
//! projections of a native object. Tables of properties are installed with
//! [`define_properties`].
//!
//! Data properties default to writable and configurable; accessors default
//! to non-configurable, so deleting one leaves it in place. Neither kind is
//! enumerable unless asked for.

use std::fmt;
use std::rc::Rc;
use tether_engine::{CallInfo, Exception, PropertyAttributes, PropertySlot, Runtime, Value};

use crate::arguments::{Arguments, CallFlags};
use crate::attached_table::AttachedTable;
use crate::callback::{raw_callback, RawCallback};
use crate::class::NativeClass;
use crate::convert::{FromRuntime, ToRuntime};
use crate::error::BridgeResult;
use crate::instance_data::InstanceData;
use crate::object::Obj;
use crate::options::DEFAULT_WEAK_SETTER_FUNCTIONS;

/// Whether an accessor remembers values in its owner's attached table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Every read runs the getter
    #[default]
    NoCache,
    /// The first read is stored and returned afterwards
    Getter,
    /// Like `Getter`, and assignments replace the stored value
    GetterAndSetter,
}

/// Read half of an accessor.
#[derive(Clone)]
pub struct Getter {
    raw: RawCallback,
}

impl Getter {
    /// A getter that ignores the receiver
    pub fn new<R, F>(f: F) -> Self
    where
        R: ToRuntime,
        F: Fn(&mut Runtime) -> BridgeResult<R> + 'static,
    {
        Self {
            raw: raw_callback(move |rt, _info| f(rt)?.to_runtime(rt)),
        }
    }

    /// A getter reading from a `T` receiver
    pub fn method<T, R, F>(f: F) -> Self
    where
        T: NativeClass,
        R: ToRuntime,
        F: Fn(&mut Runtime, &Obj<T>) -> BridgeResult<R> + 'static,
    {
        Self {
            raw: raw_callback(move |rt, info| {
                let this: Obj<T> = Arguments::new(rt, info, CallFlags::NONE).this_as()?;
                f(rt, &this)?.to_runtime(rt)
            }),
        }
    }

    /// A getter projecting a field of a `T` receiver
    pub fn member<T, R, F>(f: F) -> Self
    where
        T: NativeClass,
        R: ToRuntime,
        F: Fn(&T) -> R + 'static,
    {
        Self::method(move |_rt, this: &Obj<T>| {
            let guard = this.try_borrow()?;
            let value = f(&*guard);
            drop(guard);
            Ok(value)
        })
    }
}

type SetFn = Rc<dyn Fn(&mut Runtime, &CallInfo, CallFlags) -> BridgeResult<()>>;

fn set_fn<F>(f: F) -> SetFn
where
    F: Fn(&mut Runtime, &CallInfo, CallFlags) -> BridgeResult<()> + 'static,
{
    Rc::new(f)
}

/// Write half of an accessor.
///
/// Function-valued arguments are held weakly unless
/// [`strong_functions`](Setter::strong_functions) is set; the default comes
/// from [`BridgeOptions::weak_setter_functions`](crate::BridgeOptions).
#[derive(Clone)]
pub struct Setter {
    raw: SetFn,
    weak_functions: Option<bool>,
}

impl Setter {
    fn from_fn(raw: SetFn) -> Self {
        Self {
            raw,
            weak_functions: None,
        }
    }

    /// A setter that ignores the receiver
    pub fn new<A, F>(f: F) -> Self
    where
        A: FromRuntime,
        F: Fn(&mut Runtime, A) -> BridgeResult<()> + 'static,
    {
        Self::from_fn(set_fn(move |rt, info, flags| {
            let value = Arguments::new(rt, info, flags).next::<A>()?;
            f(rt, value)
        }))
    }

    /// A setter writing to a `T` receiver
    pub fn method<T, A, F>(f: F) -> Self
    where
        T: NativeClass,
        A: FromRuntime,
        F: Fn(&mut Runtime, &Obj<T>, A) -> BridgeResult<()> + 'static,
    {
        Self::from_fn(set_fn(move |rt, info, flags| {
            let mut args = Arguments::new(rt, info, flags);
            let this: Obj<T> = args.this_as()?;
            let value = args.next::<A>()?;
            f(rt, &this, value)
        }))
    }

    /// A setter assigning a field of a `T` receiver
    pub fn member<T, A, F>(f: F) -> Self
    where
        T: NativeClass,
        A: FromRuntime,
        F: Fn(&mut T, A) + 'static,
    {
        Self::method(move |_rt, this: &Obj<T>, value: A| {
            let mut guard = this.try_borrow_mut()?;
            f(&mut *guard, value);
            Ok(())
        })
    }

    /// Hold function arguments strongly
    pub fn strong_functions(mut self) -> Self {
        self.weak_functions = Some(false);
        self
    }

    /// Hold function arguments weakly
    pub fn weak_functions(mut self) -> Self {
        self.weak_functions = Some(true);
        self
    }
}

type ValueFn = Box<dyn FnOnce(&mut Runtime) -> BridgeResult<Value>>;

enum PropertyKind {
    Value(ValueFn),
    Accessor {
        getter: Option<Getter>,
        setter: Option<Setter>,
    },
}

/// One entry of a property table.
pub struct Property {
    name: String,
    kind: PropertyKind,
    cache: CacheMode,
    writable: Option<bool>,
    enumerable: Option<bool>,
    configurable: Option<bool>,
}

impl Property {
    fn with_kind(name: &str, kind: PropertyKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            cache: CacheMode::NoCache,
            writable: None,
            enumerable: None,
            configurable: None,
        }
    }

    /// A data property holding `value`
    pub fn value<V: ToRuntime + 'static>(name: &str, value: V) -> Self {
        Self::with_kind(
            name,
            PropertyKind::Value(Box::new(move |rt: &mut Runtime| value.to_runtime(rt))),
        )
    }

    /// An accessor with both halves
    pub fn accessor(name: &str, getter: Getter, setter: Setter) -> Self {
        Self::with_kind(
            name,
            PropertyKind::Accessor {
                getter: Some(getter),
                setter: Some(setter),
            },
        )
    }

    /// A read-only accessor
    pub fn getter(name: &str, getter: Getter) -> Self {
        Self::with_kind(
            name,
            PropertyKind::Accessor {
                getter: Some(getter),
                setter: None,
            },
        )
    }

    /// A write-only accessor
    pub fn setter(name: &str, setter: Setter) -> Self {
        Self::with_kind(
            name,
            PropertyKind::Accessor {
                getter: None,
                setter: Some(setter),
            },
        )
    }

    /// An accessor over a field of a `T` receiver
    pub fn member<T, R, A, G, S>(name: &str, get: G, set: S) -> Self
    where
        T: NativeClass,
        R: ToRuntime,
        A: FromRuntime,
        G: Fn(&T) -> R + 'static,
        S: Fn(&mut T, A) + 'static,
    {
        Self::accessor(name, Getter::member(get), Setter::member(set))
    }

    /// Set the cache mode (accessors only)
    pub fn cache(mut self, mode: CacheMode) -> Self {
        self.cache = mode;
        self
    }

    /// Override writability (data properties only)
    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = Some(writable);
        self
    }

    /// Override enumerability
    pub fn enumerable(mut self, enumerable: bool) -> Self {
        self.enumerable = Some(enumerable);
        self
    }

    /// Override configurability
    pub fn configurable(mut self, configurable: bool) -> Self {
        self.configurable = Some(configurable);
        self
    }

    /// The property name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn define(self, rt: &mut Runtime, owner: Value, weak_setter_default: bool) -> BridgeResult<()> {
        let Property {
            name,
            kind,
            cache,
            writable,
            enumerable,
            configurable,
        } = self;
        let slot = match kind {
            PropertyKind::Value(make) => PropertySlot::data(
                make(rt)?,
                PropertyAttributes::new(
                    writable.unwrap_or(true),
                    enumerable.unwrap_or(false),
                    configurable.unwrap_or(true),
                ),
            ),
            PropertyKind::Accessor { getter, setter } => PropertySlot::Accessor {
                getter: getter.map(|g| getter_function(rt, &name, g, cache)),
                setter: setter.map(|s| {
                    let flags = CallFlags {
                        weak_functions: s.weak_functions.unwrap_or(weak_setter_default),
                    };
                    setter_function(rt, &name, s, flags, cache)
                }),
                enumerable: enumerable.unwrap_or(false),
                configurable: configurable.unwrap_or(false),
            },
        };
        rt.define_property(owner, &name, slot)?;
        Ok(())
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            PropertyKind::Value(_) => "value",
            PropertyKind::Accessor { .. } => "accessor",
        };
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("cache", &self.cache)
            .finish()
    }
}

fn getter_function(rt: &mut Runtime, name: &str, getter: Getter, cache: CacheMode) -> Value {
    let key = name.to_string();
    let raw = getter.raw;
    rt.create_function(name, move |rt, info| {
        read_through_cache(rt, info, &raw, cache, &key).map_err(Exception::from)
    })
}

fn read_through_cache(
    rt: &mut Runtime,
    info: &CallInfo,
    raw: &RawCallback,
    cache: CacheMode,
    key: &str,
) -> BridgeResult<Value> {
    if cache == CacheMode::NoCache || !info.this.is_object() {
        return raw(rt, info);
    }
    let table = AttachedTable::new(rt, info.this)?;
    if let Some(cached) = table.get(rt, key)? {
        return Ok(cached);
    }
    let value = raw(rt, info)?;
    table.set(rt, key, value)?;
    Ok(value)
}

fn setter_function(rt: &mut Runtime, name: &str, setter: Setter, flags: CallFlags, cache: CacheMode) -> Value {
    let key = name.to_string();
    let raw = setter.raw;
    rt.create_function(name, move |rt, info| {
        write_through_cache(rt, info, &raw, flags, cache, &key).map_err(Exception::from)
    })
}

fn write_through_cache(
    rt: &mut Runtime,
    info: &CallInfo,
    raw: &SetFn,
    flags: CallFlags,
    cache: CacheMode,
    key: &str,
) -> BridgeResult<Value> {
    raw(rt, info, flags)?;
    if cache == CacheMode::GetterAndSetter && info.this.is_object() {
        let table = AttachedTable::new(rt, info.this)?;
        table.set(rt, key, info.arg(0))?;
    }
    Ok(Value::undefined())
}

/// Install `properties` on `owner`
pub fn define_properties<I>(rt: &mut Runtime, owner: Value, properties: I) -> BridgeResult<()>
where
    I: IntoIterator<Item = Property>,
{
    let weak_setter_default = InstanceData::get(rt)
        .map(|data| data.options().weak_setter_functions)
        .unwrap_or(DEFAULT_WEAK_SETTER_FUNCTIONS);
    rt.scope(|rt| {
        properties
            .into_iter()
            .try_for_each(|property| property.define(rt, owner, weak_setter_default))
    })
}
