//! Traits for converting between native values and runtime values.
//!
//! [`ToRuntime`] produces a runtime [`Value`] from a native value;
//! [`FromRuntime`] goes the other way and names the expected type so that
//! failures can be reported with the exact messages script code relies on.
//!
//! # Example
//!
//! ```ignore
//! use tether_bind::{from_runtime, to_runtime};
//!
//! let value = to_runtime(&mut rt, ("text".to_string(), 42i32))?;
//! let (s, n): (String, i32) = from_runtime(&mut rt, value)?;
//! ```

use tether_engine::{Runtime, Value, ValueType};

use crate::arguments::CallFlags;
use crate::error::{BridgeError, BridgeResult};

/// Convert a native value into a runtime value.
pub trait ToRuntime {
    /// Produce the runtime value. Heap results are rooted in the current scope.
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value>;
}

/// Convert a runtime value into a native value.
pub trait FromRuntime: Sized {
    /// Type name used in conversion error messages
    const TYPE_NAME: &'static str;

    /// Convert, or `None` when the value does not have the expected shape
    fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self>;

    /// Convert a positional argument. Callables honour `flags` here.
    fn from_arg(rt: &mut Runtime, value: Value, flags: CallFlags) -> Option<Self> {
        let _ = flags;
        Self::from_runtime(rt, value)
    }

    /// Value to use when a trailing argument is omitted; `None` makes the
    /// argument required.
    fn when_missing() -> Option<Self> {
        None
    }
}

/// Convert `value` into a runtime value
pub fn to_runtime<T: ToRuntime>(rt: &mut Runtime, value: T) -> BridgeResult<Value> {
    value.to_runtime(rt)
}

/// Convert a runtime value into `T`
pub fn from_runtime<T: FromRuntime>(rt: &mut Runtime, value: Value) -> BridgeResult<T> {
    match T::from_runtime(rt, value) {
        Some(converted) => Ok(converted),
        None => Err(BridgeError::ValueConversion {
            actual: runtime_type_name(rt, value),
            expected: T::TYPE_NAME,
        }),
    }
}

/// Type name of a runtime value as it appears in error messages.
///
/// Objects report the name of their constructor, so wrapped instances show
/// their class name.
pub fn runtime_type_name(rt: &mut Runtime, value: Value) -> String {
    let ty = rt.type_of(value);
    if ty != ValueType::Object {
        return ty.name().to_string();
    }
    rt.scope(|rt| {
        let ctor = rt.get(value, "constructor").ok()?;
        rt.function_name(ctor)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    })
    .unwrap_or_else(|| ValueType::Object.name().to_string())
}

// ============================================================================
// Primitives
// ============================================================================

impl ToRuntime for Value {
    fn to_runtime(self, _rt: &mut Runtime) -> BridgeResult<Value> {
        Ok(self)
    }
}

impl FromRuntime for Value {
    const TYPE_NAME: &'static str = "Value";

    fn from_runtime(_rt: &mut Runtime, value: Value) -> Option<Self> {
        Some(value)
    }

    fn when_missing() -> Option<Self> {
        Some(Value::undefined())
    }
}

impl ToRuntime for () {
    fn to_runtime(self, _rt: &mut Runtime) -> BridgeResult<Value> {
        Ok(Value::undefined())
    }
}

impl FromRuntime for () {
    const TYPE_NAME: &'static str = "undefined";

    fn from_runtime(_rt: &mut Runtime, _value: Value) -> Option<Self> {
        Some(())
    }

    fn when_missing() -> Option<Self> {
        Some(())
    }
}

impl ToRuntime for bool {
    fn to_runtime(self, _rt: &mut Runtime) -> BridgeResult<Value> {
        Ok(Value::bool(self))
    }
}

impl FromRuntime for bool {
    const TYPE_NAME: &'static str = "Boolean";

    fn from_runtime(_rt: &mut Runtime, value: Value) -> Option<Self> {
        value.as_bool()
    }
}

macro_rules! impl_integer {
    ($($ty:ty),*) => {$(
        impl ToRuntime for $ty {
            fn to_runtime(self, _rt: &mut Runtime) -> BridgeResult<Value> {
                Ok(match i32::try_from(self) {
                    Ok(small) => Value::i32(small),
                    Err(_) => Value::number(self as f64),
                })
            }
        }

        impl FromRuntime for $ty {
            const TYPE_NAME: &'static str = "Integer";

            fn from_runtime(_rt: &mut Runtime, value: Value) -> Option<Self> {
                if let Some(i) = value.as_i32() {
                    return Some(<$ty>::try_from(i).unwrap_or(if i < 0 { <$ty>::MIN } else { <$ty>::MAX }));
                }
                // Float-to-int `as` truncates toward zero, saturates, and maps NaN to 0
                value.as_number().map(|n| n as $ty)
            }
        }
    )*};
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl ToRuntime for f64 {
    fn to_runtime(self, _rt: &mut Runtime) -> BridgeResult<Value> {
        Ok(Value::number(self))
    }
}

impl FromRuntime for f64 {
    const TYPE_NAME: &'static str = "Number";

    fn from_runtime(_rt: &mut Runtime, value: Value) -> Option<Self> {
        value.as_number()
    }
}

impl ToRuntime for f32 {
    fn to_runtime(self, _rt: &mut Runtime) -> BridgeResult<Value> {
        Ok(Value::number(f64::from(self)))
    }
}

impl FromRuntime for f32 {
    const TYPE_NAME: &'static str = "Number";

    fn from_runtime(_rt: &mut Runtime, value: Value) -> Option<Self> {
        value.as_number().map(|n| n as f32)
    }
}

// ============================================================================
// Strings
// ============================================================================

impl ToRuntime for &str {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        Ok(rt.create_string(self))
    }
}

impl ToRuntime for String {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        Ok(rt.create_string(&self))
    }
}

impl ToRuntime for &String {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        Ok(rt.create_string(self))
    }
}

impl FromRuntime for String {
    const TYPE_NAME: &'static str = "String";

    fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
        rt.string(value).map(str::to_string)
    }
}
