//! Conversions for compound native types

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{BuildHasher, Hash};
use tether_engine::{Runtime, Value};

use crate::arguments::CallFlags;
use crate::convert::{FromRuntime, ToRuntime};
use crate::error::{BridgeError, BridgeResult};

/// The runtime `null` value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Null;

impl ToRuntime for Null {
    fn to_runtime(self, _rt: &mut Runtime) -> BridgeResult<Value> {
        Ok(Value::null())
    }
}

impl FromRuntime for Null {
    const TYPE_NAME: &'static str = "Null";

    fn from_runtime(_rt: &mut Runtime, value: Value) -> Option<Self> {
        value.is_null().then_some(Null)
    }
}

/// Empty alternative of a variant. Matches `undefined` and `null`, and makes
/// the variant optional as a trailing argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Monostate;

impl ToRuntime for Monostate {
    fn to_runtime(self, _rt: &mut Runtime) -> BridgeResult<Value> {
        Ok(Value::undefined())
    }
}

impl FromRuntime for Monostate {
    const TYPE_NAME: &'static str = "undefined";

    fn from_runtime(_rt: &mut Runtime, value: Value) -> Option<Self> {
        value.is_nullish().then_some(Monostate)
    }

    fn when_missing() -> Option<Self> {
        Some(Monostate)
    }
}

impl<T: ToRuntime> ToRuntime for Option<T> {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        match self {
            Some(inner) => inner.to_runtime(rt),
            None => Ok(Value::undefined()),
        }
    }
}

impl<T: FromRuntime> FromRuntime for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
        if value.is_nullish() {
            return Some(None);
        }
        T::from_runtime(rt, value).map(Some)
    }

    fn from_arg(rt: &mut Runtime, value: Value, flags: CallFlags) -> Option<Self> {
        if value.is_nullish() {
            return Some(None);
        }
        T::from_arg(rt, value, flags).map(Some)
    }

    fn when_missing() -> Option<Self> {
        Some(None)
    }
}

// ============================================================================
// Sequences and dictionaries
// ============================================================================

impl<T: ToRuntime> ToRuntime for Vec<T> {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        let items = self
            .into_iter()
            .map(|item| item.to_runtime(rt))
            .collect::<BridgeResult<Vec<_>>>()?;
        Ok(rt.create_array(&items))
    }
}

impl<T: FromRuntime> FromRuntime for Vec<T> {
    const TYPE_NAME: &'static str = "Array";

    fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
        let len = rt.array_len(value)?;
        let mut out = Vec::with_capacity(len);
        for index in 0..len {
            let item = rt.array_get(value, index)?;
            out.push(T::from_runtime(rt, item)?);
        }
        Some(out)
    }
}

impl<T: ToRuntime, S> ToRuntime for HashSet<T, S> {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        self.into_iter().collect::<Vec<_>>().to_runtime(rt)
    }
}

/// Duplicate elements collapse; the array length is not checked.
impl<T, S> FromRuntime for HashSet<T, S>
where
    T: FromRuntime + Eq + Hash,
    S: BuildHasher + Default,
{
    const TYPE_NAME: &'static str = "Array";

    fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
        Some(<Vec<T>>::from_runtime(rt, value)?.into_iter().collect())
    }
}

impl<T: ToRuntime> ToRuntime for BTreeSet<T> {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        self.into_iter().collect::<Vec<_>>().to_runtime(rt)
    }
}

impl<T: FromRuntime + Ord> FromRuntime for BTreeSet<T> {
    const TYPE_NAME: &'static str = "Array";

    fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
        Some(<Vec<T>>::from_runtime(rt, value)?.into_iter().collect())
    }
}

/// A map key stored as an object property name.
///
/// Integer keys use their decimal form, and only that exact form converts
/// back: `"01"` and `"+1"` are not keys of an integer map.
pub trait PropertyKey: Sized {
    fn to_key(&self) -> String;
    fn from_key(key: &str) -> Option<Self>;
}

impl PropertyKey for String {
    fn to_key(&self) -> String {
        self.clone()
    }

    fn from_key(key: &str) -> Option<Self> {
        Some(key.to_string())
    }
}

macro_rules! impl_integer_key {
    ($($ty:ty),+) => {$(
        impl PropertyKey for $ty {
            fn to_key(&self) -> String {
                self.to_string()
            }

            fn from_key(key: &str) -> Option<Self> {
                let n: $ty = key.parse().ok()?;
                (n.to_string() == key).then_some(n)
            }
        }
    )+};
}

impl_integer_key!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

fn object_from_entries<I, K, T>(rt: &mut Runtime, entries: I) -> BridgeResult<Value>
where
    I: IntoIterator<Item = (K, T)>,
    K: PropertyKey,
    T: ToRuntime,
{
    let obj = rt.create_object();
    for (key, value) in entries {
        let value = value.to_runtime(rt)?;
        rt.set(obj, &key.to_key(), value)?;
    }
    Ok(obj)
}

fn entries_from_object<K: PropertyKey, T: FromRuntime>(
    rt: &mut Runtime,
    value: Value,
) -> Option<Vec<(K, T)>> {
    if !value.is_object() || rt.is_array(value) {
        return None;
    }
    let keys = rt.own_keys(value).ok()?;
    rt.scope(|rt| {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let item = rt.get(value, &key).ok()?;
            let converted = T::from_runtime(rt, item)?;
            out.push((K::from_key(&key)?, converted));
        }
        Some(out)
    })
}

impl<K: PropertyKey, T: ToRuntime, S> ToRuntime for HashMap<K, T, S> {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        object_from_entries(rt, self)
    }
}

impl<K, T, S> FromRuntime for HashMap<K, T, S>
where
    K: PropertyKey + Eq + Hash,
    T: FromRuntime,
    S: BuildHasher + Default,
{
    const TYPE_NAME: &'static str = "Object";

    fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
        Some(entries_from_object(rt, value)?.into_iter().collect())
    }
}

impl<K: PropertyKey, T: ToRuntime> ToRuntime for BTreeMap<K, T> {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        object_from_entries(rt, self)
    }
}

impl<K: PropertyKey + Ord, T: FromRuntime> FromRuntime for BTreeMap<K, T> {
    const TYPE_NAME: &'static str = "Object";

    fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
        Some(entries_from_object(rt, value)?.into_iter().collect())
    }
}

// ============================================================================
// Tuples
// ============================================================================

macro_rules! impl_tuple {
    ($len:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name: ToRuntime),+> ToRuntime for ($($name,)+) {
            fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
                let items = [$(self.$idx.to_runtime(rt)?),+];
                Ok(rt.create_array(&items))
            }
        }

        impl<$($name: FromRuntime),+> FromRuntime for ($($name,)+) {
            const TYPE_NAME: &'static str = "Tuple";

            fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
                if rt.array_len(value)? != $len {
                    return None;
                }
                Some(($({
                    let item = rt.array_get(value, $idx)?;
                    $name::from_runtime(rt, item)?
                },)+))
            }
        }
    };
}

impl_tuple!(1; A: 0);
impl_tuple!(2; A: 0, B: 1);
impl_tuple!(3; A: 0, B: 1, C: 2);
impl_tuple!(4; A: 0, B: 1, C: 2, D: 3);
impl_tuple!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_tuple!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

// ============================================================================
// Variants
// ============================================================================

macro_rules! define_variant {
    ($(#[$meta:meta])* $variant:ident { $($alt:ident : $ty:ident),+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $variant<$($ty),+> {
            $(
                #[allow(missing_docs)]
                $alt($ty),
            )+
        }

        impl<$($ty: ToRuntime),+> ToRuntime for $variant<$($ty),+> {
            fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
                match self {
                    $($variant::$alt(inner) => inner.to_runtime(rt),)+
                }
            }
        }

        impl<$($ty: FromRuntime),+> FromRuntime for $variant<$($ty),+> {
            const TYPE_NAME: &'static str = "Variant";

            fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
                $(
                    if let Some(inner) = $ty::from_runtime(rt, value) {
                        return Some($variant::$alt(inner));
                    }
                )+
                None
            }

            fn from_arg(rt: &mut Runtime, value: Value, flags: CallFlags) -> Option<Self> {
                $(
                    if let Some(inner) = $ty::from_arg(rt, value, flags) {
                        return Some($variant::$alt(inner));
                    }
                )+
                None
            }

            fn when_missing() -> Option<Self> {
                $(
                    if let Some(inner) = $ty::when_missing() {
                        return Some($variant::$alt(inner));
                    }
                )+
                None
            }
        }
    };
}

define_variant!(
    /// One of two alternatives, matched in declaration order
    Variant2 { A: T0, B: T1 }
);
define_variant!(
    /// One of three alternatives, matched in declaration order
    Variant3 { A: T0, B: T1, C: T2 }
);
define_variant!(
    /// One of four alternatives, matched in declaration order
    Variant4 { A: T0, B: T1, C: T2, D: T3 }
);

// ============================================================================
// Wide strings
// ============================================================================

/// A string as UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WideString(pub Vec<u16>);

impl From<&str> for WideString {
    fn from(s: &str) -> Self {
        WideString(s.encode_utf16().collect())
    }
}

impl WideString {
    /// Decode into a `String`, replacing unpaired surrogates
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }
}

/// Runtime strings hold valid Unicode only, so an unpaired surrogate is a
/// conversion failure rather than a silent U+FFFD.
impl ToRuntime for WideString {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        let s = String::from_utf16(&self.0).map_err(|_| BridgeError::ValueConversion {
            actual: "WideString".to_string(),
            expected: "String",
        })?;
        Ok(rt.create_string(&s))
    }
}

impl FromRuntime for WideString {
    const TYPE_NAME: &'static str = "String";

    fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
        rt.string(value).map(WideString::from)
    }
}
