//! Value: NaN-boxed u64 runtime value
//!
//! Every runtime value fits in 64 bits. Numbers are stored as raw IEEE 754
//! doubles; everything else lives in the NaN space with a 3-bit tag.
//!
//! # Encoding
//!
//! ```text
//! f64 (number): Any value where upper 13 bits != 0x1FFF (raw IEEE 754)
//! Tagged:       0xFFF8 + 3-bit tag + 48-bit payload (NaN-boxed)
//!   - Object:    0xFFF8000000000000 | gen << 32 | index     [tag=000]
//!   - i32 (int): 0xFFF8001000000000 | (i32 as u64)          [tag=001]
//!   - bool:      0xFFF8002000000000 | (b as u64)            [tag=010]
//!   - String:    0xFFF8003000000000 | gen << 32 | index     [tag=011]
//!   - null:      0xFFF8006000000000                         [tag=110]
//!   - undefined: 0xFFF8007000000000                         [tag=111]
//! ```
//!
//! NaN results are canonicalized to the positive quiet NaN so that no
//! computed double can alias a tagged value.

use crate::gc::ObjId;
use std::fmt;

/// NaN-boxed 64-bit runtime value.
///
/// `Value` is `Copy` and carries no ownership: heap-backed values are handles
/// into the runtime heap and are only kept alive while reachable from a root.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

const NAN_BOX_BASE: u64 = 0xFFF8_0000_0000_0000;
const TAG_SHIFT: u64 = 48;
const TAG_MASK: u64 = 0x7 << TAG_SHIFT;
const PAYLOAD_MASK_32: u64 = 0x0000_0000_FFFF_FFFF;

const TAG_OBJECT: u64 = 0x0 << TAG_SHIFT;
const TAG_I32: u64 = 0x1 << TAG_SHIFT;
const TAG_BOOL: u64 = 0x2 << TAG_SHIFT;
const TAG_STRING: u64 = 0x3 << TAG_SHIFT;
const TAG_NULL: u64 = 0x6 << TAG_SHIFT;
const TAG_UNDEFINED: u64 = 0x7 << TAG_SHIFT;

const NULL_BITS: u64 = NAN_BOX_BASE | TAG_NULL;
const UNDEFINED_BITS: u64 = NAN_BOX_BASE | TAG_UNDEFINED;
const TRUE_BITS: u64 = NAN_BOX_BASE | TAG_BOOL | 1;
const FALSE_BITS: u64 = NAN_BOX_BASE | TAG_BOOL;

/// Coarse runtime type of a value, as reported by `typeof`-style queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// The undefined value
    Undefined,
    /// The null value
    Null,
    /// `true` or `false`
    Boolean,
    /// Integer or double
    Number,
    /// Heap string
    String,
    /// Callable object
    Function,
    /// Any other object (plain, array, map)
    Object,
}

impl ValueType {
    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Undefined => "undefined",
            ValueType::Null => "null",
            ValueType::Boolean => "Boolean",
            ValueType::Number => "Number",
            ValueType::String => "String",
            ValueType::Function => "Function",
            ValueType::Object => "Object",
        }
    }
}

impl Value {
    // ========================================================================
    // Raw bits
    // ========================================================================

    /// Create from raw u64 bits
    #[inline(always)]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Get raw u64 bits
    #[inline(always)]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    // ========================================================================
    // Constructors
    // ========================================================================

    /// The undefined value
    #[inline]
    pub const fn undefined() -> Self {
        Self(UNDEFINED_BITS)
    }

    /// The null value
    #[inline]
    pub const fn null() -> Self {
        Self(NULL_BITS)
    }

    /// A boolean
    #[inline]
    pub const fn bool(b: bool) -> Self {
        if b {
            Self(TRUE_BITS)
        } else {
            Self(FALSE_BITS)
        }
    }

    /// A 32-bit integer
    #[inline]
    pub const fn i32(i: i32) -> Self {
        Self(NAN_BOX_BASE | TAG_I32 | (i as u32 as u64))
    }

    /// A double. NaN is canonicalized.
    #[inline]
    pub fn number(n: f64) -> Self {
        if n.is_nan() {
            Self(f64::NAN.to_bits())
        } else {
            Self(n.to_bits())
        }
    }

    #[inline]
    pub(crate) fn object(id: ObjId) -> Self {
        Self(NAN_BOX_BASE | TAG_OBJECT | id.to_payload())
    }

    #[inline]
    pub(crate) fn string(id: ObjId) -> Self {
        Self(NAN_BOX_BASE | TAG_STRING | id.to_payload())
    }

    // ========================================================================
    // Type checks
    // ========================================================================

    #[inline(always)]
    const fn is_boxed(self) -> bool {
        (self.0 & NAN_BOX_BASE) == NAN_BOX_BASE
    }

    #[inline(always)]
    const fn tag(self) -> u64 {
        self.0 & TAG_MASK
    }

    /// Check if undefined
    #[inline]
    pub const fn is_undefined(self) -> bool {
        self.0 == UNDEFINED_BITS
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == NULL_BITS
    }

    /// Check if null or undefined
    #[inline]
    pub const fn is_nullish(self) -> bool {
        self.is_null() || self.is_undefined()
    }

    /// Check if boolean
    #[inline]
    pub const fn is_bool(self) -> bool {
        self.is_boxed() && self.tag() == TAG_BOOL
    }

    /// Check if an i32-tagged integer
    #[inline]
    pub const fn is_i32(self) -> bool {
        self.is_boxed() && self.tag() == TAG_I32
    }

    /// Check if a number (i32 or double)
    #[inline]
    pub const fn is_number(self) -> bool {
        !self.is_boxed() || self.tag() == TAG_I32
    }

    /// Check if a heap string
    #[inline]
    pub const fn is_string(self) -> bool {
        self.is_boxed() && self.tag() == TAG_STRING
    }

    /// Check if an object handle (plain objects, functions, arrays, maps)
    #[inline]
    pub const fn is_object(self) -> bool {
        self.is_boxed() && self.tag() == TAG_OBJECT
    }

    /// Check if the value refers to the heap
    #[inline]
    pub const fn is_heap_allocated(self) -> bool {
        self.is_object() || self.is_string()
    }

    // ========================================================================
    // Extraction
    // ========================================================================

    /// Extract a boolean
    #[inline]
    pub const fn as_bool(self) -> Option<bool> {
        if self.is_bool() {
            Some((self.0 & 1) != 0)
        } else {
            None
        }
    }

    /// Extract an i32-tagged integer
    #[inline]
    pub const fn as_i32(self) -> Option<i32> {
        if self.is_i32() {
            Some((self.0 & PAYLOAD_MASK_32) as u32 as i32)
        } else {
            None
        }
    }

    /// Extract a number, widening i32 to f64
    #[inline]
    pub fn as_number(self) -> Option<f64> {
        if !self.is_boxed() {
            Some(f64::from_bits(self.0))
        } else {
            self.as_i32().map(f64::from)
        }
    }

    /// Extract an object handle
    #[inline]
    pub fn as_object(self) -> Option<ObjId> {
        if self.is_object() {
            Some(ObjId::from_payload(self.0))
        } else {
            None
        }
    }

    /// Extract a string handle
    #[inline]
    pub(crate) fn as_string_id(self) -> Option<ObjId> {
        if self.is_string() {
            Some(ObjId::from_payload(self.0))
        } else {
            None
        }
    }

    /// Heap handle of either an object or a string
    #[inline]
    pub(crate) fn heap_id(self) -> Option<ObjId> {
        if self.is_heap_allocated() {
            Some(ObjId::from_payload(self.0))
        } else {
            None
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::undefined()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_undefined() {
            write!(f, "undefined")
        } else if self.is_null() {
            write!(f, "null")
        } else if let Some(b) = self.as_bool() {
            write!(f, "{}", b)
        } else if let Some(i) = self.as_i32() {
            write!(f, "{}", i)
        } else if let Some(n) = self.as_number() {
            write!(f, "{:?}", n)
        } else if let Some(id) = self.as_string_id() {
            write!(f, "String({:?})", id)
        } else if let Some(id) = self.as_object() {
            write!(f, "Object({:?})", id)
        } else {
            write!(f, "Value({:#018x})", self.0)
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::i32(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}
