//! Tether engine
//!
//! A small single-threaded garbage-collected runtime used as the host side of
//! the Tether bridge. It provides:
//!
//! - NaN-boxed [`Value`]s with generation-checked heap handles
//! - plain objects, arrays, maps and host functions with a prototype-based
//!   property model
//! - handle scopes, counted [`Reference`]s (strong or weak) and a mark-sweep
//!   collector with per-object finalizers and native wrap payloads
//! - a turn queue, so finalizers and deferred work run between turns
//!
//! There is no parser or interpreter; "script" code is host functions calling
//! back into the runtime.

#![warn(missing_docs)]

pub mod defaults;
pub mod error;
pub mod gc;
pub mod object;
pub mod options;
pub mod reference;
pub mod runtime;
pub mod value;

pub use error::{ConfigError, EngineResult, Exception, ExceptionKind};
pub use gc::{GcStats, ObjId};
pub use object::{Finalizer, NativeCallback, PropertyAttributes, PropertySlot, WrapFinalizer};
pub use options::RuntimeOptions;
pub use reference::Reference;
pub use runtime::{CallInfo, Runtime, ScopeMark, Task};
pub use value::{Value, ValueType};
