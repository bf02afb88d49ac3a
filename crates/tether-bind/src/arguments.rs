//! Positional argument conversion for native callables

use tether_engine::{CallInfo, Runtime, Value};

use crate::convert::{FromRuntime, ToRuntime};
use crate::error::{BridgeError, BridgeResult};

/// Per-callable conversion options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallFlags {
    /// Store every function-valued argument weakly
    pub weak_functions: bool,
}

impl CallFlags {
    /// No special handling
    pub const NONE: CallFlags = CallFlags {
        weak_functions: false,
    };

    /// Function-valued arguments are held weakly
    pub const WEAK_FUNCTIONS: CallFlags = CallFlags {
        weak_functions: true,
    };
}

/// Cursor over the arguments of one native call.
pub struct Arguments<'a> {
    rt: &'a mut Runtime,
    info: &'a CallInfo,
    next: usize,
    flags: CallFlags,
}

impl<'a> Arguments<'a> {
    /// Start reading `info` from the first argument
    pub fn new(rt: &'a mut Runtime, info: &'a CallInfo, flags: CallFlags) -> Self {
        Self {
            rt,
            info,
            next: 0,
            flags,
        }
    }

    /// The runtime the call runs in
    pub fn runtime(&mut self) -> &mut Runtime {
        self.rt
    }

    /// Raw call information
    pub fn info(&self) -> &CallInfo {
        self.info
    }

    /// The receiver
    pub fn this(&self) -> Value {
        self.info.this
    }

    /// Number of arguments actually passed
    pub fn len(&self) -> usize {
        self.info.len()
    }

    /// Whether no arguments were passed
    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    /// Flags this call was created with
    pub fn flags(&self) -> CallFlags {
        self.flags
    }

    /// Convert the next positional argument.
    ///
    /// An omitted trailing argument uses [`FromRuntime::when_missing`] and
    /// fails with `InsufficientArguments` when the type has no default.
    pub fn next<T: FromRuntime>(&mut self) -> BridgeResult<T> {
        let index = self.next;
        self.next += 1;

        if index >= self.info.len() {
            return T::when_missing().ok_or(BridgeError::InsufficientArguments);
        }
        let value = self.info.arg(index);
        match T::from_arg(self.rt, value, self.flags) {
            Some(converted) => Ok(converted),
            None => Err(BridgeError::ArgumentConversion {
                index,
                actual: crate::convert::runtime_type_name(self.rt, value),
                expected: T::TYPE_NAME,
            }),
        }
    }

    /// Convert the receiver
    pub fn this_as<T: FromRuntime>(&mut self) -> BridgeResult<T> {
        T::from_runtime(self.rt, self.info.this).ok_or(BridgeError::ReceiverConversion {
            expected: T::TYPE_NAME,
        })
    }
}

/// Types that can be read from a call's argument list.
pub trait FromArgs: Sized {
    /// Read every argument this type needs
    fn from_args(args: &mut Arguments<'_>) -> BridgeResult<Self>;
}

/// Types that can be passed as a runtime argument list.
pub trait IntoArgs {
    /// Convert into runtime values, in order
    fn into_args(self, rt: &mut Runtime) -> BridgeResult<Vec<Value>>;
}

impl FromArgs for () {
    fn from_args(_args: &mut Arguments<'_>) -> BridgeResult<Self> {
        Ok(())
    }
}

impl IntoArgs for () {
    fn into_args(self, _rt: &mut Runtime) -> BridgeResult<Vec<Value>> {
        Ok(Vec::new())
    }
}

macro_rules! impl_args {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: FromRuntime),+> FromArgs for ($($name,)+) {
            fn from_args(args: &mut Arguments<'_>) -> BridgeResult<Self> {
                Ok(($(args.next::<$name>()?,)+))
            }
        }

        impl<$($name: ToRuntime),+> IntoArgs for ($($name,)+) {
            fn into_args(self, rt: &mut Runtime) -> BridgeResult<Vec<Value>> {
                Ok(vec![$(self.$idx.to_runtime(rt)?),+])
            }
        }
    };
}

impl_args!(A: 0);
impl_args!(A: 0, B: 1);
impl_args!(A: 0, B: 1, C: 2);
impl_args!(A: 0, B: 1, C: 2, D: 3);
impl_args!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_args!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
