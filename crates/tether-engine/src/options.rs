//! Runtime configuration

use crate::defaults::{DEFAULT_DEFER_FINALIZERS, DEFAULT_GC_THRESHOLD};
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Options controlling a [`Runtime`](crate::Runtime).
///
/// Loadable from TOML; missing keys fall back to the defaults:
///
/// ```toml
/// gc_threshold = 8192
/// defer_finalizers = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Allocations between automatic collections; 0 disables them
    pub gc_threshold: usize,

    /// Run finalizers on the next [`yield_turn`](crate::Runtime::yield_turn)
    /// instead of at the end of the collecting pass
    pub defer_finalizers: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            gc_threshold: DEFAULT_GC_THRESHOLD,
            defer_finalizers: DEFAULT_DEFER_FINALIZERS,
        }
    }
}

impl RuntimeOptions {
    /// Options with automatic collection disabled
    pub fn manual_gc() -> Self {
        Self {
            gc_threshold: 0,
            ..Self::default()
        }
    }

    /// Parse options from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load options from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
