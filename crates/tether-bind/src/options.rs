//! Bridge configuration

use serde::Deserialize;
use std::path::Path;
use tether_engine::ConfigError;

/// Default number of collection passes [`gc_until`](crate::gc_until) makes.
pub const DEFAULT_GC_POLL_ATTEMPTS: usize = 10;

/// Default storage mode for functions passed to property setters.
pub const DEFAULT_WEAK_SETTER_FUNCTIONS: bool = true;

/// Options for a bridge instance, set once at [`init_with_options`](crate::init_with_options).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Collection passes before `gc_until` gives up
    pub gc_poll_attempts: usize,

    /// Whether setters hold function arguments weakly unless overridden
    pub weak_setter_functions: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            gc_poll_attempts: DEFAULT_GC_POLL_ATTEMPTS,
            weak_setter_functions: DEFAULT_WEAK_SETTER_FUNCTIONS,
        }
    }
}

impl BridgeOptions {
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
