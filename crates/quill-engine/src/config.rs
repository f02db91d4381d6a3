//! Runtime configuration (quill.toml)
//!
//! Every key is optional; an empty file yields the defaults.

use std::collections::BTreeMap;
use std::path::Path;

use quill_sdk::Variant;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default call-stack tracker capacity
pub const DEFAULT_MAX_CALL_STACK: usize = 1024;

/// Errors that can occur while loading runtime options
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Options a [`ScriptRuntime`](crate::ScriptRuntime) is constructed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Capacity of the call-stack tracker
    pub max_call_stack: usize,

    /// Push/pop call-stack frames around every invocation. Overflow
    /// detection only happens while this is on.
    pub track_call_stack: bool,

    /// Start the profiler when the runtime is created
    pub profile_on_start: bool,

    /// Extra global constants, installed after `PI`
    pub globals: BTreeMap<String, Variant>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_call_stack: DEFAULT_MAX_CALL_STACK,
            track_call_stack: true,
            profile_on_start: false,
            globals: BTreeMap::new(),
        }
    }
}

impl RuntimeOptions {
    /// Parse options from a TOML string and validate them
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let options: RuntimeOptions = toml::from_str(source)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check the options for values the runtime cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_stack == 0 {
            return Err(ConfigError::Invalid(
                "max_call_stack must be greater than zero".to_string(),
            ));
        }
        for name in self.globals.keys() {
            if name.is_empty() {
                return Err(ConfigError::Invalid(
                    "global constant names cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_gives_defaults() {
        let options = RuntimeOptions::from_toml_str("").unwrap();
        assert_eq!(options, RuntimeOptions::default());
        assert_eq!(options.max_call_stack, 1024);
        assert!(options.track_call_stack);
        assert!(!options.profile_on_start);
    }

    #[test]
    fn test_parse_full() {
        let toml = r#"
max_call_stack = 64
track_call_stack = false
profile_on_start = true

[globals]
GRAVITY = 9.8
TITLE = "demo"
"#;
        let options = RuntimeOptions::from_toml_str(toml).unwrap();
        assert_eq!(options.max_call_stack, 64);
        assert!(!options.track_call_stack);
        assert!(options.profile_on_start);
        assert_eq!(options.globals.get("GRAVITY"), Some(&Variant::Float(9.8)));
        assert_eq!(options.globals.get("TITLE"), Some(&Variant::from("demo")));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = RuntimeOptions::from_toml_str("max_call_stack = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = RuntimeOptions::from_toml_str("max_call_stack = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(&path, "max_call_stack = 16\n").unwrap();

        let options = RuntimeOptions::load(&path).unwrap();
        assert_eq!(options.max_call_stack, 16);

        let missing = RuntimeOptions::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
