//! # Engine Error Types
//!
//! Sequencing failures are [`SequenceError`](seqgen_core::SequenceError)
//! from seqgen-core. This module adds the errors of loading engine
//! configuration.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Config Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │      I/O        │  │     Format      │  │      Semantics          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Io             │  │  Parse          │  │  Invalid                │ │
//! │  │                 │  │  Serialize      │  │  InvalidSequence        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading, validating or saving [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the config file failed.
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML document is malformed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be written out as TOML.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A setting is out of its allowed range.
    #[error("Invalid engine configuration: {0}")]
    Invalid(String),

    /// A bootstrap `[[sequences]]` entry is invalid.
    #[error("Invalid sequence definition '{name}': {reason}")]
    InvalidSequence { name: String, reason: String },

    /// No config path was given and no platform config directory exists.
    #[error("No config path available")]
    NoConfigPath,
}
