//! # Engine Configuration
//!
//! Configuration management for the sequencing services.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SEQGEN_PATTERN_RESOLUTION=static                                   │
//! │     SEQGEN_BULK_MAX_COUNT=500                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/seqgen/engine.toml (Linux)                               │
//! │     ~/Library/Application Support/com.seqgen.engine/engine.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     versioned resolution, 1000 bulk max, discard on release           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # engine.toml
//! pattern_resolution = "versioned"   # versioned | static
//!
//! [bulk]
//! max_count = 1000
//!
//! [reservation]
//! default_ttl_minutes = 30
//! max_ttl_minutes = 1440
//! release_policy = "discard"         # discard | return_to_gaps
//!
//! [exhaustion]
//! check_on_generate = true
//!
//! [[sequences]]
//! name = "invoice"
//! pattern = "INV-{YEAR}-{COUNTER:5}"
//! gap_policy = "fill_eager"
//! overflow_behavior = "switch_pattern"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use seqgen_core::types::SequenceDefinition;
use seqgen_core::validation::validate_definition;

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Pattern Resolution
// =============================================================================

/// Which pattern `generate()` and friends render with.
///
/// ```text
/// VERSIONED (Default)                  │  STATIC
/// ───────────────────                  │  ──────
/// • Active pattern version at `now`    │  • Sequence's own pattern field
/// • Falls back to the sequence pattern │  • Versions are recorded but unused
/// • Migrations take effect             │  • Overflow migrations are skipped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternResolution {
    #[default]
    Versioned,
    Static,
}

impl std::fmt::Display for PatternResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternResolution::Versioned => write!(f, "versioned"),
            PatternResolution::Static => write!(f, "static"),
        }
    }
}

impl std::str::FromStr for PatternResolution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "versioned" => Ok(PatternResolution::Versioned),
            "static" => Ok(PatternResolution::Static),
            other => Err(ConfigError::Invalid(format!(
                "Unknown pattern resolution: '{}'. Valid options: versioned, static",
                other
            ))),
        }
    }
}

// =============================================================================
// Release Policy
// =============================================================================

/// What becomes of reserved numbers that are released or expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePolicy {
    /// The numbers stay consumed and are never issued again.
    #[default]
    Discard,

    /// Each number is recorded as a gap for `FillEager` sequences to reuse.
    ReturnToGaps,
}

impl ReleasePolicy {
    pub fn returns_to_gaps(&self) -> bool {
        matches!(self, ReleasePolicy::ReturnToGaps)
    }
}

impl std::fmt::Display for ReleasePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReleasePolicy::Discard => write!(f, "discard"),
            ReleasePolicy::ReturnToGaps => write!(f, "return_to_gaps"),
        }
    }
}

impl std::str::FromStr for ReleasePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "discard" => Ok(ReleasePolicy::Discard),
            "return_to_gaps" | "gaps" => Ok(ReleasePolicy::ReturnToGaps),
            other => Err(ConfigError::Invalid(format!(
                "Unknown release policy: '{}'. Valid options: discard, return_to_gaps",
                other
            ))),
        }
    }
}

// =============================================================================
// Settings Sections
// =============================================================================

/// Bulk generation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSettings {
    /// Largest `count` accepted by one bulk call.
    #[serde(default = "default_bulk_max")]
    pub max_count: usize,
}

fn default_bulk_max() -> usize {
    1000
}

impl Default for BulkSettings {
    fn default() -> Self {
        BulkSettings {
            max_count: default_bulk_max(),
        }
    }
}

/// Reservation TTLs and release behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSettings {
    /// TTL used when the caller does not pass one.
    #[serde(default = "default_ttl")]
    pub default_ttl_minutes: i64,

    /// Upper bound on caller-supplied TTLs.
    #[serde(default = "default_max_ttl")]
    pub max_ttl_minutes: i64,

    #[serde(default)]
    pub release_policy: ReleasePolicy,
}

fn default_ttl() -> i64 {
    30
}

fn default_max_ttl() -> i64 {
    24 * 60
}

impl Default for ReservationSettings {
    fn default() -> Self {
        ReservationSettings {
            default_ttl_minutes: default_ttl(),
            max_ttl_minutes: default_max_ttl(),
            release_policy: ReleasePolicy::default(),
        }
    }
}

/// Exhaustion monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExhaustionSettings {
    /// Run the exhaustion check before every counter-backed `generate()`.
    #[serde(default = "default_true")]
    pub check_on_generate: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ExhaustionSettings {
    fn default() -> Self {
        ExhaustionSettings {
            check_on_generate: true,
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub pattern_resolution: PatternResolution,

    #[serde(default)]
    pub bulk: BulkSettings,

    #[serde(default)]
    pub reservation: ReservationSettings,

    #[serde(default)]
    pub exhaustion: ExhaustionSettings,

    /// Sequences registered by [`SequenceEngine::bootstrap`](crate::SequenceEngine::bootstrap).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequences: Vec<SequenceDefinition>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document without touching the environment.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.bulk.max_count == 0 {
            return Err(ConfigError::Invalid(
                "bulk.max_count must be greater than 0".into(),
            ));
        }

        if self.reservation.max_ttl_minutes < 1 {
            return Err(ConfigError::Invalid(
                "reservation.max_ttl_minutes must be at least 1".into(),
            ));
        }

        if self.reservation.default_ttl_minutes < 1
            || self.reservation.default_ttl_minutes > self.reservation.max_ttl_minutes
        {
            return Err(ConfigError::Invalid(format!(
                "reservation.default_ttl_minutes must be between 1 and {}",
                self.reservation.max_ttl_minutes
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for def in &self.sequences {
            validate_definition(def).map_err(|e| ConfigError::InvalidSequence {
                name: def.name.clone(),
                reason: e.to_string(),
            })?;

            if !seen.insert((def.name.as_str(), def.scope.as_deref())) {
                return Err(ConfigError::InvalidSequence {
                    name: def.name.clone(),
                    reason: "defined more than once for the same scope".into(),
                });
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("SEQGEN_PATTERN_RESOLUTION") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding pattern resolution from environment");
                    self.pattern_resolution = parsed;
                }
                Err(e) => warn!(mode = %mode, error = %e, "Ignoring pattern resolution from environment"),
            }
        }

        if let Ok(max) = std::env::var("SEQGEN_BULK_MAX_COUNT") {
            if let Ok(n) = max.parse::<usize>() {
                debug!(max_count = n, "Overriding bulk max count from environment");
                self.bulk.max_count = n;
            }
        }

        if let Ok(policy) = std::env::var("SEQGEN_RELEASE_POLICY") {
            match policy.parse() {
                Ok(parsed) => self.reservation.release_policy = parsed,
                Err(e) => warn!(policy = %policy, error = %e, "Ignoring release policy from environment"),
            }
        }

        if let Ok(ttl) = std::env::var("SEQGEN_RESERVATION_TTL_MINUTES") {
            if let Ok(minutes) = ttl.parse::<i64>() {
                self.reservation.default_ttl_minutes = minutes;
            }
        }

        if let Ok(check) = std::env::var("SEQGEN_CHECK_EXHAUSTION") {
            match check.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.exhaustion.check_on_generate = true,
                "0" | "false" | "no" | "off" => self.exhaustion.check_on_generate = false,
                _ => warn!(value = %check, "Unknown SEQGEN_CHECK_EXHAUSTION value"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "seqgen", "engine")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqgen_core::types::{GapPolicy, OverflowBehavior};

    #[test]
    fn test_enum_parsing() {
        assert_eq!(
            "versioned".parse::<PatternResolution>().unwrap(),
            PatternResolution::Versioned
        );
        assert_eq!("STATIC".parse::<PatternResolution>().unwrap(), PatternResolution::Static);
        assert!("latest".parse::<PatternResolution>().is_err());

        assert_eq!(
            "return_to_gaps".parse::<ReleasePolicy>().unwrap(),
            ReleasePolicy::ReturnToGaps
        );
        assert!("keep".parse::<ReleasePolicy>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.pattern_resolution, PatternResolution::Versioned);
        assert_eq!(config.bulk.max_count, 1000);
        assert_eq!(config.reservation.default_ttl_minutes, 30);
        assert_eq!(config.reservation.release_policy, ReleasePolicy::Discard);
        assert!(config.exhaustion.check_on_generate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_with_sequences() {
        let config = EngineConfig::from_toml(
            r#"
            pattern_resolution = "static"

            [reservation]
            release_policy = "return_to_gaps"

            [[sequences]]
            name = "invoice"
            pattern = "INV-{YEAR}-{COUNTER:5}"
            gap_policy = "fill_eager"
            overflow_behavior = "switch_pattern"

            [[sequences]]
            name = "grn"
            scope = "branch-7"
            pattern = "GRN-{COUNTER:6}"
            step = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.pattern_resolution, PatternResolution::Static);
        assert_eq!(config.reservation.release_policy, ReleasePolicy::ReturnToGaps);
        assert_eq!(config.reservation.max_ttl_minutes, 1440);
        assert_eq!(config.sequences.len(), 2);
        assert_eq!(config.sequences[0].gap_policy, GapPolicy::FillEager);
        assert_eq!(
            config.sequences[0].overflow_behavior,
            OverflowBehavior::SwitchPattern
        );
        assert_eq!(config.sequences[1].scope.as_deref(), Some("branch-7"));
        assert_eq!(config.sequences[1].step, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.bulk.max_count = 0;
        assert!(config.validate().is_err());
        config.bulk.max_count = 10;

        config.reservation.default_ttl_minutes = 5000;
        assert!(config.validate().is_err());
        config.reservation.default_ttl_minutes = 30;

        config
            .sequences
            .push(SequenceDefinition::new("invoice", "INV-{COUNTER"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSequence { .. })
        ));

        config.sequences = vec![
            SequenceDefinition::new("invoice", "INV-{COUNTER}"),
            SequenceDefinition::new("invoice", "INV2-{COUNTER}"),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.toml");

        let mut config = EngineConfig::default();
        config.bulk.max_count = 250;
        config.reservation.release_policy = ReleasePolicy::ReturnToGaps;
        config.sequences.push(
            SequenceDefinition::new("invoice", "INV-{YEAR}-{COUNTER:5}")
                .gap_policy(GapPolicy::FillEager),
        );
        config.save(Some(path.clone())).unwrap();
        assert!(path.exists());

        let loaded = EngineConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.bulk.max_count, 250);
        assert_eq!(loaded.reservation.release_policy, ReleasePolicy::ReturnToGaps);
        assert_eq!(loaded.sequences.len(), 1);
        assert_eq!(loaded.sequences[0].pattern, "INV-{YEAR}-{COUNTER:5}");
        assert_eq!(loaded.sequences[0].gap_policy, GapPolicy::FillEager);
    }

    #[test]
    fn test_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[bulk]"));
        assert!(toml_str.contains("[reservation]"));
    }
}
