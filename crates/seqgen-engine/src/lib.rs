//! # seqgen-engine: Sequencing Services
//!
//! Runs the pure rules of `seqgen-core` against injected stores and an
//! audit sink.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SequenceEngine                                 │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────────┐  │
//! │  │ SequenceManager  │  │ BulkGenerator    │  │ ReservationService   │  │
//! │  │ generate/preview │  │ one lock per run │  │ TTL holds, sweep     │  │
//! │  └────────┬─────────┘  └────────┬─────────┘  └──────────┬───────────┘  │
//! │           │                     │                       │              │
//! │  ┌────────▼─────────────────────▼───────────────────────▼───────────┐  │
//! │  │                     Stores (Arc<dyn …>)                          │  │
//! │  │  sequences · counters · gaps · reservations · versions · audit    │  │
//! │  └────────┬─────────────────────────────────────────┬───────────────┘  │
//! │           ▼                                         ▼                  │
//! │     MemoryStore (this crate)              SqliteStore (seqgen-db)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`audit`] - Audit events and sinks
//! - [`config`] - Engine configuration (TOML + environment)
//! - [`engine`] - The [`SequenceEngine`] facade
//! - [`error`] - Configuration errors
//! - [`services`] - One service per concern
//! - [`store`] - Store contracts and the in-memory backend
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use seqgen_engine::{EngineConfig, SequenceEngine, Stores};
//!
//! let engine = SequenceEngine::new(Stores::in_memory(), EngineConfig::load_or_default(None));
//! engine.bootstrap().await?;
//!
//! let mut context = HashMap::new();
//! context.insert("BRANCH".to_string(), "KHI".to_string());
//! let number = engine.generate("grn", Some("branch-7"), &context).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod services;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use audit::{AuditEntry, AuditEvent, RecordingAudit, SequenceAudit, TracingAudit};
pub use config::{
    BulkSettings, EngineConfig, ExhaustionSettings, PatternResolution, ReleasePolicy,
    ReservationSettings,
};
pub use engine::SequenceEngine;
pub use error::{ConfigError, ConfigResult};
pub use services::{SequenceMetrics, SequenceMetricsService};
pub use store::{
    CounterGuard, CounterStore, GapStore, MemoryStore, PatternVersionStore, ReservationStore,
    SequenceStore, Stores,
};
