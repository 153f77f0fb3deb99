//! # seqgen-db: SQLite Store for Seqgen
//!
//! SQLite implementations of every seqgen-engine store contract, built on
//! sqlx with embedded migrations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Seqgen Data Flow                                 │
//! │                                                                         │
//! │  SequenceEngine::generate("invoice", …)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     seqgen-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  SqliteStore  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  SqliteAudit  │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ sequences     │    │ 001_initial_ │  │   │
//! │  │   │ WAL + busy    │    │ counters, …   │    │ schema.sql   │  │   │
//! │  │   │ timeout       │    │ audit log     │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use seqgen_db::{Database, DbConfig};
//! use seqgen_engine::{EngineConfig, SequenceEngine};
//!
//! let db = Database::new(DbConfig::new("seqgen.db")).await?;
//! let engine = SequenceEngine::new(db.stores(), EngineConfig::load_or_default(None));
//! engine.bootstrap().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::{SqliteAudit, SqliteStore};

// =============================================================================
// Engine Integration Tests
// =============================================================================
