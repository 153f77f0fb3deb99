//! # seqgen-core: Pure Sequencing Logic
//!
//! Domain types and rules for minting pattern-based document numbers
//! (invoice, PO, GRN). Everything here is deterministic and free of I/O;
//! storage and orchestration live in `seqgen-engine` and `seqgen-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Seqgen Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Caller (HTTP / CLI / batch job, not here)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 seqgen-engine (services)                        │   │
//! │  │   SequenceManager, Bulk, Reservations, Gaps, Versions, ...      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ seqgen-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐          │   │
//! │  │   │ pattern  │ │ counter  │ │ version  │ │migration │          │   │
//! │  │   │ parser   │ │  rules   │ │  ranges  │ │ patterns │          │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘          │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐          │   │
//! │  │   │ capacity │ │collision │ │validation│ │  types   │          │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS • PURE FUNCTIONS       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 seqgen-db (SQLite stores)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Sequence, counter, gap, reservation and version types
//! - [`pattern`] - `{NAME[:PADDING]}` template parser and renderer
//! - [`counter`] - Reset and override rules
//! - [`version`] - Effective-range checks for pattern versions
//! - [`migration`] - Suffix and padding migration patterns
//! - [`capacity`] - Max value, utilization, risk score
//! - [`collision`] - Structural collision heuristic
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use std::collections::HashMap;
//! use chrono::NaiveDate;
//! use seqgen_core::{capacity, pattern};
//!
//! let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
//! let number = pattern::parse("INV-{YEAR}-{COUNTER:5}", 42, &HashMap::new(), date).unwrap();
//! assert_eq!(number, "INV-2024-00042");
//!
//! assert_eq!(capacity::calculate_max_value("INV-{COUNTER:4}").unwrap(), 9999);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod capacity;
pub mod collision;
pub mod counter;
pub mod error;
pub mod migration;
pub mod pattern;
pub mod types;
pub mod validation;
pub mod version;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use capacity::ExhaustionStatus;
pub use error::{SequenceError, SequenceResult, ValidationError};
pub use migration::MigrationStrategy;
pub use pattern::{Pattern, PatternVariable, VariableContext};
pub use types::*;
