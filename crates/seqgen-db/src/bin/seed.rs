//! # Sequence Seeder
//!
//! Registers sequence definitions in a database for development.
//!
//! ## Usage
//! ```bash
//! # Demo definitions into ./seqgen_dev.db (default)
//! cargo run -p seqgen-db --bin seed
//!
//! # Definitions from an engine.toml `[[sequences]]` list
//! cargo run -p seqgen-db --bin seed -- --config ./engine.toml
//!
//! # Specify database path and print the next number of each sequence
//! cargo run -p seqgen-db --bin seed -- --db ./data/seqgen.db --preview
//! ```
//!
//! Existing definitions are left untouched, so the seeder can run on every
//! start.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use seqgen_core::types::{GapPolicy, ResetPeriod, SequenceDefinition};
use seqgen_db::{Database, DbConfig};
use seqgen_engine::{EngineConfig, SequenceEngine};

/// Definitions used when the configuration lists none.
fn demo_sequences() -> Vec<SequenceDefinition> {
    vec![
        SequenceDefinition::new("invoice", "INV-{YEAR}-{COUNTER:5}")
            .gap_policy(GapPolicy::FillEager)
            .reset_period(ResetPeriod::Yearly),
        SequenceDefinition::new("purchase_order", "PO-{YY}{MONTH}-{COUNTER:4}")
            .reset_period(ResetPeriod::Monthly),
        SequenceDefinition::new("grn", "GRN-{BRANCH}-{COUNTER:6}").scope("main"),
        SequenceDefinition::new("ticket", "T{COUNTER:3}").reset_limit(999),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./seqgen_dev.db");
    let mut config_path: Option<PathBuf> = None;
    let mut preview = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--preview" | "-p" => preview = true,
            "--help" | "-h" => {
                println!("Seqgen Sequence Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>      Database file path (default: ./seqgen_dev.db)");
                println!("  -c, --config <PATH>  Engine config with [[sequences]] to register");
                println!("  -p, --preview        Print the next number of each sequence");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => EngineConfig::load(Some(path.clone()))
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::load_or_default(None),
    };
    if config.sequences.is_empty() {
        config.sequences = demo_sequences();
    }

    println!("Seqgen Sequence Seeder");
    println!("======================");
    println!("Database:  {}", db_path);
    println!("Sequences: {}", config.sequences.len());
    println!();

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .context("opening database")?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let engine = SequenceEngine::new(db.stores(), config);
    let created = engine.bootstrap().await.context("registering sequences")?;
    println!("✓ Registered {} new sequence(s)", created);
    println!();

    let context: HashMap<String, String> =
        HashMap::from([("BRANCH".to_string(), "MAIN".to_string())]);

    for sequence in engine.list_sequences().await? {
        let scope = sequence.scope.as_deref().unwrap_or("-");
        if preview {
            let next = engine
                .preview(&sequence.name, sequence.scope.as_deref(), &context)
                .await
                .with_context(|| format!("previewing {}", sequence.name))?;
            println!("  {:<16} {:<8} {:<28} next: {}", sequence.name, scope, sequence.pattern, next);
        } else {
            println!("  {:<16} {:<8} {}", sequence.name, scope, sequence.pattern);
        }
    }

    db.close().await;
    println!();
    println!("✓ Seed complete!");

    Ok(())
}
