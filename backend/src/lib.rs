//! # covid-etl - batch ETL for the COVID-19 daily dataset
//!
//! Reads the public per-country daily CSV, brings it to a canonical schema,
//! cleans and validates it, splits it into reproducible train/test/validation
//! files and can load it into a relational store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────┐   ┌──────────┐   ┌───────────┐   ┌─────────┐
//! │ CSV File │──▶│ Normalize │──▶│ Clean │──▶│ Validate │──▶│ Partition │──▶│ Persist │
//! │ (Latin1) │   │ (rename)  │   │       │   │(advisory)│   │ (seeded)  │   │ (SQLite)│
//! └──────────┘   └───────────┘   └───────┘   └──────────┘   └───────────┘   └─────────┘
//!                      observers run after each stage, read-only
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use covid_etl::{Pipeline, PipelineConfig, RunOutcome};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut pipeline = Pipeline::new(PipelineConfig::from_env()?).with_default_observers();
//!     if let RunOutcome::Completed(artifacts) = pipeline.run()? {
//!         println!("{} rows in the training split", artifacts.splits.train.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per stage
//! - [`config`] - Paths, encoding and split settings from the environment
//! - [`models`] - Typed dataset (columns, cells, records)
//! - [`parser`] - CSV loading with encoding and delimiter handling
//! - [`transform`] - Normalizer, cleaner and the pipeline
//! - [`validation`] - Outlier and consistency checks
//! - [`partition`] - Seeded train/test/validation split
//! - [`export`] - CSV output
//! - [`persist`] - SQLite store
//! - [`observe`] - Read-only stage observers
//! - [`report`] - Per-run stage report

// Core modules
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod report;
pub mod stats;

// Loading and output
pub mod export;
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Partitioning
pub mod partition;

// Persistence
pub mod persist;

// Observers
pub mod observe;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, LoadError, OutputError, PartitionError, PersistError, PipelineError,
    PipelineResult,
};

// =============================================================================
// Re-exports - Configuration & Logging
// =============================================================================

pub use config::{PipelineConfig, SourceEncoding, SplitConfig};
pub use logging::init_logging;

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Cell, Column, ColumnKind, Dataset, Record};

// =============================================================================
// Re-exports - CSV Loading & Output
// =============================================================================

pub use export::write_csv;
pub use parser::{detect_delimiter, detect_encoding, load_csv, parse_bytes, LoadedCsv};

// =============================================================================
// Re-exports - Stages
// =============================================================================

pub use partition::{split, Splits};
pub use transform::{clean, normalize, CleanSummary, NormalizeSummary};
pub use validation::{validate, ValidationSummary};

// =============================================================================
// Re-exports - Persistence
// =============================================================================

pub use persist::{PersistSummary, Persister, SqlitePersister};

// =============================================================================
// Re-exports - Observers & Report
// =============================================================================

pub use observe::{CorrelationObserver, MissingValuesObserver, ProfileObserver, StageObserver};
pub use report::{LogLevel, RunReport, Stage};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{Outcome, Pipeline, Prepared, RunArtifacts, RunOutcome};
