//! Error types for the COVID-19 ETL pipeline.
//!
//! Each stage owns its error enum:
//!
//! - [`LoadError`] - reading and parsing the input CSV
//! - [`PartitionError`] - train/test/validation splitting
//! - [`OutputError`] - writing CSV files
//! - [`PersistError`] - loading the relational store
//! - [`ConfigError`] - invalid configuration values
//! - [`PipelineError`] - top-level orchestration
//!
//! Missing optional columns are not errors: the stage that degrades records a
//! skipped check in the run report instead.

use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Loader Errors
// =============================================================================

/// Errors while loading the input CSV.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Input path does not resolve to a file.
    #[error("Input file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Failed to read the file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported or undecodable character encoding.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// Malformed CSV content.
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Header only, or nothing at all.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No header row could be read.
    #[error("No headers found in CSV")]
    NoHeaders,
}

impl LoadError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

// =============================================================================
// Partition Errors
// =============================================================================

/// Errors while splitting a dataset.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Not enough rows to give every partition at least one row.
    #[error("Insufficient data: {rows} rows cannot fill train/test/validation (need at least {required})")]
    InsufficientData { rows: usize, required: usize },

    /// Proportions outside (0, 1) or not summing to 1.
    #[error("Invalid split proportions: {0}")]
    InvalidProportions(String),
}

// =============================================================================
// Output Errors
// =============================================================================

/// Errors while writing an output file.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Filesystem failure.
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV serialization failure.
    #[error("Failed to write CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// JSON serialization failure.
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

impl OutputError {
    /// Path of the output that failed, when known.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } | Self::Csv { path, .. } => Some(path),
            Self::Json(_) => None,
        }
    }
}

// =============================================================================
// Persistence Errors
// =============================================================================

/// Errors from the relational store.
#[derive(Debug, Error)]
pub enum PersistError {
    /// SQLite failure.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Could not create the database directory.
    #[error("Database IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A column required by the schema is absent.
    #[error("Missing column required for persistence: {0}")]
    MissingColumn(String),

    /// A cell could not be stored in its column.
    #[error("Invalid value in row {row}, column '{column}': {message}")]
    InvalidValue {
        row: usize,
        column: String,
        message: String,
    },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while building the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable or flag has an unusable value.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    /// Split proportions rejected.
    #[error("Invalid split proportions: {0}")]
    InvalidProportions(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// Returned by [`crate::transform::pipeline::Pipeline::run`] for failures that
/// abort the whole run. Load and partition failures are instead surfaced as
/// [`crate::transform::pipeline::RunOutcome::NoData`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Loading error.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Partitioning error.
    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    /// Output error.
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// Persistence error.
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for loading.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for partitioning.
pub type PartitionResult<T> = Result<T, PartitionError>;

/// Result type for file output.
pub type OutputResult<T> = Result<T, OutputError>;

/// Result type for persistence.
pub type PersistResult<T> = Result<T, PersistError>;

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;
