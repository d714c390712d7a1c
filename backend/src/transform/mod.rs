//! Transformation module.
//!
//! This module turns the raw dataset into the cleaned one:
//! - Normalize: legacy headers to the canonical schema
//! - Clean: imputation, derived metrics, deduplication
//! - Pipeline: every stage in order, plus the partial runs used by the CLI

pub mod clean;
pub mod normalize;
pub mod pipeline;

pub use clean::{clean, CleanSummary, MissingColumn};
pub use normalize::{canonical_name, normalize, NormalizeSummary, COLUMN_MAPPING};
pub use pipeline::*;
