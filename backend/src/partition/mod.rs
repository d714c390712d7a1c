//! Reproducible train/test/validation split.
//!
//! Two-stage split, train first:
//!
//! ```text
//! rows ── shuffle(seed) ──┬── train     (n - holdout)
//!                         └── holdout   ceil(n * (test + validation))
//!                               └─ shuffle(seed) ──┬── validation  ceil(holdout * share)
//!                                                  └── test        (rest)
//! ```
//!
//! The input dataset is only read; each partition is a new dataset.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::SplitConfig;
use crate::error::{OutputError, PartitionError, PartitionResult};
use crate::export::write_csv;
use crate::models::Dataset;
use crate::report::{RunReport, Stage};

pub const TRAIN_FILE: &str = "train.csv";
pub const TEST_FILE: &str = "test.csv";
pub const VALIDATION_FILE: &str = "validation.csv";

/// Slack subtracted before rounding up, so 0.1 + 0.2 does not cost a row.
const CEIL_TOLERANCE: f64 = 1e-9;

/// Upper bound when searching for the smallest feasible dataset.
const MAX_MINIMUM_SEARCH: usize = 100_000;

/// Row counts of the three partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSizes {
    pub train: usize,
    pub test: usize,
    pub validation: usize,
}

impl SplitSizes {
    pub fn total(&self) -> usize {
        self.train + self.test + self.validation
    }

    fn all_non_empty(&self) -> bool {
        self.train > 0 && self.test > 0 && self.validation > 0
    }
}

fn ceil_tolerant(x: f64) -> usize {
    (x - CEIL_TOLERANCE).ceil().max(0.0) as usize
}

fn raw_sizes(rows: usize, config: &SplitConfig) -> SplitSizes {
    let holdout = ceil_tolerant(rows as f64 * config.holdout_fraction()).min(rows);
    let validation = ceil_tolerant(holdout as f64 * config.validation_fraction_of_holdout()).min(holdout);
    SplitSizes {
        train: rows - holdout,
        test: holdout - validation,
        validation,
    }
}

/// Smallest row count that gives every partition at least one row.
pub fn minimum_rows(config: &SplitConfig) -> usize {
    (3..=MAX_MINIMUM_SEARCH)
        .find(|&n| raw_sizes(n, config).all_non_empty())
        .unwrap_or(MAX_MINIMUM_SEARCH)
}

/// Partition sizes for `rows` rows.
///
/// Fails with [`PartitionError::InsufficientData`] when a partition would be empty.
pub fn split_sizes(rows: usize, config: &SplitConfig) -> PartitionResult<SplitSizes> {
    config
        .validate()
        .map_err(|e| PartitionError::InvalidProportions(e.to_string()))?;

    let sizes = raw_sizes(rows, config);
    if !sizes.all_non_empty() {
        return Err(PartitionError::InsufficientData {
            rows,
            required: minimum_rows(config),
        });
    }
    Ok(sizes)
}

/// Row indices (into the input) of each partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Seeded permutation of `0..rows`, cut into train/test/validation.
pub fn split_indices(rows: usize, config: &SplitConfig) -> PartitionResult<SplitIndices> {
    let sizes = split_sizes(rows, config)?;

    let mut order: Vec<usize> = (0..rows).collect();
    order.shuffle(&mut StdRng::seed_from_u64(config.seed));
    let holdout_len = sizes.test + sizes.validation;
    let (holdout, train) = order.split_at(holdout_len);

    let mut holdout = holdout.to_vec();
    holdout.shuffle(&mut StdRng::seed_from_u64(config.seed));
    let (validation, test) = holdout.split_at(sizes.validation);

    Ok(SplitIndices {
        train: train.to_vec(),
        test: test.to_vec(),
        validation: validation.to_vec(),
    })
}

/// The three partitions of one dataset.
#[derive(Debug, Clone)]
pub struct Splits {
    pub train: Dataset,
    pub test: Dataset,
    pub validation: Dataset,
    pub indices: SplitIndices,
}

impl Splits {
    pub fn sizes(&self) -> SplitSizes {
        SplitSizes {
            train: self.train.len(),
            test: self.test.len(),
            validation: self.validation.len(),
        }
    }

    /// `(file name, dataset)` in write order.
    pub fn named(&self) -> [(&'static str, &Dataset); 3] {
        [
            (TRAIN_FILE, &self.train),
            (TEST_FILE, &self.test),
            (VALIDATION_FILE, &self.validation),
        ]
    }
}

/// Split `dataset` without writing anything.
pub fn split(dataset: &Dataset, config: &SplitConfig) -> PartitionResult<Splits> {
    let indices = split_indices(dataset.len(), config)?;
    Ok(Splits {
        train: dataset.select_rows(&indices.train),
        test: dataset.select_rows(&indices.test),
        validation: dataset.select_rows(&indices.validation),
        indices,
    })
}

/// Post-conditions of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitCheck {
    pub complete: bool,
    pub disjoint: bool,
}

impl SplitCheck {
    pub fn ok(&self) -> bool {
        self.complete && self.disjoint
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Report sizes and proportions, and verify completeness and disjointness.
pub fn validate_splits(splits: &Splits, input_rows: usize, report: &mut RunReport) -> SplitCheck {
    let sizes = splits.sizes();
    let total = sizes.total();

    report.info(Stage::Partition, "Checking proportions:");
    report.info_indent(Stage::Partition, format!("Total: {}", total), 1);
    for (name, len) in [
        ("Train", sizes.train),
        ("Test", sizes.test),
        ("Validation", sizes.validation),
    ] {
        report.info_indent(
            Stage::Partition,
            format!("{}: {} ({}%)", name, len, percent(len, total)),
            1,
        );
    }

    let complete = total == input_rows;
    if complete {
        report.success(Stage::Partition, format!("{} + {} + {} = {} rows", sizes.train, sizes.test, sizes.validation, input_rows));
    } else {
        report.error(
            Stage::Partition,
            format!("Partitions hold {} rows, input has {}", total, input_rows),
        );
    }

    let mut seen = HashSet::with_capacity(total);
    let disjoint = splits
        .indices
        .train
        .iter()
        .chain(&splits.indices.test)
        .chain(&splits.indices.validation)
        .all(|i| seen.insert(*i));
    if !disjoint {
        report.error(Stage::Partition, "A row appears in more than one partition");
    }

    SplitCheck { complete, disjoint }
}

/// Outcome of writing one partition file.
#[derive(Debug)]
pub struct WrittenPartition {
    pub path: PathBuf,
    pub result: Result<(), OutputError>,
}

/// Write each partition to `output_dir`. A failed file does not stop the others.
pub fn write_splits(splits: &Splits, output_dir: &Path, report: &mut RunReport) -> Vec<WrittenPartition> {
    splits
        .named()
        .into_iter()
        .map(|(file, dataset)| {
            let path = output_dir.join(file);
            let result = write_csv(dataset, &path);
            match &result {
                Ok(()) => report.success(
                    Stage::Partition,
                    format!("{} rows written to {}", dataset.len(), path.display()),
                ),
                Err(e) => report.error(Stage::Partition, e.to_string()),
            }
            WrittenPartition { path, result }
        })
        .collect()
}

/// Split, check and write. Returns the partitions and any write failures.
pub fn partition(
    dataset: &Dataset,
    config: &SplitConfig,
    output_dir: &Path,
    report: &mut RunReport,
) -> PartitionResult<(Splits, Vec<OutputError>)> {
    report.info(
        Stage::Partition,
        format!(
            "Splitting {} rows into {:.0}% / {:.0}% / {:.0}% (seed {})",
            dataset.len(),
            config.train * 100.0,
            config.test * 100.0,
            config.validation * 100.0,
            config.seed
        ),
    );

    let splits = match split(dataset, config) {
        Ok(s) => s,
        Err(e) => {
            report.error(Stage::Partition, e.to_string());
            return Err(e);
        }
    };
    validate_splits(&splits, dataset.len(), report);

    let failures = write_splits(&splits, output_dir, report)
        .into_iter()
        .filter_map(|w| w.result.err())
        .collect();

    Ok((splits, failures))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cell, Column, ColumnKind};
    use tempfile::tempdir;

    fn numbered(rows: usize) -> Dataset {
        let mut ds = Dataset::new(vec![Column::new("id", ColumnKind::Number)]).unwrap();
        for i in 0..rows {
            ds.push_row(vec![Cell::Number(i as f64)]).unwrap();
        }
        ds
    }

    fn ids(ds: &Dataset) -> Vec<usize> {
        ds.rows().iter().map(|r| r[0].as_f64().unwrap() as usize).collect()
    }

    #[test]
    fn test_thousand_rows_sizes() {
        let sizes = split_sizes(1000, &SplitConfig::default()).unwrap();
        assert_eq!(sizes.train, 700);
        assert_eq!(sizes.test, 200);
        assert_eq!(sizes.validation, 100);
        assert_eq!(sizes.total(), 1000);
    }

    #[test]
    fn test_partitions_cover_input_disjointly() {
        let ds = numbered(137);
        let splits = split(&ds, &SplitConfig::default()).unwrap();

        let mut all: Vec<usize> = ids(&splits.train)
            .into_iter()
            .chain(ids(&splits.test))
            .chain(ids(&splits.validation))
            .collect();
        assert_eq!(all.len(), 137);
        all.sort_unstable();
        assert_eq!(all, (0..137).collect::<Vec<_>>());

        let mut report = RunReport::new();
        assert!(validate_splits(&splits, 137, &mut report).ok());
    }

    #[test]
    fn test_same_seed_same_partitions() {
        let ds = numbered(250);
        let config = SplitConfig::default();
        let a = split(&ds, &config).unwrap();
        let b = split(&ds, &config).unwrap();
        assert_eq!(a.indices, b.indices);
        assert_eq!(a.train, b.train);
        assert_eq!(a.validation, b.validation);
    }

    #[test]
    fn test_different_seed_differs() {
        let ds = numbered(250);
        let a = split(&ds, &SplitConfig::default()).unwrap();
        let b = split(
            &ds,
            &SplitConfig {
                seed: 7,
                ..SplitConfig::default()
            },
        )
        .unwrap();
        assert_ne!(a.indices.train, b.indices.train);
    }

    #[test]
    fn test_input_is_untouched() {
        let ds = numbered(20);
        let before = ds.clone();
        let _ = split(&ds, &SplitConfig::default()).unwrap();
        assert_eq!(ds, before);
    }

    #[test]
    fn test_insufficient_data() {
        let config = SplitConfig::default();
        for rows in [0, 1, 2, 3] {
            match split_sizes(rows, &config) {
                Err(PartitionError::InsufficientData { rows: r, required }) => {
                    assert_eq!(r, rows);
                    assert_eq!(required, 4);
                }
                other => panic!("expected InsufficientData for {rows} rows, got {other:?}"),
            }
        }
        let sizes = split_sizes(4, &config).unwrap();
        assert_eq!(sizes, SplitSizes { train: 2, test: 1, validation: 1 });
    }

    #[test]
    fn test_invalid_proportions_rejected() {
        let config = SplitConfig {
            train: 0.5,
            test: 0.2,
            validation: 0.1,
            seed: 42,
        };
        assert!(matches!(
            split_sizes(100, &config),
            Err(PartitionError::InvalidProportions(_))
        ));
    }

    #[test]
    fn test_partition_writes_three_files() {
        let dir = tempdir().unwrap();
        let ds = numbered(50);
        let mut report = RunReport::new();
        let (splits, failures) =
            partition(&ds, &SplitConfig::default(), dir.path(), &mut report).unwrap();

        assert!(failures.is_empty());
        for (file, part) in splits.named() {
            let content = std::fs::read_to_string(dir.path().join(file)).unwrap();
            assert_eq!(content.lines().count(), part.len() + 1);
            assert_eq!(content.lines().next(), Some("id"));
        }
    }

    #[test]
    fn test_write_failure_does_not_stop_other_files() {
        let dir = tempdir().unwrap();
        // A directory named like the test file blocks that one write.
        std::fs::create_dir(dir.path().join(TEST_FILE)).unwrap();

        let ds = numbered(50);
        let mut report = RunReport::new();
        let (_, failures) =
            partition(&ds, &SplitConfig::default(), dir.path(), &mut report).unwrap();

        assert_eq!(failures.len(), 1);
        assert!(dir.path().join(TRAIN_FILE).is_file());
        assert!(dir.path().join(VALIDATION_FILE).is_file());
    }
}
