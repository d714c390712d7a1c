//! Cleaning: impute missing cells, recompute derived metrics, deduplicate.
//!
//! Order is fixed: imputation runs first so no missing value reaches the
//! `ActiveCases` arithmetic, and deduplication runs last so rows that only
//! became identical after recomputation collapse too.

use std::collections::HashSet;

use crate::models::{Cell, ColumnKind, Dataset};
use crate::report::{RunReport, Stage};

use super::normalize::{ACTIVE_CASES, TOTAL_CASES, TOTAL_DEATHS, TOTAL_RECOVERED};

/// Columns `ActiveCases` is derived from.
pub const ACTIVE_INPUTS: [&str; 3] = [TOTAL_CASES, TOTAL_DEATHS, TOTAL_RECOVERED];

/// Missing cells found in one column before imputation.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingColumn {
    pub name: String,
    pub count: usize,
    /// Share of rows, in percent, rounded to 2 decimals.
    pub percent: f64,
}

/// What the cleaner changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanSummary {
    pub missing: Vec<MissingColumn>,
    pub filled: usize,
    pub active_recomputed: bool,
    pub duplicates_removed: usize,
}

/// Run the three cleaning steps in place.
pub fn clean(dataset: &mut Dataset, report: &mut RunReport) -> CleanSummary {
    let mut summary = CleanSummary::default();

    report.info(Stage::Clean, "Handling missing values...");
    summary.missing = missing_columns(dataset);
    if summary.missing.is_empty() {
        report.success(Stage::Clean, "No missing values");
    } else {
        for m in &summary.missing {
            report.info_indent(
                Stage::Clean,
                format!("{}: {} missing ({:.2}%)", m.name, m.count, m.percent),
                1,
            );
        }
    }
    summary.filled = fill_missing(dataset);
    if summary.filled > 0 {
        report.success(Stage::Clean, format!("Filled {} missing cells", summary.filled));
    }

    summary.active_recomputed = recompute_active(dataset);
    if summary.active_recomputed {
        report.success(
            Stage::Clean,
            format!("Recomputed '{}' = {} - {} - {}", ACTIVE_CASES, TOTAL_CASES, TOTAL_DEATHS, TOTAL_RECOVERED),
        );
    } else {
        report.skipped(
            Stage::Clean,
            format!(
                "'{}' not recomputed: needs numeric {}",
                ACTIVE_CASES,
                ACTIVE_INPUTS.join(", ")
            ),
        );
    }

    report.info(Stage::Clean, "Removing duplicates...");
    summary.duplicates_removed = remove_duplicates(dataset);
    report.success(
        Stage::Clean,
        format!("{} duplicate(s) removed, {} rows left", summary.duplicates_removed, dataset.len()),
    );

    summary
}

/// Columns with at least one missing cell.
pub fn missing_columns(dataset: &Dataset) -> Vec<MissingColumn> {
    let rows = dataset.len();
    dataset
        .missing_counts()
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(name, count)| MissingColumn {
            name: name.to_string(),
            count,
            percent: round2(count as f64 * 100.0 / rows as f64),
        })
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Replace every missing cell with its column kind's zero value.
///
/// Returns how many cells were filled.
pub fn fill_missing(dataset: &mut Dataset) -> usize {
    let zeros: Vec<Cell> = dataset.columns().iter().map(|c| c.kind.zero()).collect();
    let mut filled = 0;
    for row in dataset.rows_mut() {
        for (cell, zero) in row.iter_mut().zip(&zeros) {
            if cell.is_missing() {
                *cell = zero.clone();
                filled += 1;
            }
        }
    }
    filled
}

/// `ActiveCases = TotalCases - TotalDeaths - TotalRecovered`, adding the column
/// if absent. Returns false, leaving the dataset untouched, when an input
/// column is absent or not numeric.
pub fn recompute_active(dataset: &mut Dataset) -> bool {
    let mut indices = [0usize; 3];
    for (slot, name) in indices.iter_mut().zip(ACTIVE_INPUTS) {
        match dataset.column_index(name) {
            Some(idx) if dataset.columns()[idx].kind == ColumnKind::Number => *slot = idx,
            _ => return false,
        }
    }

    let active: Vec<Cell> = dataset
        .rows()
        .iter()
        .map(|row| {
            let [cases, deaths, recovered] = indices.map(|i| row[i].as_f64());
            match (cases, deaths, recovered) {
                (Some(c), Some(d), Some(r)) => Cell::Number(c - d - r),
                _ => Cell::Missing,
            }
        })
        .collect();

    dataset
        .set_column(ACTIVE_CASES, ColumnKind::Number, active)
        .is_ok()
}

/// Drop rows identical to an earlier row across every column.
///
/// Keeps the first occurrence and the relative order of survivors.
pub fn remove_duplicates(dataset: &mut Dataset) -> usize {
    let before = dataset.len();
    let mut seen: HashSet<Vec<Cell>> = HashSet::with_capacity(before);
    dataset.retain_rows(|row| seen.insert(row.to_vec()));
    before - dataset.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Column;

    fn metrics(rows: &[(&str, Option<f64>, Option<f64>, Option<f64>)]) -> Dataset {
        let mut ds = Dataset::new(vec![
            Column::new("Country/Region", ColumnKind::Text),
            Column::new(TOTAL_CASES, ColumnKind::Number),
            Column::new(TOTAL_DEATHS, ColumnKind::Number),
            Column::new(TOTAL_RECOVERED, ColumnKind::Number),
        ])
        .unwrap();
        for (country, c, d, r) in rows {
            let num = |v: &Option<f64>| v.map(Cell::Number).unwrap_or(Cell::Missing);
            ds.push_row(vec![Cell::Text(country.to_string()), num(c), num(d), num(r)])
                .unwrap();
        }
        ds
    }

    #[test]
    fn test_active_cases_recomputed() {
        let mut ds = metrics(&[("France", Some(10.0), Some(2.0), Some(3.0))]);
        let mut report = RunReport::new();
        let summary = clean(&mut ds, &mut report);

        assert!(summary.active_recomputed);
        assert_eq!(ds.record(0).unwrap().number(ACTIVE_CASES), Some(5.0));
    }

    #[test]
    fn test_missing_total_cases_becomes_zero() {
        let mut ds = metrics(&[("Italy", None, Some(2.0), Some(3.0))]);
        let mut report = RunReport::new();
        let summary = clean(&mut ds, &mut report);

        let rec = ds.record(0).unwrap();
        assert_eq!(rec.number(TOTAL_CASES), Some(0.0));
        assert_eq!(rec.number(ACTIVE_CASES), Some(-5.0));
        assert_eq!(summary.filled, 1);
        assert_eq!(summary.missing[0].name, TOTAL_CASES);
        assert_eq!(summary.missing[0].percent, 100.0);
    }

    #[test]
    fn test_no_missing_cells_after_clean() {
        let mut ds = Dataset::new(vec![
            Column::new("t", ColumnKind::Text),
            Column::new("n", ColumnKind::Number),
            Column::new("b", ColumnKind::Bool),
            Column::new("d", ColumnKind::Date),
        ])
        .unwrap();
        ds.push_row(vec![Cell::Missing; 4]).unwrap();
        let mut report = RunReport::new();
        clean(&mut ds, &mut report);

        assert!(ds.rows().iter().flatten().all(|c| !c.is_missing()));
        assert_eq!(ds.rows()[0][0], Cell::Text(String::new()));
        assert_eq!(ds.rows()[0][1], Cell::Number(0.0));
    }

    #[test]
    fn test_missing_input_column_degrades() {
        let mut ds = Dataset::new(vec![
            Column::new(TOTAL_CASES, ColumnKind::Number),
            Column::new(TOTAL_DEATHS, ColumnKind::Number),
        ])
        .unwrap();
        ds.push_row(vec![Cell::Number(4.0), Cell::Number(1.0)]).unwrap();
        let mut report = RunReport::new();
        let summary = clean(&mut ds, &mut report);

        assert!(!summary.active_recomputed);
        assert!(!ds.has_column(ACTIVE_CASES));
        assert!(report.has_skipped(Stage::Clean));
    }

    #[test]
    fn test_duplicates_removed_keep_first_and_order() {
        let mut ds = metrics(&[
            ("A", Some(1.0), Some(0.0), Some(0.0)),
            ("B", Some(2.0), Some(0.0), Some(0.0)),
            ("A", Some(1.0), Some(0.0), Some(0.0)),
            ("C", Some(3.0), Some(0.0), Some(0.0)),
            ("B", Some(2.0), Some(0.0), Some(0.0)),
        ]);
        let mut report = RunReport::new();
        let summary = clean(&mut ds, &mut report);

        assert_eq!(summary.duplicates_removed, 2);
        let countries: Vec<&str> = ds.records().filter_map(|r| r.text("Country/Region")).collect();
        assert_eq!(countries, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_rows_identical_after_imputation_collapse() {
        let mut ds = metrics(&[
            ("A", None, Some(0.0), Some(0.0)),
            ("A", Some(0.0), Some(0.0), Some(0.0)),
        ]);
        let mut report = RunReport::new();
        let summary = clean(&mut ds, &mut report);

        assert_eq!(summary.duplicates_removed, 1);
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn test_existing_active_column_overwritten() {
        let mut ds = metrics(&[("A", Some(10.0), Some(1.0), Some(1.0))]);
        ds.set_column(ACTIVE_CASES, ColumnKind::Number, vec![Cell::Number(999.0)])
            .unwrap();
        assert!(recompute_active(&mut ds));
        assert_eq!(ds.record(0).unwrap().number(ACTIVE_CASES), Some(8.0));
        assert_eq!(ds.width(), 5);
    }
}
