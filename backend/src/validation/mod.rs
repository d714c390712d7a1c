//! Advisory validation of the cleaned dataset.
//!
//! Two independent checks, neither of which removes or corrects rows:
//!
//! - **Outliers**: rows whose `TotalCases` is strictly above the 99th
//!   percentile of the column.
//! - **Consistency**: `TrueConfirmed = TotalDeaths + TotalRecovered + ActiveCases`
//!   is added as a column, and `Anomaly` marks rows where it differs from
//!   `TotalCases`.
//!
//! A check whose columns are absent is reported as skipped.

use crate::models::{Cell, ColumnKind, Dataset, Record};
use crate::report::{RunReport, Stage};
use crate::stats::quantile;
use crate::transform::normalize::{
    ACTIVE_CASES, COUNTRY, TOTAL_CASES, TOTAL_DEATHS, TOTAL_RECOVERED,
};

pub const TRUE_CONFIRMED: &str = "TrueConfirmed";
pub const ANOMALY: &str = "Anomaly";

/// Percentile above which a `TotalCases` value is an outlier.
pub const OUTLIER_QUANTILE: f64 = 0.99;

/// Rows shown in the report for each finding.
const PREVIEW_ROWS: usize = 10;

/// Columns needed by the consistency check.
pub const CONSISTENCY_COLUMNS: [&str; 4] = [TOTAL_CASES, TOTAL_DEATHS, TOTAL_RECOVERED, ACTIVE_CASES];

/// Whether a check ran.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckStatus {
    Ran,
    Skipped { reason: String },
}

impl CheckStatus {
    pub fn ran(&self) -> bool {
        matches!(self, CheckStatus::Ran)
    }
}

/// Outcome of the outlier check.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierReport {
    pub status: CheckStatus,
    pub threshold: Option<f64>,
    /// Row indices, ascending.
    pub rows: Vec<usize>,
}

/// Outcome of the consistency check.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyReport {
    pub status: CheckStatus,
    /// Row indices, ascending.
    pub anomalies: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationSummary {
    pub outliers: OutlierReport,
    pub consistency: ConsistencyReport,
}

/// Run both checks. Adds `TrueConfirmed` and `Anomaly` when the consistency
/// check runs.
pub fn validate(dataset: &mut Dataset, report: &mut RunReport) -> ValidationSummary {
    let outliers = detect_outliers(dataset, report);
    let consistency = check_consistency(dataset, report);
    ValidationSummary {
        outliers,
        consistency,
    }
}

/// Flag rows strictly above the 99th percentile of `TotalCases`.
pub fn detect_outliers(dataset: &Dataset, report: &mut RunReport) -> OutlierReport {
    report.info(Stage::Validate, "Detecting outliers...");

    let values = match dataset.numeric_values(TOTAL_CASES) {
        Some(v) => v,
        None => {
            let reason = format!("no numeric '{}' column", TOTAL_CASES);
            report.skipped(Stage::Validate, format!("outlier detection: {}", reason));
            return OutlierReport {
                status: CheckStatus::Skipped { reason },
                threshold: None,
                rows: Vec::new(),
            };
        }
    };

    let threshold = quantile(&values, OUTLIER_QUANTILE);
    let rows: Vec<usize> = match threshold {
        Some(t) => dataset
            .records()
            .enumerate()
            .filter(|(_, r)| r.number(TOTAL_CASES).is_some_and(|v| v > t))
            .map(|(i, _)| i)
            .collect(),
        None => Vec::new(),
    };

    if let Some(t) = threshold {
        report.info_indent(Stage::Validate, format!("99th percentile of {}: {}", TOTAL_CASES, t), 1);
    }
    if rows.is_empty() {
        report.success(Stage::Validate, "No outliers detected");
    } else {
        report.warning(Stage::Validate, format!("{} outlier(s) detected", rows.len()));
        let columns = [COUNTRY, TOTAL_CASES, TOTAL_DEATHS, TOTAL_RECOVERED, ACTIVE_CASES];
        for &i in rows.iter().take(PREVIEW_ROWS) {
            if let Some(rec) = dataset.record(i) {
                report.info_indent(Stage::Validate, preview(i, &rec, &columns), 1);
            }
        }
    }

    OutlierReport {
        status: CheckStatus::Ran,
        threshold,
        rows,
    }
}

/// Add `TrueConfirmed` and `Anomaly`, reporting rows where the totals disagree.
pub fn check_consistency(dataset: &mut Dataset, report: &mut RunReport) -> ConsistencyReport {
    report.info(Stage::Validate, "Checking consistency of totals...");

    let all_numeric = CONSISTENCY_COLUMNS.iter().all(|name| {
        dataset
            .column_index(name)
            .is_some_and(|i| dataset.columns()[i].kind == ColumnKind::Number)
    });
    if !all_numeric {
        let reason = format!("needs numeric {}", CONSISTENCY_COLUMNS.join(", "));
        report.skipped(Stage::Validate, format!("consistency check: {}", reason));
        return ConsistencyReport {
            status: CheckStatus::Skipped { reason },
            anomalies: Vec::new(),
        };
    }

    let mut true_confirmed = Vec::with_capacity(dataset.len());
    let mut anomaly = Vec::with_capacity(dataset.len());
    let mut anomalies = Vec::new();
    for (i, rec) in dataset.records().enumerate() {
        let parts = (
            rec.number(TOTAL_DEATHS),
            rec.number(TOTAL_RECOVERED),
            rec.number(ACTIVE_CASES),
        );
        let truth = match parts {
            (Some(d), Some(r), Some(a)) => Some(d + r + a),
            _ => None,
        };
        let is_anomaly = rec.number(TOTAL_CASES) != truth;
        if is_anomaly {
            anomalies.push(i);
        }
        true_confirmed.push(truth.map(Cell::Number).unwrap_or(Cell::Missing));
        anomaly.push(Cell::Bool(is_anomaly));
    }

    // Lengths match the row count by construction.
    let added = dataset
        .set_column(TRUE_CONFIRMED, ColumnKind::Number, true_confirmed)
        .and_then(|()| dataset.set_column(ANOMALY, ColumnKind::Bool, anomaly));
    if let Err(e) = added {
        report.error(Stage::Validate, format!("could not add consistency columns: {}", e));
    }

    if anomalies.is_empty() {
        report.success(Stage::Validate, "No anomalies detected");
    } else {
        report.warning(Stage::Validate, format!("{} anomalie(s) detected", anomalies.len()));
        let columns = [TOTAL_CASES, TOTAL_DEATHS, TOTAL_RECOVERED, ACTIVE_CASES, TRUE_CONFIRMED];
        for &i in anomalies.iter().take(PREVIEW_ROWS) {
            if let Some(rec) = dataset.record(i) {
                report.info_indent(Stage::Validate, preview(i, &rec, &columns), 1);
            }
        }
    }

    ConsistencyReport {
        status: CheckStatus::Ran,
        anomalies,
    }
}

fn preview(index: usize, record: &Record<'_>, columns: &[&str]) -> String {
    let fields: Vec<String> = columns
        .iter()
        .filter_map(|name| record.get(name).map(|cell| format!("{}={}", name, cell)))
        .collect();
    format!("row {}: {}", index, fields.join(", "))
}
