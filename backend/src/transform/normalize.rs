//! Column normalization: legacy header names to the canonical schema.
//!
//! ```text
//! Confirmed  → TotalCases        Lat  ┐
//! Deaths     → TotalDeaths       Long ┘ dropped
//! Recovered  → TotalRecovered
//! Active     → ActiveCases       anything else passes through
//! New cases  → NewCases
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Cell, ColumnKind, Dataset};
use crate::report::{RunReport, Stage};

pub const TOTAL_CASES: &str = "TotalCases";
pub const TOTAL_DEATHS: &str = "TotalDeaths";
pub const TOTAL_RECOVERED: &str = "TotalRecovered";
pub const ACTIVE_CASES: &str = "ActiveCases";
pub const NEW_CASES: &str = "NewCases";
pub const NEW_DEATHS: &str = "NewDeaths";
pub const NEW_RECOVERED: &str = "NewRecovered";
pub const COUNTRY: &str = "Country/Region";
pub const WHO_REGION: &str = "WHO Region";
pub const DATE: &str = "Date";

/// Legacy header → canonical header.
pub const COLUMN_MAPPING: &[(&str, &str)] = &[
    ("Confirmed", TOTAL_CASES),
    ("Deaths", TOTAL_DEATHS),
    ("Recovered", TOTAL_RECOVERED),
    ("Active", ACTIVE_CASES),
    ("New cases", NEW_CASES),
    ("New deaths", NEW_DEATHS),
    ("New recovered", NEW_RECOVERED),
];

/// Canonical columns that always hold counts.
pub const METRIC_COLUMNS: &[&str] = &[
    TOTAL_CASES,
    TOTAL_DEATHS,
    TOTAL_RECOVERED,
    ACTIVE_CASES,
    NEW_CASES,
    NEW_DEATHS,
    NEW_RECOVERED,
];

/// Geolocation columns removed from the canonical schema.
pub const GEO_COLUMNS: &[&str] = &["Lat", "Long"];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Header as used for mapping lookups: trimmed, inner whitespace collapsed.
pub fn header_key(name: &str) -> String {
    WHITESPACE.replace_all(name.trim(), " ").into_owned()
}

/// Canonical name for a legacy header, if it has one.
pub fn canonical_name(name: &str) -> Option<&'static str> {
    let key = header_key(name);
    COLUMN_MAPPING
        .iter()
        .find(|(legacy, _)| *legacy == key)
        .map(|(_, canonical)| *canonical)
}

/// What the normalizer changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeSummary {
    pub renamed: Vec<(String, String)>,
    pub dropped: Vec<String>,
    /// Legacy columns left alone because their canonical name was taken.
    pub conflicts: Vec<String>,
    /// Metric columns with no values, retyped from text to number.
    pub retyped: Vec<String>,
}

/// Rename legacy columns and drop geolocation columns in place.
///
/// Applying it twice yields the same schema as applying it once.
pub fn normalize(dataset: &mut Dataset, report: &mut RunReport) -> NormalizeSummary {
    let mut summary = NormalizeSummary::default();
    report.info(
        Stage::Normalize,
        format!("Columns before normalization: {}", dataset.column_names().join(", ")),
    );

    let geo_present: Vec<&str> = GEO_COLUMNS
        .iter()
        .copied()
        .filter(|c| dataset.has_column(c))
        .collect();
    if geo_present.len() == GEO_COLUMNS.len() {
        for col in GEO_COLUMNS {
            dataset.drop_column(col);
            summary.dropped.push(col.to_string());
        }
        report.success(Stage::Normalize, "Dropped geolocation columns 'Lat' and 'Long'");
    } else {
        report.warning(
            Stage::Normalize,
            "Columns 'Lat' and 'Long' not both present, nothing dropped",
        );
    }

    let names: Vec<String> = dataset.column_names().iter().map(|s| s.to_string()).collect();
    for name in names {
        let Some(canonical) = canonical_name(&name) else {
            continue;
        };
        match dataset.rename_column(&name, canonical) {
            Ok(()) => {
                report.info_indent(Stage::Normalize, format!("{} → {}", name, canonical), 1);
                summary.renamed.push((name, canonical.to_string()));
            }
            Err(_) => {
                report.warning(
                    Stage::Normalize,
                    format!("'{}' kept as is: '{}' already exists", name, canonical),
                );
                summary.conflicts.push(name);
            }
        }
    }

    summary.retyped = pin_metric_kinds(dataset);
    for name in &summary.retyped {
        report.info_indent(Stage::Normalize, format!("{} has no values, typed as number", name), 1);
    }

    report.success(
        Stage::Normalize,
        format!(
            "Canonical schema: {} columns ({} renamed)",
            dataset.width(),
            summary.renamed.len()
        ),
    );
    summary
}

/// Type empty metric columns as numbers so they impute to 0.
///
/// The loader types a column with no values as text. Columns that do hold
/// non-numeric values keep their kind.
fn pin_metric_kinds(dataset: &mut Dataset) -> Vec<String> {
    let mut retyped = Vec::new();
    for name in METRIC_COLUMNS {
        let Some(idx) = dataset.column_index(name) else {
            continue;
        };
        if dataset.columns()[idx].kind == ColumnKind::Number {
            continue;
        }
        let empty = dataset.rows().iter().all(|row| row[idx].is_missing());
        if empty
            && dataset
                .set_column(name, ColumnKind::Number, vec![Cell::Missing; dataset.len()])
                .is_ok()
        {
            retyped.push(name.to_string());
        }
    }
    retyped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Column;
    use crate::parser::parse_str;
    use crate::transform::clean::clean;

    fn legacy() -> Dataset {
        let names = [
            "Province/State",
            "Country/Region",
            "Lat",
            "Long",
            "Date",
            "Confirmed",
            "Deaths",
            "Recovered",
            "Active",
            "WHO Region",
        ];
        let columns = names
            .iter()
            .map(|n| Column::new(*n, ColumnKind::Text))
            .collect();
        let mut ds = Dataset::new(columns).unwrap();
        ds.push_row(vec![Cell::Missing; names.len()]).unwrap();
        ds
    }

    #[test]
    fn test_renames_and_drops() {
        let mut ds = legacy();
        let mut report = RunReport::new();
        let summary = normalize(&mut ds, &mut report);

        assert_eq!(
            ds.column_names(),
            vec![
                "Province/State",
                "Country/Region",
                "Date",
                "TotalCases",
                "TotalDeaths",
                "TotalRecovered",
                "ActiveCases",
                "WHO Region"
            ]
        );
        assert_eq!(summary.dropped, vec!["Lat", "Long"]);
        assert_eq!(summary.renamed.len(), 4);
        assert!(ds.rows().iter().all(|r| r.len() == ds.width()));
    }

    #[test]
    fn test_idempotent() {
        let mut once = legacy();
        let mut report = RunReport::new();
        normalize(&mut once, &mut report);

        let mut twice = once.clone();
        let summary = normalize(&mut twice, &mut report);

        assert_eq!(once.columns(), twice.columns());
        assert!(summary.renamed.is_empty());
        assert!(summary.dropped.is_empty());
    }

    #[test]
    fn test_missing_geo_columns_is_not_fatal() {
        let mut ds = Dataset::new(vec![Column::new("Confirmed", ColumnKind::Number)]).unwrap();
        let mut report = RunReport::new();
        let summary = normalize(&mut ds, &mut report);

        assert!(summary.dropped.is_empty());
        assert_eq!(ds.column_names(), vec!["TotalCases"]);
        assert!(report
            .entries
            .iter()
            .any(|e| e.message.contains("'Lat' and 'Long'")));
    }

    #[test]
    fn test_conflicting_target_is_kept() {
        let mut ds = Dataset::new(vec![
            Column::new("Confirmed", ColumnKind::Number),
            Column::new("TotalCases", ColumnKind::Number),
        ])
        .unwrap();
        let mut report = RunReport::new();
        let summary = normalize(&mut ds, &mut report);

        assert_eq!(ds.column_names(), vec!["Confirmed", "TotalCases"]);
        assert_eq!(summary.conflicts, vec!["Confirmed"]);
    }

    #[test]
    fn test_header_whitespace_is_collapsed() {
        assert_eq!(canonical_name(" New   cases "), Some(NEW_CASES));
        assert_eq!(canonical_name("New\tdeaths"), Some(NEW_DEATHS));
        assert_eq!(canonical_name("Country/Region"), None);
    }

    #[test]
    fn test_empty_metric_column_imputes_to_zero() {
        let mut ds = parse_str("Country/Region,Confirmed,Deaths,Recovered\nX,,2,3\n", ',').unwrap();
        let mut report = RunReport::new();
        let summary = normalize(&mut ds, &mut report);
        assert_eq!(summary.retyped, vec![TOTAL_CASES]);

        let cleaned = clean(&mut ds, &mut report);
        assert!(cleaned.active_recomputed);
        let rec = ds.record(0).unwrap();
        assert_eq!(rec.number(TOTAL_CASES), Some(0.0));
        assert_eq!(rec.number(ACTIVE_CASES), Some(-5.0));
    }

    #[test]
    fn test_text_metric_column_keeps_kind() {
        let mut ds = parse_str("Confirmed\nmany\n", ',').unwrap();
        let mut report = RunReport::new();
        let summary = normalize(&mut ds, &mut report);
        assert!(summary.retyped.is_empty());
        assert_eq!(ds.columns()[0].kind, ColumnKind::Text);
    }
}
