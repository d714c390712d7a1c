//! Read-only observers invoked after each pipeline stage.
//!
//! Observers get a shared reference to the dataset and can only add lines to
//! the report. They stand in for the charts an analyst would look at between
//! stages: a profile, a missing-value overview and a correlation matrix.

use crate::models::{format_number, Dataset};
use crate::report::{RunReport, Stage};
use crate::stats::{correlation_matrix, describe};

/// Rows shown at each end of the dataset preview.
pub const PREVIEW_ROWS: usize = 10;

/// Callback run after a stage completes.
pub trait StageObserver {
    /// Stages this observer wants to see.
    fn wants(&self, stage: Stage) -> bool;

    fn observe(&mut self, stage: Stage, dataset: &Dataset, report: &mut RunReport);
}

/// Shape, head/tail preview and numeric summary.
#[derive(Debug, Clone)]
pub struct ProfileObserver {
    stages: Vec<Stage>,
    preview_rows: usize,
}

impl Default for ProfileObserver {
    fn default() -> Self {
        Self {
            stages: vec![Stage::Load],
            preview_rows: PREVIEW_ROWS,
        }
    }
}

impl ProfileObserver {
    pub fn at(stages: &[Stage]) -> Self {
        Self {
            stages: stages.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }
}

fn row_line(dataset: &Dataset, index: usize) -> String {
    let cells: Vec<String> = dataset.rows()[index].iter().map(|c| c.to_string()).collect();
    format!("{:>6} | {}", index, cells.join(" | "))
}

fn fmt_stat(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.fract() == 0.0 {
        format_number(v)
    } else {
        format!("{:.2}", v)
    }
}

impl StageObserver for ProfileObserver {
    fn wants(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    fn observe(&mut self, stage: Stage, dataset: &Dataset, report: &mut RunReport) {
        report.info(
            stage,
            format!("Shape: {} rows x {} columns", dataset.len(), dataset.width()),
        );

        if self.preview_rows > 0 && !dataset.is_empty() {
            let header = dataset.column_names().join(" | ");
            let head = self.preview_rows.min(dataset.len());
            report.info(stage, format!("First {} rows:", head));
            report.info_indent(stage, format!("{:>6} | {}", "", header), 1);
            for i in 0..head {
                report.info_indent(stage, row_line(dataset, i), 1);
            }

            let tail_start = dataset.len().saturating_sub(self.preview_rows);
            report.info(stage, format!("Last {} rows:", dataset.len() - tail_start));
            report.info_indent(stage, format!("{:>6} | {}", "", header), 1);
            for i in tail_start..dataset.len() {
                report.info_indent(stage, row_line(dataset, i), 1);
            }
        }

        let summaries = describe(dataset);
        if summaries.is_empty() {
            return;
        }
        report.info(stage, "Statistical description:");
        for s in summaries {
            report.info_indent(
                stage,
                format!(
                    "{}: count={} mean={} std={} min={} 25%={} 50%={} 75%={} max={}",
                    s.name,
                    s.count,
                    fmt_stat(s.mean),
                    fmt_stat(s.std),
                    fmt_stat(s.min),
                    fmt_stat(s.q25),
                    fmt_stat(s.median),
                    fmt_stat(s.q75),
                    fmt_stat(s.max)
                ),
                1,
            );
        }
    }
}

/// Per-column missing-value counts, before and after cleaning.
#[derive(Debug, Clone, Default)]
pub struct MissingValuesObserver;

impl StageObserver for MissingValuesObserver {
    fn wants(&self, stage: Stage) -> bool {
        matches!(stage, Stage::Normalize | Stage::Clean)
    }

    fn observe(&mut self, stage: Stage, dataset: &Dataset, report: &mut RunReport) {
        let rows = dataset.len().max(1) as f64;
        let missing: Vec<(&str, usize)> = dataset
            .missing_counts()
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .collect();

        if missing.is_empty() {
            report.info(stage, "Missing values: none");
            return;
        }
        report.info(stage, "Missing values:");
        for (name, n) in missing {
            let pct = (n as f64 * 100.0 / rows * 100.0).round() / 100.0;
            report.info_indent(stage, format!("{}: {} ({}%)", name, n, pct), 1);
        }
    }
}

/// Pearson correlation of the numeric columns once validation is done.
#[derive(Debug, Clone, Default)]
pub struct CorrelationObserver;

impl StageObserver for CorrelationObserver {
    fn wants(&self, stage: Stage) -> bool {
        stage == Stage::Validate
    }

    fn observe(&mut self, stage: Stage, dataset: &Dataset, report: &mut RunReport) {
        let Some(matrix) = correlation_matrix(dataset) else {
            report.info(stage, "No numeric data available for a correlation matrix");
            return;
        };

        report.info(stage, "Correlation matrix:");
        report.info_indent(stage, format!("{:>16} {}", "", matrix.columns.join(" ")), 1);
        for (i, name) in matrix.columns.iter().enumerate() {
            let row: Vec<String> = (0..matrix.columns.len())
                .map(|j| {
                    let v = matrix.get(i, j);
                    if v.is_nan() {
                        "   NaN".to_string()
                    } else {
                        format!("{:>6.2}", v)
                    }
                })
                .collect();
            report.info_indent(stage, format!("{:>16} {}", name, row.join(" ")), 1);
        }
    }
}

/// The observers a full run installs by default.
pub fn default_observers() -> Vec<Box<dyn StageObserver>> {
    vec![
        Box::new(ProfileObserver::default()),
        Box::new(MissingValuesObserver),
        Box::new(CorrelationObserver),
    ]
}
