//! Human-readable stage reports.
//!
//! Every stage writes its status lines into the [`RunReport`] owned by the
//! current run. Each entry is also emitted as a `tracing` event, so the console
//! shows the same lines the JSON report keeps.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OutputError, OutputResult};

/// Pipeline stage an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Load,
    Normalize,
    Clean,
    Validate,
    Partition,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Normalize => "normalize",
            Stage::Clean => "clean",
            Stage::Validate => "validate",
            Stage::Partition => "partition",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Severity of a report entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    /// A check that could not run because its columns are absent.
    Skipped,
}

/// A single report line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub stage: Stage,
    pub level: LogLevel,
    pub message: String,
    /// Optional indentation level (for nested lines)
    #[serde(default)]
    pub indent: u8,
}

impl ReportEntry {
    fn emit(&self) {
        let pad = "   ".repeat(self.indent as usize);
        match self.level {
            LogLevel::Info => tracing::info!(stage = %self.stage, "{}{}", pad, self.message),
            LogLevel::Success => {
                tracing::info!(stage = %self.stage, "{}✓ {}", pad, self.message)
            }
            LogLevel::Warning => tracing::warn!(stage = %self.stage, "{}{}", pad, self.message),
            LogLevel::Skipped => {
                tracing::warn!(stage = %self.stage, "{}skipped: {}", pad, self.message)
            }
            LogLevel::Error => tracing::error!(stage = %self.stage, "{}{}", pad, self.message),
        }
    }
}

/// Report of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub entries: Vec<ReportEntry>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            entries: Vec::new(),
        }
    }

    /// Record an entry and emit it to the tracing subscriber
    pub fn push(&mut self, stage: Stage, level: LogLevel, message: impl Into<String>, indent: u8) {
        let entry = ReportEntry {
            stage,
            level,
            message: message.into(),
            indent,
        };
        entry.emit();
        self.entries.push(entry);
    }

    pub fn info(&mut self, stage: Stage, msg: impl Into<String>) {
        self.push(stage, LogLevel::Info, msg, 0);
    }

    pub fn info_indent(&mut self, stage: Stage, msg: impl Into<String>, indent: u8) {
        self.push(stage, LogLevel::Info, msg, indent);
    }

    pub fn success(&mut self, stage: Stage, msg: impl Into<String>) {
        self.push(stage, LogLevel::Success, msg, 0);
    }

    pub fn warning(&mut self, stage: Stage, msg: impl Into<String>) {
        self.push(stage, LogLevel::Warning, msg, 0);
    }

    pub fn error(&mut self, stage: Stage, msg: impl Into<String>) {
        self.push(stage, LogLevel::Error, msg, 0);
    }

    /// Record a check downgraded because of missing columns.
    pub fn skipped(&mut self, stage: Stage, msg: impl Into<String>) {
        self.push(stage, LogLevel::Skipped, msg, 0);
    }

    pub fn entries_at(&self, level: LogLevel) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(move |e| e.level == level)
    }

    pub fn has_skipped(&self, stage: Stage) -> bool {
        self.entries
            .iter()
            .any(|e| e.stage == stage && e.level == LogLevel::Skipped)
    }

    pub fn to_json(&self) -> OutputResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> OutputResult<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_entries_are_recorded_in_order() {
        let mut report = RunReport::new();
        report.info(Stage::Load, "reading");
        report.skipped(Stage::Validate, "no TotalCases column");
        report.success(Stage::Load, "done");

        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.entries[1].level, LogLevel::Skipped);
        assert!(report.has_skipped(Stage::Validate));
        assert!(!report.has_skipped(Stage::Load));
        assert_eq!(report.entries_at(LogLevel::Success).count(), 1);
    }

    #[test]
    fn test_json_round_trip() {
        let mut report = RunReport::new();
        report.warning(Stage::Partition, "train.csv not written");

        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: RunReport = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
        assert_eq!(parsed.entries, report.entries);
        assert!(content.contains("\"runId\""));
        assert!(content.contains("\"partition\""));
    }
}
