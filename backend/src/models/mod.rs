//! Typed tabular model for the ETL pipeline.
//!
//! - [`ColumnKind`] - declared type of a column, with its zero value
//! - [`Cell`] - one value, possibly missing
//! - [`Column`] - name + kind
//! - [`Dataset`] - ordered rows sharing one schema
//! - [`Record`] - name-addressed view of one row
//!
//! Every row of a [`Dataset`] has exactly one cell per column. All mutating
//! operations go through `Dataset` so that invariant cannot be broken.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date format used in the source dataset and in every output file.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Column Kind
// =============================================================================

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Number,
    Text,
    Date,
    Bool,
}

impl ColumnKind {
    /// Value a missing cell of this kind is replaced with.
    pub fn zero(self) -> Cell {
        match self {
            ColumnKind::Number => Cell::Number(0.0),
            ColumnKind::Text => Cell::Text(String::new()),
            ColumnKind::Date => Cell::Date(NaiveDate::default()),
            ColumnKind::Bool => Cell::Bool(false),
        }
    }

    /// Whether `cell` may be stored in a column of this kind.
    pub fn accepts(self, cell: &Cell) -> bool {
        matches!(
            (self, cell),
            (_, Cell::Missing)
                | (ColumnKind::Number, Cell::Number(_))
                | (ColumnKind::Text, Cell::Text(_))
                | (ColumnKind::Date, Cell::Date(_))
                | (ColumnKind::Bool, Cell::Bool(_))
        )
    }
}

// =============================================================================
// Cell
// =============================================================================

/// A single value in the dataset.
#[derive(Debug, Clone)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
    Date(NaiveDate),
    Bool(bool),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Normalized bit pattern so that `0.0 == -0.0` and every NaN hash alike.
fn number_bits(n: f64) -> u64 {
    if n == 0.0 {
        0
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Cell::Missing, Cell::Missing) => true,
            (Cell::Number(a), Cell::Number(b)) => number_bits(*a) == number_bits(*b),
            (Cell::Text(a), Cell::Text(b)) => a == b,
            (Cell::Date(a), Cell::Date(b)) => a == b,
            (Cell::Bool(a), Cell::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Cell::Missing => {}
            Cell::Number(n) => number_bits(*n).hash(state),
            Cell::Text(s) => s.hash(state),
            Cell::Date(d) => d.hash(state),
            Cell::Bool(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => Ok(()),
            Cell::Number(n) => write!(f, "{}", format_number(*n)),
            Cell::Text(s) => f.write_str(s),
            Cell::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Cell::Bool(true) => f.write_str("True"),
            Cell::Bool(false) => f.write_str("False"),
        }
    }
}

/// Integral values print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// =============================================================================
// Column
// =============================================================================

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// Violations of the dataset shape invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Row has {found} cells, schema has {expected} columns")]
    WidthMismatch { expected: usize, found: usize },

    #[error("Column '{0}' already exists")]
    DuplicateColumn(String),

    #[error("Column '{0}' does not exist")]
    UnknownColumn(String),

    #[error("Value {value:?} does not fit {kind:?} column '{column}'")]
    KindMismatch {
        column: String,
        kind: ColumnKind,
        value: String,
    },
}

/// An ordered sequence of rows sharing one column schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Empty dataset with the given schema.
    pub fn new(columns: Vec<Column>) -> Result<Self, SchemaError> {
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(SchemaError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Dataset with the same schema and the given rows.
    pub(crate) fn with_rows(&self, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn has_columns(&self, names: &[&str]) -> bool {
        names.iter().all(|n| self.has_column(n))
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Append a row, checking width and cell kinds.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), SchemaError> {
        if row.len() != self.columns.len() {
            return Err(SchemaError::WidthMismatch {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        for (col, cell) in self.columns.iter().zip(&row) {
            if !col.kind.accepts(cell) {
                return Err(SchemaError::KindMismatch {
                    column: col.name.clone(),
                    kind: col.kind,
                    value: cell.to_string(),
                });
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn record(&self, index: usize) -> Option<Record<'_>> {
        self.rows.get(index).map(|cells| Record {
            columns: &self.columns,
            cells,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |cells| Record {
            columns: &self.columns,
            cells,
        })
    }

    /// All values of a column, in row order.
    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// Present numeric values of a `Number` column, in row order.
    pub fn numeric_values(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        if self.columns[idx].kind != ColumnKind::Number {
            return None;
        }
        Some(self.rows.iter().filter_map(|r| r[idx].as_f64()).collect())
    }

    /// Rename a column. Renaming onto an existing name is refused.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), SchemaError> {
        if from == to {
            return Ok(());
        }
        if self.has_column(to) {
            return Err(SchemaError::DuplicateColumn(to.to_string()));
        }
        let idx = self
            .column_index(from)
            .ok_or_else(|| SchemaError::UnknownColumn(from.to_string()))?;
        self.columns[idx].name = to.to_string();
        Ok(())
    }

    /// Remove a column and its cells. Returns whether it existed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    /// Set every cell of `name` from `values`, adding the column if absent.
    ///
    /// An existing column takes the new kind.
    pub fn set_column(
        &mut self,
        name: &str,
        kind: ColumnKind,
        values: Vec<Cell>,
    ) -> Result<(), SchemaError> {
        if values.len() != self.rows.len() {
            return Err(SchemaError::WidthMismatch {
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        if let Some(bad) = values.iter().find(|v| !kind.accepts(v)) {
            return Err(SchemaError::KindMismatch {
                column: name.to_string(),
                kind,
                value: bad.to_string(),
            });
        }
        match self.column_index(name) {
            Some(idx) => {
                self.columns[idx].kind = kind;
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(Column::new(name, kind));
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Mutable access to every row, for in-place cell replacement.
    ///
    /// Callers must keep each cell compatible with its column kind.
    pub(crate) fn rows_mut(&mut self) -> &mut [Vec<Cell>] {
        &mut self.rows
    }

    /// Keep only the rows for which `keep` returns true, preserving order.
    pub(crate) fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Cell]) -> bool,
    {
        self.rows.retain(|r| keep(r.as_slice()));
    }

    /// New dataset holding the rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        self.with_rows(indices.iter().map(|&i| self.rows[i].clone()).collect())
    }

    /// Number of missing cells per column, in schema order.
    pub fn missing_counts(&self) -> Vec<(&str, usize)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let n = self.rows.iter().filter(|r| r[idx].is_missing()).count();
                (col.name.as_str(), n)
            })
            .collect()
    }
}

// =============================================================================
// Record
// =============================================================================

/// One row, addressed by column name.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [Column],
    cells: &'a [Cell],
}

impl<'a> Record<'a> {
    pub fn get(&self, name: &str) -> Option<&'a Cell> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|idx| &self.cells[idx])
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Cell::as_f64)
    }

    pub fn text(&self, name: &str) -> Option<&'a str> {
        self.get(name).and_then(Cell::as_str)
    }

    pub fn cells(&self) -> &'a [Cell] {
        self.cells
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Cell)> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .zip(self.cells.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut ds = Dataset::new(vec![
            Column::new("Country/Region", ColumnKind::Text),
            Column::new("Confirmed", ColumnKind::Number),
        ])
        .unwrap();
        ds.push_row(vec![Cell::Text("France".into()), Cell::Number(10.0)])
            .unwrap();
        ds.push_row(vec![Cell::Text("Italy".into()), Cell::Missing])
            .unwrap();
        ds
    }

    #[test]
    fn test_zero_values_per_kind() {
        assert_eq!(ColumnKind::Number.zero(), Cell::Number(0.0));
        assert_eq!(ColumnKind::Text.zero(), Cell::Text(String::new()));
        assert_eq!(ColumnKind::Bool.zero(), Cell::Bool(false));
        assert_eq!(
            ColumnKind::Date.zero(),
            Cell::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
        );
    }

    #[test]
    fn test_push_row_rejects_wrong_width() {
        let mut ds = sample();
        let err = ds.push_row(vec![Cell::Missing]).unwrap_err();
        assert_eq!(err, SchemaError::WidthMismatch { expected: 2, found: 1 });
    }

    #[test]
    fn test_push_row_rejects_wrong_kind() {
        let mut ds = sample();
        let err = ds
            .push_row(vec![Cell::Number(1.0), Cell::Number(1.0)])
            .unwrap_err();
        assert!(matches!(err, SchemaError::KindMismatch { .. }));
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = Dataset::new(vec![
            Column::new("a", ColumnKind::Text),
            Column::new("a", ColumnKind::Number),
        ])
        .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateColumn("a".into()));
    }

    #[test]
    fn test_rename_and_drop() {
        let mut ds = sample();
        ds.rename_column("Confirmed", "TotalCases").unwrap();
        assert!(ds.has_column("TotalCases"));
        assert!(ds.rename_column("TotalCases", "Country/Region").is_err());

        assert!(ds.drop_column("Country/Region"));
        assert!(!ds.drop_column("Country/Region"));
        assert_eq!(ds.width(), 1);
        assert!(ds.rows().iter().all(|r| r.len() == 1));
    }

    #[test]
    fn test_set_column_adds_and_replaces() {
        let mut ds = sample();
        ds.set_column("Flag", ColumnKind::Bool, vec![Cell::Bool(true), Cell::Bool(false)])
            .unwrap();
        assert_eq!(ds.width(), 3);

        ds.set_column("Flag", ColumnKind::Number, vec![Cell::Number(1.0), Cell::Number(0.0)])
            .unwrap();
        assert_eq!(ds.width(), 3);
        assert_eq!(ds.record(0).unwrap().number("Flag"), Some(1.0));

        assert!(ds.set_column("Flag", ColumnKind::Number, vec![]).is_err());
    }

    #[test]
    fn test_record_view() {
        let ds = sample();
        let rec = ds.record(0).unwrap();
        assert_eq!(rec.text("Country/Region"), Some("France"));
        assert_eq!(rec.number("Confirmed"), Some(10.0));
        assert!(rec.get("Deaths").is_none());
        assert!(ds.record(5).is_none());
    }

    #[test]
    fn test_missing_counts() {
        let ds = sample();
        assert_eq!(ds.missing_counts(), vec![("Country/Region", 0), ("Confirmed", 1)]);
    }

    #[test]
    fn test_cell_equality_normalizes_zero() {
        assert_eq!(Cell::Number(0.0), Cell::Number(-0.0));
        assert_ne!(Cell::Number(1.0), Cell::Text("1".into()));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(Cell::Number(12.0).to_string(), "12");
        assert_eq!(Cell::Number(1.5).to_string(), "1.5");
        assert_eq!(Cell::Bool(true).to_string(), "True");
        assert_eq!(
            Cell::Date(NaiveDate::from_ymd_opt(2020, 1, 22).unwrap()).to_string(),
            "2020-01-22"
        );
        assert_eq!(Cell::Missing.to_string(), "");
    }
}
