//! Write datasets to CSV.
//!
//! Output has a header row and no index column, so files load back through
//! [`crate::parser::load_csv`] with the same column kinds.

use std::fs;
use std::path::Path;

use crate::error::{OutputError, OutputResult};
use crate::models::Dataset;

/// Write `dataset` to `path`, creating the parent directory when needed.
pub fn write_csv(dataset: &Dataset, path: &Path) -> OutputResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| OutputError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let csv_err = |source: csv::Error| OutputError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(dataset.column_names()).map_err(csv_err)?;
    for row in dataset.rows() {
        writer
            .write_record(row.iter().map(|cell| cell.to_string()))
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceEncoding;
    use crate::models::{Cell, Column, ColumnKind};
    use crate::parser::load_csv;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn sample() -> Dataset {
        let mut ds = Dataset::new(vec![
            Column::new("Country/Region", ColumnKind::Text),
            Column::new("Date", ColumnKind::Date),
            Column::new("TotalCases", ColumnKind::Number),
            Column::new("Anomaly", ColumnKind::Bool),
        ])
        .unwrap();
        ds.push_row(vec![
            Cell::Text("Korea, South".into()),
            Cell::Date(NaiveDate::from_ymd_opt(2020, 3, 1).unwrap()),
            Cell::Number(3736.0),
            Cell::Bool(false),
        ])
        .unwrap();
        ds
    }

    #[test]
    fn test_written_file_has_no_index_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        write_csv(&sample(), &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("Country/Region,Date,TotalCases,Anomaly"));
        assert_eq!(lines.next(), Some("\"Korea, South\",2020-03-01,3736,False"));
    }

    #[test]
    fn test_written_file_loads_back_with_same_kinds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let original = sample();
        write_csv(&original, &path).unwrap();

        let loaded = load_csv(&path, SourceEncoding::Utf8).unwrap();
        assert_eq!(loaded.dataset, original);
    }

    #[test]
    fn test_unwritable_path_is_reported() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened as a file.
        let err = write_csv(&sample(), dir.path()).unwrap_err();
        assert!(err.path().is_some());
    }
}
