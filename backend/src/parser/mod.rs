//! CSV loader with encoding handling, delimiter detection and column typing.
//!
//! Turns the raw dataset file into a typed [`Dataset`]. No epidemiological
//! logic here: column names are kept exactly as found in the header.

use std::path::Path;

use chrono::NaiveDate;

use crate::config::SourceEncoding;
use crate::error::{LoadError, LoadResult};
use crate::models::{Cell, Column, ColumnKind, Dataset, DATE_FORMAT};

/// Tokens read as a missing value (pandas' default NA set).
const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Result of loading with metadata
#[derive(Debug, Clone)]
pub struct LoadedCsv {
    /// Typed dataset
    pub dataset: Dataset,
    /// Encoding used to decode the bytes
    pub encoding: String,
    /// Detected delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> LoadResult<String> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8(bytes.to_vec())
            .map_err(|e| LoadError::Encoding(format!("invalid UTF-8: {}", e))),
        // WHATWG maps the Latin-1 labels onto windows-1252, a superset.
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned())
        }
        other => Err(LoadError::Encoding(format!("unsupported encoding '{}'", other))),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Load a CSV file into a typed dataset.
///
/// Fails with [`LoadError::FileNotFound`] when `path` does not resolve to a file.
///
/// # Example
/// ```ignore
/// let loaded = load_csv(Path::new("./CSV/covid_19_clean_complete.csv"), SourceEncoding::Latin1)?;
/// println!("{} rows, delimiter '{}'", loaded.dataset.len(), loaded.delimiter);
/// ```
pub fn load_csv(path: &Path, encoding: SourceEncoding) -> LoadResult<LoadedCsv> {
    if !path.is_file() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => LoadError::Io(e),
    })?;

    parse_bytes(&bytes, encoding)
}

/// Parse CSV bytes with the configured encoding and a detected delimiter.
pub fn parse_bytes(bytes: &[u8], encoding: SourceEncoding) -> LoadResult<LoadedCsv> {
    let encoding = match encoding {
        SourceEncoding::Auto => detect_encoding(bytes),
        fixed => fixed.label().to_string(),
    };
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let dataset = parse_str(&content, delimiter)?;

    Ok(LoadedCsv {
        dataset,
        encoding,
        delimiter,
    })
}

/// Parse CSV text with an explicit delimiter.
///
/// Every row must have as many fields as the header.
pub fn parse_str(content: &str, delimiter: char) -> LoadResult<Dataset> {
    if content.trim().is_empty() {
        return Err(LoadError::EmptyFile);
    }
    let delimiter = u8::try_from(delimiter)
        .map_err(|_| LoadError::parse(1, format!("delimiter '{}' is not ASCII", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(e, 1))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(LoadError::NoHeaders);
    }

    let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| csv_error(e, idx + 2))?;
        raw_rows.push(
            record
                .iter()
                .map(|field| (!is_na(field)).then(|| field.to_string()))
                .collect(),
        );
    }

    if raw_rows.is_empty() {
        return Err(LoadError::EmptyFile);
    }

    let kinds: Vec<ColumnKind> = (0..headers.len())
        .map(|col| infer_kind(raw_rows.iter().filter_map(|r| r[col].as_deref())))
        .collect();

    let columns = headers
        .into_iter()
        .zip(&kinds)
        .map(|(name, kind)| Column::new(name, *kind))
        .collect();
    let mut dataset = Dataset::new(columns).map_err(|e| LoadError::parse(1, e.to_string()))?;

    for (idx, raw) in raw_rows.into_iter().enumerate() {
        let cells = raw
            .into_iter()
            .zip(&kinds)
            .map(|(value, kind)| match value {
                Some(v) => to_cell(&v, *kind),
                None => Cell::Missing,
            })
            .collect();
        dataset
            .push_row(cells)
            .map_err(|e| LoadError::parse(idx + 2, e.to_string()))?;
    }

    Ok(dataset)
}

fn csv_error(err: csv::Error, fallback_line: usize) -> LoadError {
    let line = err
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or(fallback_line);
    match err.into_kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => LoadError::parse(line, format!("found {} fields, expected {}", len, expected_len)),
        csv::ErrorKind::Io(e) => LoadError::Io(e),
        other => LoadError::parse(line, format!("{:?}", other)),
    }
}

fn is_na(field: &str) -> bool {
    NA_TOKENS.contains(&field)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "True" | "true" | "TRUE" => Some(true),
        "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// Narrowest kind every present value fits. Columns with no values are text.
fn infer_kind<'a>(mut values: impl Iterator<Item = &'a str> + Clone) -> ColumnKind {
    if values.clone().next().is_none() {
        return ColumnKind::Text;
    }
    if values.clone().all(|v| parse_bool(v).is_some()) {
        ColumnKind::Bool
    } else if values.clone().all(|v| v.parse::<f64>().is_ok()) {
        ColumnKind::Number
    } else if values.all(|v| parse_date(v).is_some()) {
        ColumnKind::Date
    } else {
        ColumnKind::Text
    }
}

fn to_cell(value: &str, kind: ColumnKind) -> Cell {
    match kind {
        ColumnKind::Number => value.parse().map(Cell::Number).unwrap_or(Cell::Missing),
        ColumnKind::Date => parse_date(value).map(Cell::Date).unwrap_or(Cell::Missing),
        ColumnKind::Bool => parse_bool(value).map(Cell::Bool).unwrap_or(Cell::Missing),
        ColumnKind::Text => Cell::Text(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    const SAMPLE: &str = "Province/State,Country/Region,Lat,Long,Date,Confirmed,Deaths,Recovered,Active,WHO Region\n\
,Afghanistan,33.93911,67.709953,2020-01-22,0,0,0,0,Eastern Mediterranean\n\
,\"Korea, South\",35.907757,127.766922,2020-01-22,1,0,0,1,Western Pacific\n";

    #[test]
    fn test_parse_sample_types() {
        let ds = parse_str(SAMPLE, ',').unwrap();

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.width(), 10);
        let kinds: Vec<ColumnKind> = ds.columns().iter().map(|c| c.kind).collect();
        assert_eq!(kinds[0], ColumnKind::Text);
        assert_eq!(kinds[2], ColumnKind::Number);
        assert_eq!(kinds[4], ColumnKind::Date);
        assert_eq!(kinds[5], ColumnKind::Number);
        assert_eq!(kinds[9], ColumnKind::Text);

        let rec = ds.record(1).unwrap();
        assert_eq!(rec.text("Country/Region"), Some("Korea, South"));
        assert_eq!(rec.number("Confirmed"), Some(1.0));
        assert!(rec.get("Province/State").unwrap().is_missing());
    }

    #[test]
    fn test_na_tokens_are_missing() {
        let ds = parse_str("a,b\n1,NaN\n2,3\nNA,4", ',').unwrap();
        assert_eq!(ds.columns()[0].kind, ColumnKind::Number);
        assert!(ds.rows()[2][0].is_missing());
        assert!(ds.rows()[0][1].is_missing());
    }

    #[test]
    fn test_bool_column() {
        let ds = parse_str("Anomaly,x\nTrue,1\nFalse,2", ',').unwrap();
        assert_eq!(ds.columns()[0].kind, ColumnKind::Bool);
        assert_eq!(ds.rows()[0][0], Cell::Bool(true));
    }

    #[test]
    fn test_mixed_column_is_text() {
        let ds = parse_str("a\n1\nabc", ',').unwrap();
        assert_eq!(ds.columns()[0].kind, ColumnKind::Text);
        assert_eq!(ds.rows()[0][0], Cell::Text("1".into()));
    }

    #[test]
    fn test_empty_content_is_error() {
        assert!(matches!(parse_str("", ','), Err(LoadError::EmptyFile)));
        assert!(matches!(parse_str("a,b\n", ','), Err(LoadError::EmptyFile)));
    }

    #[test]
    fn test_ragged_row_is_parse_error() {
        let err = parse_str("a,b\n1,2\n3\n", ',').unwrap_err();
        match err {
            LoadError::Parse { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("expected 2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_header_is_parse_error() {
        assert!(matches!(
            parse_str("a,a\n1,2", ','),
            Err(LoadError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Côte d'Ivoire" in ISO-8859-1
        let bytes: &[u8] = b"C\xf4te d'Ivoire";
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Côte d'Ivoire");
    }

    #[test]
    fn test_bom_is_stripped() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(b"Confirmed\n3\n");
        let loaded = parse_bytes(&bytes, SourceEncoding::Latin1).unwrap();
        assert_eq!(loaded.dataset.column_names(), vec!["Confirmed"]);
    }

    #[test]
    fn test_unsupported_encoding() {
        assert!(matches!(
            decode_content(b"x", "ebcdic"),
            Err(LoadError::Encoding(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        assert!(matches!(
            load_csv(&path, SourceEncoding::Latin1),
            Err(LoadError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Country/Region;Confirmed\nFrance;12\n").unwrap();

        let loaded = load_csv(file.path(), SourceEncoding::Latin1).unwrap();
        assert_eq!(loaded.delimiter, ';');
        assert_eq!(loaded.encoding, "iso-8859-1");
        assert_eq!(loaded.dataset.len(), 1);
    }

    #[test]
    fn test_load_empty_file() {
        let file = NamedTempFile::new().unwrap();
        assert!(matches!(
            load_csv(file.path(), SourceEncoding::Latin1),
            Err(LoadError::EmptyFile)
        ));
    }
}
