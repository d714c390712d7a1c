//! Relational store for the cleaned dataset.
//!
//! Three tables:
//!
//! ```text
//! countries ──┬── daily_statistics   one row per (country, date)
//!             └── country_totals     one row per country, summed metrics
//! ```
//!
//! Every write is an upsert, so loading the same dataset twice leaves the
//! store unchanged.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{PersistError, PersistResult};
use crate::models::{Cell, Dataset, Record, DATE_FORMAT};
use crate::transform::normalize::{
    ACTIVE_CASES, COUNTRY, DATE, TOTAL_CASES, TOTAL_DEATHS, TOTAL_RECOVERED, WHO_REGION,
};

/// Columns a dataset needs before it can be persisted.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    COUNTRY,
    DATE,
    TOTAL_CASES,
    TOTAL_DEATHS,
    TOTAL_RECOVERED,
    ACTIVE_CASES,
];

const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS countries (
        id          INTEGER PRIMARY KEY,
        name        TEXT UNIQUE NOT NULL,
        who_region  TEXT
    );
    CREATE TABLE IF NOT EXISTS daily_statistics (
        id               INTEGER PRIMARY KEY,
        country_id       INTEGER NOT NULL REFERENCES countries(id),
        date             TEXT NOT NULL,
        total_cases      INTEGER NOT NULL,
        total_deaths     INTEGER NOT NULL,
        total_recovered  INTEGER NOT NULL,
        active_cases     INTEGER NOT NULL,
        who_region       TEXT,
        UNIQUE(country_id, date)
    );
    CREATE TABLE IF NOT EXISTS country_totals (
        id               INTEGER PRIMARY KEY,
        country_id       INTEGER UNIQUE NOT NULL REFERENCES countries(id),
        total_cases      INTEGER NOT NULL,
        total_deaths     INTEGER NOT NULL,
        total_recovered  INTEGER NOT NULL,
        active_cases     INTEGER NOT NULL
    );
"#;

/// Counts from one persist call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistSummary {
    /// Dataset rows read.
    pub rows: usize,
    pub countries: usize,
    /// Distinct (country, date) pairs written.
    pub daily_rows: usize,
    pub totals_rows: usize,
}

/// Destination for a cleaned dataset.
pub trait Persister {
    /// Create the tables if they do not exist yet.
    fn ensure_schema(&mut self) -> PersistResult<()>;

    /// Upsert the dataset and refresh the per-country totals.
    fn persist(&mut self, dataset: &Dataset) -> PersistResult<PersistSummary>;
}

/// [`Persister`] backed by a SQLite file.
pub struct SqlitePersister {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqlitePersister {
    /// Open (or create) the database file, creating its directory if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> PersistResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> PersistResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn country_id(&self, name: &str) -> PersistResult<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM countries WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    #[cfg(test)]
    pub(crate) fn count(&self, table: &str) -> PersistResult<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

/// Metrics for one (country, date), summed over its province rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DailyRow {
    who_region: Option<String>,
    total_cases: i64,
    total_deaths: i64,
    total_recovered: i64,
    active_cases: i64,
}

impl DailyRow {
    fn add(&mut self, other: &DailyRow) {
        if self.who_region.is_none() {
            self.who_region = other.who_region.clone();
        }
        self.total_cases += other.total_cases;
        self.total_deaths += other.total_deaths;
        self.total_recovered += other.total_recovered;
        self.active_cases += other.active_cases;
    }
}

fn metric(index: usize, record: &Record<'_>, column: &str) -> PersistResult<i64> {
    let invalid = |message: &str| PersistError::InvalidValue {
        row: index,
        column: column.to_string(),
        message: message.to_string(),
    };
    match record.get(column) {
        Some(Cell::Number(v)) if v.is_finite() => Ok(v.round() as i64),
        Some(Cell::Missing) | None => Err(invalid("missing value")),
        Some(other) => Err(invalid(&format!("'{}' is not a number", other))),
    }
}

fn date_key(index: usize, record: &Record<'_>) -> PersistResult<String> {
    match record.get(DATE) {
        Some(Cell::Date(d)) => Ok(d.format(DATE_FORMAT).to_string()),
        Some(Cell::Text(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(PersistError::InvalidValue {
            row: index,
            column: DATE.to_string(),
            message: "missing date".to_string(),
        }),
    }
}

/// Group the dataset by (country, date), summing metrics.
fn aggregate(dataset: &Dataset) -> PersistResult<BTreeMap<(String, String), DailyRow>> {
    for column in REQUIRED_COLUMNS {
        if !dataset.has_column(column) {
            return Err(PersistError::MissingColumn(column.to_string()));
        }
    }

    let mut grouped: BTreeMap<(String, String), DailyRow> = BTreeMap::new();
    for (i, rec) in dataset.records().enumerate() {
        let country = match rec.text(COUNTRY) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(PersistError::InvalidValue {
                    row: i,
                    column: COUNTRY.to_string(),
                    message: "missing country name".to_string(),
                })
            }
        };
        let row = DailyRow {
            who_region: rec.text(WHO_REGION).filter(|s| !s.is_empty()).map(String::from),
            total_cases: metric(i, &rec, TOTAL_CASES)?,
            total_deaths: metric(i, &rec, TOTAL_DEATHS)?,
            total_recovered: metric(i, &rec, TOTAL_RECOVERED)?,
            active_cases: metric(i, &rec, ACTIVE_CASES)?,
        };
        grouped
            .entry((country, date_key(i, &rec)?))
            .or_default()
            .add(&row);
    }
    Ok(grouped)
}

impl Persister for SqlitePersister {
    fn ensure_schema(&mut self) -> PersistResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn persist(&mut self, dataset: &Dataset) -> PersistResult<PersistSummary> {
        let grouped = aggregate(dataset)?;
        let tx = self.conn.transaction()?;

        let mut ids: HashMap<String, i64> = HashMap::new();
        {
            let mut upsert_country = tx.prepare(
                "INSERT INTO countries (name, who_region) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET who_region = COALESCE(excluded.who_region, countries.who_region)",
            )?;
            let mut country_id = tx.prepare("SELECT id FROM countries WHERE name = ?1")?;
            let mut upsert_daily = tx.prepare(
                "INSERT INTO daily_statistics
                    (country_id, date, total_cases, total_deaths, total_recovered, active_cases, who_region)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(country_id, date) DO UPDATE SET
                    total_cases=excluded.total_cases,
                    total_deaths=excluded.total_deaths,
                    total_recovered=excluded.total_recovered,
                    active_cases=excluded.active_cases,
                    who_region=excluded.who_region",
            )?;

            for ((country, date), row) in &grouped {
                let id = match ids.get(country) {
                    Some(id) => *id,
                    None => {
                        upsert_country.execute(params![country, row.who_region])?;
                        let id: i64 = country_id.query_row(params![country], |r| r.get(0))?;
                        ids.insert(country.clone(), id);
                        id
                    }
                };
                upsert_daily.execute(params![
                    id,
                    date,
                    row.total_cases,
                    row.total_deaths,
                    row.total_recovered,
                    row.active_cases,
                    row.who_region
                ])?;
            }
        }

        let totals_rows = tx.execute(
            "INSERT INTO country_totals
                (country_id, total_cases, total_deaths, total_recovered, active_cases)
             SELECT country_id, SUM(total_cases), SUM(total_deaths), SUM(total_recovered), SUM(active_cases)
             FROM daily_statistics WHERE true
             GROUP BY country_id
             ON CONFLICT(country_id) DO UPDATE SET
                total_cases=excluded.total_cases,
                total_deaths=excluded.total_deaths,
                total_recovered=excluded.total_recovered,
                active_cases=excluded.active_cases",
            [],
        )?;
        tx.commit()?;

        tracing::debug!(
            countries = ids.len(),
            daily = grouped.len(),
            "persisted dataset"
        );
        Ok(PersistSummary {
            rows: dataset.len(),
            countries: ids.len(),
            daily_rows: grouped.len(),
            totals_rows,
        })
    }
}
