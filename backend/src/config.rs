//! Pipeline configuration.
//!
//! One [`PipelineConfig`] value is built at startup (defaults, then
//! environment, then CLI flags) and handed to every stage. Nothing below reads
//! the environment on its own.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default dataset source identifier.
pub const DEFAULT_DATASET: &str = "imdevskp/corona-virus-report";

/// Default input file, as produced by the download step.
pub const DEFAULT_INPUT: &str = "./CSV/covid_19_clean_complete.csv";

/// Default path of the cleaned full dataset.
pub const DEFAULT_CLEANED_OUTPUT: &str = "./CSV/fullgro_cleans.csv";

/// Default directory for the train/test/validation files.
pub const DEFAULT_OUTPUT_DIR: &str = "./CSV";

/// Default SQLite database file.
pub const DEFAULT_DB_PATH: &str = "./CSV/covid.db";

/// Default seed for the split permutation.
pub const DEFAULT_SEED: u64 = 42;

/// Tolerance on the sum of split proportions.
const PROPORTION_TOLERANCE: f64 = 1e-6;

/// Character encoding of the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceEncoding {
    #[default]
    Latin1,
    Utf8,
    Windows1252,
    /// Guess with chardet.
    Auto,
}

impl SourceEncoding {
    pub fn label(self) -> &'static str {
        match self {
            SourceEncoding::Latin1 => "iso-8859-1",
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Windows1252 => "windows-1252",
            SourceEncoding::Auto => "auto",
        }
    }
}

impl FromStr for SourceEncoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "iso-8859-1" | "latin-1" | "latin1" => Ok(Self::Latin1),
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "windows-1252" | "cp1252" => Ok(Self::Windows1252),
            "auto" => Ok(Self::Auto),
            _ => Err(ConfigError::InvalidValue {
                key: "encoding".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Target proportions and seed for the train/test/validation split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub train: f64,
    pub test: f64,
    pub validation: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train: 0.7,
            test: 0.2,
            validation: 0.1,
            seed: DEFAULT_SEED,
        }
    }
}

impl SplitConfig {
    /// Each fraction in (0, 1) and the three summing to 1.
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("train", self.train),
            ("test", self.test),
            ("validation", self.validation),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::InvalidProportions(format!(
                    "{} fraction {} is outside (0, 1)",
                    name, value
                )));
            }
        }
        let sum = self.train + self.test + self.validation;
        if (sum - 1.0).abs() > PROPORTION_TOLERANCE {
            return Err(ConfigError::InvalidProportions(format!(
                "fractions sum to {}, expected 1",
                sum
            )));
        }
        Ok(())
    }

    /// Share of the whole dataset carved off before the second split.
    pub fn holdout_fraction(&self) -> f64 {
        self.test + self.validation
    }

    /// Share of the holdout that becomes the validation set.
    pub fn validation_fraction_of_holdout(&self) -> f64 {
        self.validation / self.holdout_fraction()
    }
}

/// Relational store location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

/// Everything a run needs to know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Dataset source identifier (reported, not fetched).
    pub dataset: String,
    pub input_path: PathBuf,
    pub cleaned_output_path: PathBuf,
    pub output_dir: PathBuf,
    pub encoding: SourceEncoding,
    pub split: SplitConfig,
    pub database: DatabaseConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: DEFAULT_DATASET.to_string(),
            input_path: PathBuf::from(DEFAULT_INPUT),
            cleaned_output_path: PathBuf::from(DEFAULT_CLEANED_OUTPUT),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            encoding: SourceEncoding::default(),
            split: SplitConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by environment variables (and a `.env` file, if present).
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known key.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("ETL_DATASET") {
            config.dataset = v;
        }
        if let Some(v) = lookup("ETL_INPUT") {
            config.input_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ETL_CLEANED_OUTPUT") {
            config.cleaned_output_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ETL_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ETL_ENCODING") {
            config.encoding = v.parse()?;
        }
        if let Some(v) = lookup("ETL_SEED") {
            config.split.seed = parse_value("ETL_SEED", &v)?;
        }
        if let Some(v) = lookup("ETL_TRAIN_FRACTION") {
            config.split.train = parse_value("ETL_TRAIN_FRACTION", &v)?;
        }
        if let Some(v) = lookup("ETL_TEST_FRACTION") {
            config.split.test = parse_value("ETL_TEST_FRACTION", &v)?;
        }
        if let Some(v) = lookup("ETL_VALIDATION_FRACTION") {
            config.split.validation = parse_value("ETL_VALIDATION_FRACTION", &v)?;
        }
        if let Some(v) = lookup("DB_PATH") {
            config.database.path = PathBuf::from(v);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.split.validate()
    }

    pub fn partition_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
