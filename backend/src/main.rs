//! covid-etl CLI - clean, validate, split and persist the COVID-19 daily dataset
//!
//! # Main Commands
//!
//! ```bash
//! covid-etl run                      # Full pipeline: CSV → cleaned CSV → train/test/validation
//! covid-etl run --persist            # ... and load the cleaned data into SQLite
//! covid-etl run --report run.json    # Save the stage report as JSON
//! ```
//!
//! # Partial Runs
//!
//! ```bash
//! covid-etl clean                    # Load → validate, write the cleaned CSV
//! covid-etl split                    # Partition an existing cleaned CSV
//! covid-etl persist                  # Load an existing cleaned CSV into SQLite
//! covid-etl profile                  # Print dataset profiles, write nothing
//! ```
//!
//! Paths and split settings come from `ETL_*` variables (or `.env`) and can be
//! overridden with the flags below. Exit status is 1 on error and 2 when the
//! run produced no data.

use clap::{Parser, Subcommand};
use covid_etl::{
    init_logging, CorrelationObserver, MissingValuesObserver, Outcome, Pipeline, PipelineConfig,
    ProfileObserver, RunReport, SourceEncoding, SqlitePersister, Stage,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "covid-etl")]
#[command(about = "Clean, validate, split and persist the COVID-19 daily dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Raw input CSV
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Cleaned CSV (written by `clean`/`run`, read by `split`/`persist`)
    #[arg(long, global = true)]
    cleaned: Option<PathBuf>,

    /// Directory for train.csv, test.csv and validation.csv
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Input encoding: latin1, utf-8, cp1252 or auto
    #[arg(short, long, global = true)]
    encoding: Option<SourceEncoding>,

    /// Seed for the split shuffles
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: load, normalize, clean, validate, write, split
    Run {
        /// Also persist the cleaned dataset to SQLite
        #[arg(long)]
        persist: bool,

        /// Write the stage report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Load, normalize, clean and validate, then write the cleaned CSV
    Clean {
        /// Write the stage report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Split the cleaned CSV into train/test/validation files
    Split,

    /// Load the cleaned CSV into SQLite
    Persist,

    /// Profile the dataset at every stage without writing anything
    Profile {
        /// Rows shown at each end of the preview
        #[arg(long, default_value = "10")]
        preview_rows: usize,
    },
}

/// How a command ended when it did not fail.
enum Status {
    Done,
    NoData,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = build_config(&cli).and_then(|config| match cli.command {
        Commands::Run { persist, report } => cmd_run(config, persist, report.as_deref()),
        Commands::Clean { report } => cmd_clean(config, report.as_deref()),
        Commands::Split => cmd_split(config),
        Commands::Persist => cmd_persist(config),
        Commands::Profile { preview_rows } => cmd_profile(config, preview_rows),
    });

    match result {
        Ok(Status::Done) => {}
        Ok(Status::NoData) => std::process::exit(2),
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

type CmdResult = Result<Status, Box<dyn std::error::Error>>;

fn build_config(cli: &Cli) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(input) = &cli.input {
        config.input_path = input.clone();
    }
    if let Some(cleaned) = &cli.cleaned {
        config.cleaned_output_path = cleaned.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(encoding) = cli.encoding {
        config.encoding = encoding;
    }
    if let Some(seed) = cli.seed {
        config.split.seed = seed;
    }
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    config.validate()?;
    Ok(config)
}

fn no_data(cause: impl std::fmt::Display) -> CmdResult {
    eprintln!("⚠️  No data produced: {}", cause);
    Ok(Status::NoData)
}

fn save_report(report: &RunReport, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = path {
        report.write_json(path)?;
        eprintln!("📝 Report written to {}", path.display());
    }
    Ok(())
}

fn cmd_run(config: PipelineConfig, persist: bool, report: Option<&Path>) -> CmdResult {
    eprintln!("📄 Processing: {}", config.input_path.display());

    let mut pipeline = Pipeline::new(config.clone()).with_default_observers();
    if persist {
        let db = SqlitePersister::open(&config.database.path)?;
        pipeline = pipeline.with_persister(Box::new(db));
    }

    let outcome = pipeline.run();
    save_report(pipeline.report(), report)?;

    match outcome? {
        Outcome::Completed(artifacts) => {
            let sizes = artifacts.splits.sizes();
            eprintln!(
                "✅ {} rows cleaned → train {}, test {}, validation {}",
                artifacts.cleaned.len(),
                sizes.train,
                sizes.test,
                sizes.validation
            );
            for failure in &artifacts.write_failures {
                eprintln!("⚠️  Not written: {}", failure);
            }
            if let Some(summary) = artifacts.persisted {
                eprintln!(
                    "🗃️  {} countries, {} daily rows persisted to {}",
                    summary.countries,
                    summary.daily_rows,
                    config.database.path.display()
                );
            }
            Ok(Status::Done)
        }
        Outcome::NoData { cause } => no_data(cause),
    }
}

fn cmd_clean(config: PipelineConfig, report: Option<&Path>) -> CmdResult {
    let cleaned_path = config.cleaned_output_path.clone();
    let mut pipeline = Pipeline::new(config).with_default_observers();

    let outcome = pipeline.clean();
    save_report(pipeline.report(), report)?;

    match outcome? {
        Outcome::Completed(prepared) => {
            eprintln!(
                "✅ {} rows written to {}",
                prepared.dataset.len(),
                cleaned_path.display()
            );
            Ok(Status::Done)
        }
        Outcome::NoData { cause } => no_data(cause),
    }
}

fn cmd_split(config: PipelineConfig) -> CmdResult {
    let output_dir = config.output_dir.clone();
    match Pipeline::new(config).split()? {
        Outcome::Completed((splits, failures)) => {
            let sizes = splits.sizes();
            eprintln!(
                "✅ train {}, test {}, validation {} in {}",
                sizes.train,
                sizes.test,
                sizes.validation,
                output_dir.display()
            );
            for failure in &failures {
                eprintln!("⚠️  Not written: {}", failure);
            }
            Ok(Status::Done)
        }
        Outcome::NoData { cause } => no_data(cause),
    }
}

fn cmd_persist(config: PipelineConfig) -> CmdResult {
    let mut db = SqlitePersister::open(&config.database.path)?;
    match Pipeline::new(config).persist(&mut db)? {
        Outcome::Completed(summary) => {
            eprintln!(
                "🗃️  {} rows → {} countries, {} daily rows, {} totals",
                summary.rows, summary.countries, summary.daily_rows, summary.totals_rows
            );
            Ok(Status::Done)
        }
        Outcome::NoData { cause } => no_data(cause),
    }
}

fn cmd_profile(config: PipelineConfig, preview_rows: usize) -> CmdResult {
    let all_stages = [Stage::Load, Stage::Normalize, Stage::Clean, Stage::Validate];
    let mut pipeline = Pipeline::new(config)
        .with_observer(ProfileObserver::at(&all_stages).with_preview_rows(preview_rows))
        .with_observer(MissingValuesObserver)
        .with_observer(CorrelationObserver);

    match pipeline.profile() {
        Outcome::Completed(_) => Ok(Status::Done),
        Outcome::NoData { cause } => no_data(cause),
    }
}
