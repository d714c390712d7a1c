//! High-level pipeline API.
//!
//! Combines every stage into one run:
//! load, normalize, clean, validate, write the cleaned CSV, partition and
//! (optionally) persist.
//!
//! # Example
//!
//! ```rust,ignore
//! use covid_etl::{Pipeline, PipelineConfig, RunOutcome};
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::from_env()?).with_default_observers();
//! match pipeline.run()? {
//!     RunOutcome::Completed(artifacts) => println!("{} rows", artifacts.cleaned.len()),
//!     RunOutcome::NoData { cause } => eprintln!("no data: {}", cause),
//! }
//! ```

use std::path::Path;

use crate::config::{PipelineConfig, SourceEncoding};
use crate::error::{LoadResult, OutputError, PipelineError, PipelineResult};
use crate::export::write_csv;
use crate::models::Dataset;
use crate::observe::{default_observers, StageObserver};
use crate::parser::load_csv;
use crate::partition::{partition, Splits};
use crate::persist::{PersistSummary, Persister};
use crate::report::{RunReport, Stage};
use crate::validation::{validate, ValidationSummary};

use super::clean::{clean, CleanSummary};
use super::normalize::{normalize, NormalizeSummary};

/// Result of a run that did not fail outright.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed(T),
    /// Nothing to hand downstream: the input could not be loaded or was too
    /// small to partition.
    NoData { cause: PipelineError },
}

impl<T> Outcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(v) => Some(v),
            Outcome::NoData { .. } => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Outcome::NoData { .. })
    }
}

/// Outcome of a full run.
pub type RunOutcome = Outcome<RunArtifacts>;

/// The dataset after normalize, clean and validate.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub dataset: Dataset,
    pub normalize: NormalizeSummary,
    pub clean: CleanSummary,
    pub validation: ValidationSummary,
}

/// Everything a completed run produced.
#[derive(Debug)]
pub struct RunArtifacts {
    pub cleaned: Dataset,
    pub splits: Splits,
    pub normalize: NormalizeSummary,
    pub clean: CleanSummary,
    pub validation: ValidationSummary,
    /// Outputs that could not be written; the others were.
    pub write_failures: Vec<OutputError>,
    pub persisted: Option<PersistSummary>,
}

/// A configured run.
pub struct Pipeline {
    config: PipelineConfig,
    observers: Vec<Box<dyn StageObserver>>,
    persister: Option<Box<dyn Persister>>,
    report: RunReport,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            observers: Vec::new(),
            persister: None,
            report: RunReport::new(),
        }
    }

    pub fn with_observer<O: StageObserver + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Profile, missing-value and correlation observers.
    pub fn with_default_observers(mut self) -> Self {
        self.observers.extend(default_observers());
        self
    }

    /// Persist the cleaned dataset at the end of [`Pipeline::run`].
    pub fn with_persister(mut self, persister: Box<dyn Persister>) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// Run every stage.
    ///
    /// Load failures and infeasible splits end the run with
    /// [`Outcome::NoData`]. Output write failures are collected in
    /// [`RunArtifacts::write_failures`]. Configuration and persistence
    /// failures are errors.
    pub fn run(&mut self) -> PipelineResult<RunOutcome> {
        self.config.validate()?;
        let span = tracing::info_span!("run", run_id = %self.report.run_id);
        let _guard = span.enter();

        let prepared = match self.prepare() {
            Ok(p) => p,
            Err(e) => return Ok(Outcome::NoData { cause: e.into() }),
        };

        let mut write_failures = Vec::new();
        if let Err(e) = self.write_cleaned(&prepared.dataset) {
            write_failures.push(e);
        }

        let (splits, failures) = match partition(
            &prepared.dataset,
            &self.config.split,
            &self.config.output_dir,
            &mut self.report,
        ) {
            Ok(v) => v,
            Err(e) => return Ok(Outcome::NoData { cause: e.into() }),
        };
        write_failures.extend(failures);

        let persisted = match self.persister.take() {
            Some(mut persister) => {
                let summary = self.persist_with(&mut *persister, &prepared.dataset);
                self.persister = Some(persister);
                Some(summary?)
            }
            None => None,
        };

        Ok(Outcome::Completed(RunArtifacts {
            cleaned: prepared.dataset,
            splits,
            normalize: prepared.normalize,
            clean: prepared.clean,
            validation: prepared.validation,
            write_failures,
            persisted,
        }))
    }

    /// Load, normalize, clean and validate, then write the cleaned CSV.
    ///
    /// Unlike [`Pipeline::run`], a failed write is an error: the cleaned
    /// file is the only output.
    pub fn clean(&mut self) -> PipelineResult<Outcome<Prepared>> {
        let prepared = match self.prepare() {
            Ok(p) => p,
            Err(e) => return Ok(Outcome::NoData { cause: e.into() }),
        };
        self.write_cleaned(&prepared.dataset)?;
        Ok(Outcome::Completed(prepared))
    }

    /// Partition an already cleaned CSV.
    pub fn split(&mut self) -> PipelineResult<Outcome<(Splits, Vec<OutputError>)>> {
        self.config.validate()?;
        let dataset = match self.load_cleaned() {
            Ok(ds) => ds,
            Err(e) => return Ok(Outcome::NoData { cause: e.into() }),
        };
        match partition(
            &dataset,
            &self.config.split,
            &self.config.output_dir,
            &mut self.report,
        ) {
            Ok(v) => Ok(Outcome::Completed(v)),
            Err(e) => Ok(Outcome::NoData { cause: e.into() }),
        }
    }

    /// Load an already cleaned CSV into `persister`.
    pub fn persist(&mut self, persister: &mut dyn Persister) -> PipelineResult<Outcome<PersistSummary>> {
        let dataset = match self.load_cleaned() {
            Ok(ds) => ds,
            Err(e) => return Ok(Outcome::NoData { cause: e.into() }),
        };
        let summary = self.persist_with(persister, &dataset)?;
        Ok(Outcome::Completed(summary))
    }

    /// Run the preparation stages and observers without writing anything.
    pub fn profile(&mut self) -> Outcome<Prepared> {
        match self.prepare() {
            Ok(p) => Outcome::Completed(p),
            Err(e) => Outcome::NoData { cause: e.into() },
        }
    }

    fn prepare(&mut self) -> LoadResult<Prepared> {
        let input = self.config.input_path.clone();
        let mut dataset = self.load(&input, self.config.encoding)?;

        let normalize = normalize(&mut dataset, &mut self.report);
        self.notify(Stage::Normalize, &dataset);

        let clean = clean(&mut dataset, &mut self.report);
        self.notify(Stage::Clean, &dataset);

        let validation = validate(&mut dataset, &mut self.report);
        self.notify(Stage::Validate, &dataset);

        Ok(Prepared {
            dataset,
            normalize,
            clean,
            validation,
        })
    }

    fn load(&mut self, path: &Path, encoding: SourceEncoding) -> LoadResult<Dataset> {
        self.report.info(
            Stage::Load,
            format!("Reading {} ({})", path.display(), self.config.dataset),
        );
        let loaded = match load_csv(path, encoding) {
            Ok(l) => l,
            Err(e) => {
                self.report.error(Stage::Load, e.to_string());
                return Err(e);
            }
        };
        self.report
            .success(Stage::Load, format!("Decoded as {}", loaded.encoding));
        self.report.success(
            Stage::Load,
            format!(
                "Read {} rows x {} columns (separator '{}')",
                loaded.dataset.len(),
                loaded.dataset.width(),
                loaded.delimiter
            ),
        );
        self.notify(Stage::Load, &loaded.dataset);
        Ok(loaded.dataset)
    }

    /// The cleaned file is written by this crate, always as UTF-8.
    fn load_cleaned(&mut self) -> LoadResult<Dataset> {
        let path = self.config.cleaned_output_path.clone();
        self.load(&path, SourceEncoding::Utf8)
    }

    fn write_cleaned(&mut self, dataset: &Dataset) -> Result<(), OutputError> {
        let path = &self.config.cleaned_output_path;
        match write_csv(dataset, path) {
            Ok(()) => {
                self.report.success(
                    Stage::Validate,
                    format!("Cleaned dataset written to {}", path.display()),
                );
                Ok(())
            }
            Err(e) => {
                self.report.error(Stage::Validate, e.to_string());
                Err(e)
            }
        }
    }

    fn persist_with(
        &mut self,
        persister: &mut dyn Persister,
        dataset: &Dataset,
    ) -> Result<PersistSummary, PipelineError> {
        self.report.info(Stage::Persist, "Persisting cleaned dataset...");
        let result = persister
            .ensure_schema()
            .and_then(|()| persister.persist(dataset));
        match result {
            Ok(summary) => {
                self.report.success(
                    Stage::Persist,
                    format!(
                        "{} countries, {} daily rows, {} totals",
                        summary.countries, summary.daily_rows, summary.totals_rows
                    ),
                );
                Ok(summary)
            }
            Err(e) => {
                self.report.error(Stage::Persist, e.to_string());
                Err(e.into())
            }
        }
    }

    fn notify(&mut self, stage: Stage, dataset: &Dataset) {
        for observer in self.observers.iter_mut().filter(|o| o.wants(stage)) {
            observer.observe(stage, dataset, &mut self.report);
        }
    }
}
