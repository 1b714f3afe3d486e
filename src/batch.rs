//! Batch orchestration: every table in a store, validated in isolation.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::data::store::{Store, StoreLocation};
use crate::diagnostics::Diagnostics;
use crate::error::StoreError;
use crate::rules::Registry;
use crate::validate::{Outcome, validate};

pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Error => write!(f, "ERROR"),
        }
    }
}

/// The verdict for one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub dataset: String,
    pub status: Status,
    /// Empty when the status is `OK`.
    pub error: String,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn from_outcome(dataset: &str, outcome: Outcome) -> Self {
        match outcome {
            Ok(advisories) => ValidationResult {
                dataset: dataset.to_string(),
                status: Status::Ok,
                error: String::new(),
                warnings: advisories.iter().map(|a| a.to_string()).collect(),
            },
            Err(e) => Self::failed(dataset, e.to_string()),
        }
    }

    pub fn failed(dataset: &str, message: impl Into<String>) -> Self {
        ValidationResult {
            dataset: dataset.to_string(),
            status: Status::Error,
            error: message.into(),
            warnings: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// One entry per discovered dataset, in discovery order.
    pub results: Vec<ValidationResult>,
    pub diagnostics: Diagnostics,
}

impl BatchReport {
    pub fn ok_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn error_count(&self) -> usize {
        self.results.len() - self.ok_count()
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker threads; `0` or `1` validates sequentially.
    pub workers: usize,
    /// How long a table read may wait on a locked store.
    pub load_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            workers: 1,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Single dataset
// ---------------------------------------------------------------------------

/// Load and validate one table. Never fails: load errors, structural
/// errors and panics all become an `ERROR` result.
pub fn validate_one(
    store: &dyn Store,
    name: &str,
    registry: &Registry,
    diag: &mut Diagnostics,
) -> ValidationResult {
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        let dataset = match store.read_table(name) {
            Ok(ds) => ds,
            Err(e) => {
                diag.warn(name, format!("load failed: {e}"));
                return ValidationResult::failed(name, format!("[{name}] load failed: {e}"));
            }
        };
        let rule = registry.rule_for(name);
        if !registry.contains(name) {
            diag.debug(name, "no override, using the default rule");
        }
        ValidationResult::from_outcome(name, validate(&dataset, rule, diag))
    }));

    let result = attempt.unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        diag.warn(name, format!("validation aborted: {message}"));
        ValidationResult::failed(name, format!("[{name}] validation aborted: {message}"))
    });

    match result.status {
        Status::Ok => diag.info(name, format!("OK with {} warning(s)", result.warnings.len())),
        Status::Error => diag.info(name, format!("ERROR: {}", result.error)),
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Whole store
// ---------------------------------------------------------------------------

/// Validate every table of an already opened store, one after another.
///
/// Only a failure to enumerate the tables is returned as an error.
pub fn collect_results(
    store: &dyn Store,
    registry: &Registry,
    diag: &mut Diagnostics,
) -> Result<Vec<ValidationResult>, StoreError> {
    let names = store.list_tables()?;
    Ok(names
        .iter()
        .map(|name| validate_one(store, name, registry, diag))
        .collect())
}

/// Open the store at `location` and validate all of its tables.
///
/// With more than one worker each thread opens its own read-only handle;
/// results keep discovery order either way.
pub fn run_batch(
    location: &StoreLocation,
    registry: &Registry,
    options: &BatchOptions,
) -> Result<BatchReport, StoreError> {
    let store = location.open(options.load_timeout)?;
    let mut diagnostics = Diagnostics::new();

    let results = if options.workers > 1 {
        let names = store.list_tables()?;
        drop(store);
        info!(
            "validating {} dataset(s) from {} on {} workers",
            names.len(),
            location.path().display(),
            options.workers
        );
        run_parallel(location, &names, registry, options, &mut diagnostics)
    } else {
        info!("validating datasets from {}", location.path().display());
        collect_results(store.as_ref(), registry, &mut diagnostics)?
    };

    let report = BatchReport {
        results,
        diagnostics,
    };
    info!(
        "batch finished: {} OK, {} ERROR",
        report.ok_count(),
        report.error_count()
    );
    Ok(report)
}

fn run_parallel(
    location: &StoreLocation,
    names: &[String],
    registry: &Registry,
    options: &BatchOptions,
    diagnostics: &mut Diagnostics,
) -> Vec<ValidationResult> {
    let validate_with_handle = |handle: &mut Result<Box<dyn Store + Send>, StoreError>, name: &String| {
        let mut diag = Diagnostics::new();
        let result = match handle {
            Ok(store) => validate_one(store.as_ref(), name, registry, &mut diag),
            Err(e) => {
                diag.warn(name, format!("cannot open store: {e}"));
                ValidationResult::failed(name, format!("[{name}] cannot open store: {e}"))
            }
        };
        (result, diag)
    };

    let outputs: Vec<(ValidationResult, Diagnostics)> =
        match rayon::ThreadPoolBuilder::new().num_threads(options.workers).build() {
            Ok(pool) => pool.install(|| {
                names
                    .par_iter()
                    .map_init(|| location.open(options.load_timeout), validate_with_handle)
                    .collect()
            }),
            Err(e) => {
                warn!("cannot start {} workers ({e}), validating sequentially", options.workers);
                let mut handle = location.open(options.load_timeout);
                names
                    .iter()
                    .map(|name| validate_with_handle(&mut handle, name))
                    .collect()
            }
        };

    outputs
        .into_iter()
        .map(|(result, diag)| {
            diagnostics.merge(diag);
            result
        })
        .collect()
}
