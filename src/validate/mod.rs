//! Validation engine: one dataset, one rule, one outcome.
//!
//! Checks run in a fixed order:
//! ```text
//!  1 index materialization  fatal
//!  2 index type             fatal     (index_is_year)
//!  3 index uniqueness       fatal     (unique_index)
//!  4 index order            advisory  (monotonic_index)
//!  5 required columns       fatal     (required_columns)
//!  6 null / empty cells     advisory  (no_nulls)
//!  7 numeric type           fatal     (numeric_type)
//!  8 index gaps             advisory  (no_gaps)
//!  9 outliers               advisory  (no_outliers)
//! ```
//! The first fatal failure ends the run; advisories accumulate.

pub mod stats;

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::data::model::{CellValue, Column, Dataset};
use crate::diagnostics::Diagnostics;
use crate::rules::Rule;

/// Deltas larger than this many standard deviations are outliers.
pub const OUTLIER_SIGMAS: f64 = 4.0;

/// Offending index values quoted in an index-type error.
const MAX_QUOTED_VALUES: usize = 5;

/// `Ok` carries advisories (possibly none), `Err` the fatal failure.
pub type Outcome = Result<Vec<Advisory>, StructuralError>;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// A failure that invalidates the dataset for this run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    #[error("[{dataset}] missing-index: no column or index named '{column}'")]
    MissingIndex { dataset: String, column: String },

    #[error("[{dataset}] index-type: index '{column}' holds non-integer values: {}", quote(.values, .total))]
    NonIntegerIndex {
        dataset: String,
        column: String,
        values: Vec<CellValue>,
        total: usize,
    },

    #[error("[{dataset}] duplicate-index: index '{column}' repeats {}", join(.values))]
    DuplicateIndex {
        dataset: String,
        column: String,
        values: Vec<CellValue>,
    },

    #[error("[{dataset}] missing-columns: {}", join(.columns))]
    MissingColumns { dataset: String, columns: Vec<String> },

    #[error("[{dataset}] non-numeric-columns: {}", join(.columns))]
    NonNumericColumns { dataset: String, columns: Vec<String> },
}

/// A content problem worth reporting that does not invalidate the dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    UnorderedIndex {
        dataset: String,
        column: String,
    },
    MissingValues {
        dataset: String,
        counts: Vec<(String, usize)>,
    },
    IndexGaps {
        dataset: String,
        column: String,
        step: i64,
        missing: Vec<i64>,
    },
    Outliers {
        dataset: String,
        column: String,
        index_column: String,
        at: Vec<CellValue>,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::UnorderedIndex { dataset, column } => {
                write!(f, "[{dataset}] index '{column}' is not in ascending order")
            }
            Advisory::MissingValues { dataset, counts } => {
                let parts: Vec<String> = counts.iter().map(|(c, n)| format!("{c}={n}")).collect();
                write!(f, "[{dataset}] missing values: {}", parts.join(", "))
            }
            Advisory::IndexGaps {
                dataset,
                column,
                step,
                missing,
            } => write!(
                f,
                "[{dataset}] gaps in index '{column}' (expected step {step}): missing {}",
                join(missing)
            ),
            Advisory::Outliers {
                dataset,
                column,
                index_column,
                at,
            } => write!(
                f,
                "[{dataset}] outliers in '{column}' at {index_column} {}",
                join(at)
            ),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote(values: &[CellValue], total: &usize) -> String {
    if *total > values.len() {
        format!("{} ... ({total} rows)", join(values))
    } else {
        join(values)
    }
}

// ---------------------------------------------------------------------------
// View – the dataset with its index materialized
// ---------------------------------------------------------------------------

/// Read-only view of a dataset with the rule's index column split out.
struct View<'a> {
    dataset: &'a str,
    index: &'a Column,
    columns: Vec<&'a Column>,
}

impl<'a> View<'a> {
    /// Check 1: promote the index column, or reuse an index of that name.
    fn materialize(dataset: &'a Dataset, index_column: &str) -> Result<Self, StructuralError> {
        if let Some(index) = dataset.index.as_ref().filter(|i| i.name == index_column) {
            return Ok(View {
                dataset: &dataset.name,
                index,
                columns: dataset.columns.iter().collect(),
            });
        }

        let index = dataset
            .column(index_column)
            .ok_or_else(|| StructuralError::MissingIndex {
                dataset: dataset.name.clone(),
                column: index_column.to_string(),
            })?;
        Ok(View {
            dataset: &dataset.name,
            index,
            columns: dataset
                .columns
                .iter()
                .filter(|c| c.name != index_column)
                .collect(),
        })
    }

    fn column(&self, name: &str) -> Option<&'a Column> {
        self.columns.iter().copied().find(|c| c.name == name)
    }

    /// The rule's value columns that are actually present.
    fn value_columns(&self, rule: &Rule) -> Vec<&'a Column> {
        rule.value_columns()
            .iter()
            .filter_map(|name| self.column(name))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Run every enabled check of `rule` against `dataset`.
///
/// The dataset is only read. Notes about skipped checks go to `diag`.
pub fn validate(dataset: &Dataset, rule: &Rule, diag: &mut Diagnostics) -> Outcome {
    let name = dataset.name.as_str();
    let view = View::materialize(dataset, rule.index_column())?;
    let mut advisories = Vec::new();

    if rule.index_is_year {
        check_index_type(&view)?;
    } else {
        diag.debug(name, "index type check disabled");
    }

    if rule.unique_index {
        check_unique_index(&view)?;
    } else {
        diag.debug(name, "index uniqueness check disabled");
    }

    if rule.monotonic_index {
        advisories.extend(check_index_order(&view));
    } else {
        diag.debug(name, "index order check disabled");
    }

    if rule.required_columns {
        check_required_columns(&view, rule)?;
    } else {
        diag.debug(name, "required column check disabled");
    }

    let values = view.value_columns(rule);

    if rule.no_nulls {
        advisories.extend(check_nulls(&view, &values));
    } else {
        diag.debug(name, "null check disabled");
    }

    if rule.numeric_type {
        check_numeric(&view, &values)?;
    } else {
        diag.debug(name, "numeric type check disabled");
    }

    if rule.no_gaps {
        advisories.extend(check_gaps(&view, diag));
    } else {
        diag.debug(name, "gap check disabled");
    }

    if rule.no_outliers {
        advisories.extend(check_outliers(&view, &values, diag));
    } else {
        diag.debug(name, "outlier check disabled");
    }

    diag.debug(name, format!("{} advisory finding(s)", advisories.len()));
    Ok(advisories)
}

fn check_index_type(view: &View<'_>) -> Result<(), StructuralError> {
    let offending: Vec<&CellValue> = view
        .index
        .values
        .iter()
        .filter(|v| !matches!(v, CellValue::Integer(_)))
        .collect();
    if offending.is_empty() {
        return Ok(());
    }

    let mut quoted: Vec<CellValue> = Vec::new();
    for v in &offending {
        if quoted.len() == MAX_QUOTED_VALUES {
            break;
        }
        if !quoted.contains(v) {
            quoted.push((*v).clone());
        }
    }
    Err(StructuralError::NonIntegerIndex {
        dataset: view.dataset.to_string(),
        column: view.index.name.clone(),
        values: quoted,
        total: offending.len(),
    })
}

fn check_unique_index(view: &View<'_>) -> Result<(), StructuralError> {
    let mut counts: BTreeMap<&CellValue, usize> = BTreeMap::new();
    for v in &view.index.values {
        *counts.entry(v).or_default() += 1;
    }
    let duplicated: Vec<CellValue> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(v, _)| v.clone())
        .collect();

    if duplicated.is_empty() {
        Ok(())
    } else {
        Err(StructuralError::DuplicateIndex {
            dataset: view.dataset.to_string(),
            column: view.index.name.clone(),
            values: duplicated,
        })
    }
}

fn check_index_order(view: &View<'_>) -> Option<Advisory> {
    let ordered = view.index.values.windows(2).all(|w| w[0] <= w[1]);
    (!ordered).then(|| Advisory::UnorderedIndex {
        dataset: view.dataset.to_string(),
        column: view.index.name.clone(),
    })
}

fn check_required_columns(view: &View<'_>, rule: &Rule) -> Result<(), StructuralError> {
    let missing: Vec<String> = rule
        .value_columns()
        .iter()
        .filter(|name| view.column(name).is_none())
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(StructuralError::MissingColumns {
            dataset: view.dataset.to_string(),
            columns: missing,
        })
    }
}

fn check_nulls(view: &View<'_>, values: &[&Column]) -> Option<Advisory> {
    let counts: Vec<(String, usize)> = values
        .iter()
        .map(|c| (c.name.clone(), c.values.iter().filter(|v| v.is_missing()).count()))
        .filter(|(_, n)| *n > 0)
        .collect();

    (!counts.is_empty()).then(|| Advisory::MissingValues {
        dataset: view.dataset.to_string(),
        counts,
    })
}

fn check_numeric(view: &View<'_>, values: &[&Column]) -> Result<(), StructuralError> {
    let offending: Vec<String> = values
        .iter()
        .filter(|c| c.values.iter().any(|v| !v.is_missing() && !v.is_numeric()))
        .map(|c| c.name.clone())
        .collect();

    if offending.is_empty() {
        Ok(())
    } else {
        Err(StructuralError::NonNumericColumns {
            dataset: view.dataset.to_string(),
            columns: offending,
        })
    }
}

fn check_gaps(view: &View<'_>, diag: &mut Diagnostics) -> Option<Advisory> {
    if view.index.values.len() < 2 {
        diag.debug(view.dataset, "gap check skipped: fewer than two rows");
        return None;
    }

    let years: Vec<i64> = view.index.values.iter().filter_map(CellValue::as_i64).collect();
    let steps = stats::steps(&years);
    let mode = stats::modal_step(&steps)?;
    if steps.iter().all(|&s| s == mode) {
        return None;
    }

    let Some(missing) = stats::missing_points(&years, mode) else {
        diag.warn(
            view.dataset,
            format!("gap check skipped: index '{}' spans too wide a range", view.index.name),
        );
        return None;
    };
    if missing.is_empty() {
        return None;
    }

    Some(Advisory::IndexGaps {
        dataset: view.dataset.to_string(),
        column: view.index.name.clone(),
        step: mode.max(1),
        missing,
    })
}

fn check_outliers(view: &View<'_>, values: &[&Column], diag: &mut Diagnostics) -> Vec<Advisory> {
    let mut advisories = Vec::new();

    for column in values {
        // (row, |x[row] - x[row - 1]|) for rows where both sides are numeric.
        let deltas: Vec<(usize, f64)> = column
            .values
            .windows(2)
            .enumerate()
            .filter_map(|(i, w)| {
                let (prev, cur) = (w[0].as_f64()?, w[1].as_f64()?);
                Some((i + 1, (cur - prev).abs()))
            })
            .collect();
        if deltas.is_empty() {
            diag.debug(view.dataset, format!("outlier check skipped for '{}': no deltas", column.name));
            continue;
        }

        let magnitudes: Vec<f64> = deltas.iter().map(|(_, d)| *d).collect();
        let sigma = match stats::sample_std_dev(&magnitudes) {
            Some(s) if s > 0.0 && s.is_finite() => s,
            _ => {
                diag.debug(
                    view.dataset,
                    format!("outlier check for '{}': zero or undefined spread", column.name),
                );
                continue;
            }
        };

        let threshold = OUTLIER_SIGMAS * sigma;
        let at: Vec<CellValue> = deltas
            .iter()
            .filter(|(_, d)| *d > threshold)
            .filter_map(|(row, _)| view.index.values.get(*row).cloned())
            .collect();

        if !at.is_empty() {
            advisories.push(Advisory::Outliers {
                dataset: view.dataset.to_string(),
                column: column.name.clone(),
                index_column: view.index.name.clone(),
                at,
            });
        }
    }

    advisories
}
