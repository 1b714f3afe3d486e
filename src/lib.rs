//! Rule-driven data-quality validation for year-indexed tables.
//!
//! ```text
//!  rules (YAML/JSON) ──► Registry ─┐
//!                                  ▼
//!  Store ──► Dataset ──► validate ──► ValidationResult ──► report / csv / json
//! ```

pub mod batch;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod report;
pub mod rules;
pub mod validate;

pub use batch::{BatchOptions, BatchReport, Status, ValidationResult, collect_results, run_batch};
pub use data::model::{CellValue, Column, Dataset};
pub use data::store::{DirectoryStore, SqliteStore, Store, StoreLocation};
pub use diagnostics::Diagnostics;
pub use error::{ConfigError, ReportError, StoreError};
pub use rules::{Registry, Rule, RuleSource, default_rule, load_registry};
pub use validate::{Advisory, Outcome, StructuralError, validate};
