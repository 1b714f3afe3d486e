use std::path::PathBuf;

use thiserror::Error;

/// A rule source that cannot be trusted. Aborts the whole run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read rule source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported rule source extension: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("malformed YAML rule source: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("malformed JSON rule source: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid override for '{dataset}': {reason}")]
    InvalidOverride { dataset: String, reason: String },
}

/// Failures talking to a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store not found: {0}")]
    NotFound(PathBuf),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("cannot load table '{table}': {message}")]
    Load { table: String, message: String },
}

/// Failures writing results or reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
