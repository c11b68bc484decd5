use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HrError {
    #[error("missing required input {kind} for {date}")]
    MissingInput { kind: &'static str, date: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no examples for calibration")]
    NoExamples,

    #[error("unsupported calibration method: {0}")]
    UnsupportedMethod(String),
}

pub type HrResult<T> = std::result::Result<T, HrError>;
