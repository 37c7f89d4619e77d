use rtcalib::RtModelError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RescoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column '{column}' ({context})")]
    MissingColumn { column: String, context: String },

    #[error("Unable to parse value '{value}' in column '{column}' (row {row})")]
    ParseValue {
        column: String,
        value: String,
        row: usize,
    },

    #[error("Row {row} has {got} cells, expected {expected}")]
    RowLength {
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("Malformed match identifier '{0}', expected <source>_<scan>_<peptide>")]
    MalformedIdentifier(String),

    #[error(
        "{program} exited with status {status:?} (stdout logged to {}): {stderr}",
        .log.display()
    )]
    ClassifierFailed {
        program: String,
        status: Option<i32>,
        log: PathBuf,
        stderr: String,
    },

    #[error("{program} did not finish within {seconds}s and was killed")]
    ClassifierTimeout { program: String, seconds: u64 },

    #[error("{failed} of {total} binding predictions failed, first: {first}")]
    PredictorFailed {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("Retention time model error: {0}")]
    Model(#[from] RtModelError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RescoreError {
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    pub fn missing_column(column: &str, context: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.to_string(),
            context: context.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RescoreError>;
