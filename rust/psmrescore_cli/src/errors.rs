use psmrescore::RescoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Error reading file {}: {source}", .path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Error interpreting the config: {0}")]
    Config(String),

    #[error(transparent)]
    Rescore(#[from] RescoreError),
}
