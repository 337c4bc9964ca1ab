//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{GenerationError, SetupError, StorageError};
use thiserror::Error;

/// Everything a route handler can fail with.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Input(String),
}

/// Map domain errors to a single line for CLI output. Generation errors lead with their
/// stable code so scripts can match on it.
pub fn map_error(e: &CliError) -> String {
    match e {
        CliError::Generation(err) => format!("[{}] {}", err.code(), err),
        other => other.to_string(),
    }
}
