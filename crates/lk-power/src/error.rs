//! Error types for capability definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for power definition loading.
pub type PowerResult<T> = Result<T, PowerError>;

/// Errors raised while loading power definitions.
#[derive(Debug, Error)]
pub enum PowerError {
    /// The document does not have the expected shape.
    #[error("malformed power definitions: {0}")]
    Malformed(String),

    /// The document is not valid JSON or a field has the wrong type.
    #[error("invalid power definitions: {0}")]
    Json(#[from] serde_json::Error),

    /// The definition file could not be read.
    #[error("cannot read power definitions from {path}: {source}")]
    Io {
        /// The file that was requested.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}
