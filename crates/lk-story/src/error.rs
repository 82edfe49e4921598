//! Error types for the story engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for story operations.
pub type StoryResult<T> = Result<T, StoryError>;

/// Errors raised while loading story definitions.
///
/// Runtime lookups never produce these; they fail closed with `None` or
/// `false` instead.
#[derive(Debug, Error)]
pub enum StoryError {
    /// The document does not have the expected shape.
    #[error("malformed story definitions: {0}")]
    Malformed(String),

    /// The document is not valid JSON or a field has the wrong type.
    #[error("invalid story definitions: {0}")]
    Json(#[from] serde_json::Error),

    /// The definition file could not be read.
    #[error("cannot read story definitions from {path}: {source}")]
    Io {
        /// The file that was requested.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}
