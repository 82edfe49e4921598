//! Error types for the core crate.

/// Alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building core values from external data.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A configuration document could not be parsed.
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    /// A configuration value is out of its allowed range.
    #[error("invalid config value for {field}: {reason}")]
    ConfigValue {
        /// The offending configuration key.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
