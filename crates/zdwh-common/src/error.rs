//! Error types shared by the ZDWH crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, ZdwhError>;

/// Errors raised by the shared helpers
#[derive(Error, Debug)]
pub enum ZdwhError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("Invalid identifier '{0}': expected [A-Za-z_][A-Za-z0-9_]* (optionally schema-qualified)")]
    InvalidIdentifier(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
