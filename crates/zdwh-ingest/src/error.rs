//! Error types for sync runs
//!
//! Three failure classes matter to operators:
//!
//! - **auth / transport**: the helpdesk API refused or could not be reached
//!   ([`SyncError::UnexpectedStatus`], [`SyncError::Transport`])
//! - **projection**: a record did not have the expected shape
//!   ([`SyncError::Projection`])
//! - **warehouse**: a staging or reconciliation statement failed
//!   ([`SyncError::Warehouse`])
//!
//! Nothing is retried. Callers surface the error and exit.

use thiserror::Error;

use crate::reconciler::ReconcileState;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failures while turning an API page into warehouse rows
#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("Response has no '{envelope}' array")]
    MissingEnvelope { envelope: String },

    #[error("Record {index} is not a JSON object")]
    NotAnObject { index: usize },

    #[error("Record {index} is missing field '{field}'")]
    MissingField { field: String, index: usize },

    #[error("Record {index} field '{field}' has malformed timestamp '{value}': {reason}")]
    InvalidTimestamp {
        field: String,
        index: usize,
        value: String,
        reason: String,
    },

    #[error("Record {index} field '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        index: usize,
        expected: &'static str,
        found: String,
    },

    #[error("Invalid next_page cursor '{value}': {reason}")]
    InvalidCursor { value: String, reason: String },
}

/// Sync pipeline error
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Helpdesk API request to {url} returned HTTP {status}. Check the API credentials and base URL.")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Helpdesk API transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] sqlx::Error),

    #[error("Row for {table} has {actual} values, expected {expected}")]
    RowShape {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid reconciliation step for {table}: cannot {action} while {state:?}")]
    InvalidTransition {
        table: String,
        action: &'static str,
        state: ReconcileState,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration error: {0}")]
    Settings(#[from] ::config::ConfigError),

    #[error(transparent)]
    Common(#[from] zdwh_common::ZdwhError),
}

impl SyncError {
    /// Helper to create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for the failure class that aborts a run before staging is touched
    /// when it happens on the first request.
    pub fn is_auth_or_transport(&self) -> bool {
        matches!(self, Self::UnexpectedStatus { .. } | Self::Transport(_))
    }

    /// True when the error came from a warehouse statement
    pub fn is_warehouse(&self) -> bool {
        matches!(self, Self::Warehouse(_) | Self::RowShape { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let status = SyncError::UnexpectedStatus {
            url: "https://example.zendesk.com/api/v2/brands.json".to_string(),
            status: 401,
        };
        assert!(status.is_auth_or_transport());
        assert!(!status.is_warehouse());
        assert!(status.to_string().contains("401"));

        let projection: SyncError = ProjectionError::MissingField {
            field: "name".to_string(),
            index: 3,
        }
        .into();
        assert!(!projection.is_auth_or_transport());
        assert!(projection.to_string().contains("Record 3 is missing field 'name'"));
    }
}
