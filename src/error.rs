//! Error types for the local history store.

use crate::types::SnapshotId;
use thiserror::Error;

/// Main error type for history operations.
///
/// Persistence failures inside `capture` and `prune_older_than` never
/// reach callers as this type; they are logged and the in-memory state
/// stays authoritative.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Retention window must be positive, got {0} days")]
    InvalidRetention(i64),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(SnapshotId),

    #[error("No snapshots recorded for {0}")]
    NoSnapshots(String),

    #[error("Snapshot {0} has no older snapshot to compare against")]
    NoPreviousSnapshot(SnapshotId),

    #[error("Snapshots belong to different files: {left} and {right}")]
    MismatchedFiles { left: String, right: String },

    #[error("Subscription was dropped")]
    SubscriptionDropped,
}

impl From<serde_json::Error> for HistoryError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            HistoryError::Deserialization(e.to_string())
        } else {
            HistoryError::Serialization(e.to_string())
        }
    }
}

impl From<toml::de::Error> for HistoryError {
    fn from(e: toml::de::Error) -> Self {
        HistoryError::Config(e.to_string())
    }
}

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;
