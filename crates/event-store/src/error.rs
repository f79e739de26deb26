use thiserror::Error;

use crate::{EventNumber, ExpectedVersion, StreamId};

/// Errors that can occur when interacting with the log.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The stream was not at the version the writer expected.
    #[error(
        "Wrong expected version for stream {stream}: expected {expected}, current {}",
        display_current(.current)
    )]
    WrongExpectedVersion {
        stream: StreamId,
        expected: ExpectedVersion,
        current: Option<EventNumber>,
    },

    /// The stream has been hard-deleted.
    #[error("Stream deleted: {0}")]
    StreamDeleted(StreamId),

    /// The caller may not access the stream.
    #[error("Access denied to stream {0}")]
    AccessDenied(StreamId),

    /// The operation did not complete in time. Safe to retry.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The storage was temporarily unavailable. Safe to retry.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The append request itself was malformed.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn display_current(current: &Option<EventNumber>) -> String {
    match current {
        Some(n) => n.to_string(),
        None => "<no stream>".to_string(),
    }
}

impl EventStoreError {
    /// Returns true for failures that may succeed when retried unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            EventStoreError::Timeout(_) | EventStoreError::Unavailable(_) => true,
            EventStoreError::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

/// Result type for log operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
