use thiserror::Error;

use crate::{SequenceNumber, StreamId};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Another writer appended to the stream first.
    #[error(
        "Concurrency conflict on stream {stream_id}: expected sequence {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        stream_id: StreamId,
        expected: SequenceNumber,
        actual: SequenceNumber,
    },

    /// The append request itself is malformed (e.g. no events).
    #[error("Invalid append to stream {stream_id}: {message}")]
    Validation { stream_id: StreamId, message: String },

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

impl EventStoreError {
    /// Returns true for the optimistic-concurrency failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
