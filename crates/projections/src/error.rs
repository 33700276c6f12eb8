//! Projection error types.

use event_store::{EventStoreError, SequenceNumber, StreamId};
use thiserror::Error;

use domain::ReplayError;

/// Errors that can occur while maintaining or querying read models.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A record could not be folded into the read model.
    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    /// A record arrived before its predecessor was applied.
    #[error(
        "Projection gap in stream {stream_id}: last applied {last_applied}, received {received}"
    )]
    Gap {
        stream_id: StreamId,
        last_applied: SequenceNumber,
        received: SequenceNumber,
    },

    /// The read model storage backend failed.
    #[error("Read model storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A stored read model could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProjectionError {
    pub fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_is_detected() {
        let err = ProjectionError::Gap {
            stream_id: StreamId::new(),
            last_applied: SequenceNumber::new(3),
            received: SequenceNumber::new(5),
        };
        assert!(err.is_gap());
        assert!(err.to_string().contains("last applied 3, received 5"));
    }

    #[test]
    fn storage_errors_are_not_gaps() {
        let err = ProjectionError::Storage(sqlx::Error::PoolTimedOut);
        assert!(!err.is_gap());
    }
}
