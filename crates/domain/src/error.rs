//! Domain error types.

use event_store::{EventStoreError, StreamId};
use thiserror::Error;

use crate::booking::BookingError;
use crate::replay::ReplayError;

/// The slot index could not answer an availability query.
#[derive(Debug, Error)]
#[error("Availability lookup failed: {0}")]
pub struct AvailabilityError(pub String);

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// The booking aggregate rejected the command.
    #[error("Booking error: {0}")]
    Booking(#[from] BookingError),

    /// The stream could not be replayed.
    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    /// Every attempt lost the optimistic-concurrency race.
    #[error("Concurrency conflict on stream {stream_id} after {attempts} attempts")]
    ConcurrencyConflict { stream_id: StreamId, attempts: u32 },

    #[error(transparent)]
    Availability(#[from] AvailabilityError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true if the caller may resubmit the same command.
    pub fn is_retryable(&self) -> bool {
        match self {
            DomainError::ConcurrencyConflict { .. } => true,
            DomainError::EventStore(e) => e.is_conflict(),
            _ => false,
        }
    }
}
