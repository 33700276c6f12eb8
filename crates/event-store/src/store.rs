use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::TryStreamExt;

use crate::{
    EventRecord, EventStoreError, GlobalPosition, NewEvent, Result, SequenceNumber, StreamId,
};

/// A lazy, finite stream of event records.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventRecord>> + Send>>;

/// Core trait for event store implementations.
///
/// All implementations must be thread-safe (Send + Sync). `append`, `read`
/// and `read_all` are the only operations that touch I/O.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to a stream.
    ///
    /// The events receive consecutive sequence numbers starting at
    /// `expected_version + 1`. The append is atomic: either every event is
    /// stored or none is. Fails with `ConcurrencyConflict` when the stream is
    /// no longer at `expected_version`, and with `Validation` when `events`
    /// is empty.
    ///
    /// Returns the stored records in sequence order.
    async fn append(
        &self,
        stream_id: StreamId,
        expected_version: SequenceNumber,
        events: Vec<NewEvent>,
    ) -> Result<Vec<EventRecord>>;

    /// Reads a stream's records with `sequence_number >= from`, ascending.
    ///
    /// An unknown stream yields an empty stream, not an error.
    async fn read(&self, stream_id: StreamId, from: SequenceNumber) -> Result<EventStream>;

    /// Reads every record with `global_position >= from`, in insertion order.
    async fn read_all(&self, from: GlobalPosition) -> Result<EventStream>;

    /// Returns the highest sequence number of a stream (0 if it has none).
    async fn stream_version(&self, stream_id: StreamId) -> Result<SequenceNumber>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event and returns its record.
    async fn append_event(
        &self,
        stream_id: StreamId,
        expected_version: SequenceNumber,
        event: NewEvent,
    ) -> Result<EventRecord> {
        self.append(stream_id, expected_version, vec![event])
            .await?
            .pop()
            .ok_or_else(|| EventStoreError::Validation {
                stream_id,
                message: "store returned no record".to_string(),
            })
    }

    /// Reads a whole stream into memory.
    async fn read_stream(&self, stream_id: StreamId) -> Result<Vec<EventRecord>> {
        self.read(stream_id, SequenceNumber::first())
            .await?
            .try_collect()
            .await
    }

    /// Checks if a stream has any events.
    async fn stream_exists(&self, stream_id: StreamId) -> Result<bool> {
        Ok(self.stream_version(stream_id).await? > SequenceNumber::initial())
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates an append request before it reaches storage.
pub fn validate_append(
    stream_id: StreamId,
    expected_version: SequenceNumber,
    events: &[NewEvent],
) -> Result<()> {
    if events.is_empty() {
        return Err(EventStoreError::Validation {
            stream_id,
            message: "cannot append an empty event list".to_string(),
        });
    }

    if expected_version < SequenceNumber::initial() {
        return Err(EventStoreError::Validation {
            stream_id,
            message: format!("expected version {expected_version} is negative"),
        });
    }

    if let Some(blank) = events.iter().find(|e| e.event_type.trim().is_empty()) {
        return Err(EventStoreError::Validation {
            stream_id,
            message: format!("event type must not be blank (payload {})", blank.payload),
        });
    }

    Ok(())
}
