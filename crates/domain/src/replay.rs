//! Rebuilding aggregate state from an event stream.

use event_store::{EventRecord, EventStore, EventStoreError, SequenceNumber, StreamId};
use futures_util::StreamExt;
use thiserror::Error;

use crate::aggregate::{Aggregate, DomainEvent};

/// Errors raised while folding a stream.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A stored record carries a tag no event variant maps to.
    #[error("Unknown event type '{event_type}' in stream {stream_id} at sequence {sequence}")]
    UnknownEventType {
        stream_id: StreamId,
        sequence: SequenceNumber,
        event_type: String,
    },

    /// The tag is known but the payload does not match its schema.
    #[error("Malformed {event_type} payload in stream {stream_id} at sequence {sequence}: {source}")]
    Payload {
        stream_id: StreamId,
        sequence: SequenceNumber,
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// Records were not the consecutive continuation of the folded state.
    #[error("Out-of-order record in stream {stream_id}: expected sequence {expected}, got {actual}")]
    OutOfOrder {
        stream_id: StreamId,
        expected: SequenceNumber,
        actual: SequenceNumber,
    },

    /// A record from another stream was handed to the fold.
    #[error("Record from stream {actual} found while replaying stream {expected}")]
    StreamMismatch { expected: StreamId, actual: StreamId },

    /// Reading the stream failed.
    #[error("Event store error: {0}")]
    Store(#[from] EventStoreError),
}

/// Aggregate state together with the sequence number it reflects.
#[derive(Debug, Clone, PartialEq)]
pub struct Replayed<A> {
    pub state: A,

    /// Sequence number of the last folded record; 0 when nothing was folded.
    pub version: SequenceNumber,
}

impl<A: Aggregate> Replayed<A> {
    /// The aggregate's initial state at version 0.
    pub fn initial() -> Self {
        Self {
            state: A::default(),
            version: SequenceNumber::initial(),
        }
    }

    /// Returns true if at least one event was folded.
    pub fn exists(&self) -> bool {
        self.version > SequenceNumber::initial()
    }

    /// Folds one more record.
    ///
    /// The record must belong to `stream_id` and carry the sequence number
    /// directly after [`version`](Self::version).
    pub fn fold(self, stream_id: StreamId, record: &EventRecord) -> Result<Self, ReplayError> {
        if record.stream_id != stream_id {
            return Err(ReplayError::StreamMismatch {
                expected: stream_id,
                actual: record.stream_id,
            });
        }

        let expected = self.version.next();
        if record.sequence_number != expected {
            return Err(ReplayError::OutOfOrder {
                stream_id,
                expected,
                actual: record.sequence_number,
            });
        }

        let event = decode::<A::Event>(record)?;
        Ok(Self {
            state: self.state.apply(&event),
            version: record.sequence_number,
        })
    }
}

/// Decodes a stored record into its event variant.
pub fn decode<E: DomainEvent>(record: &EventRecord) -> Result<E, ReplayError> {
    match E::decode(&record.event_type, &record.payload) {
        Ok(Some(event)) => Ok(event),
        Ok(None) => {
            tracing::error!(
                stream_id = %record.stream_id,
                sequence = %record.sequence_number,
                event_type = %record.event_type,
                "unknown event type in stream"
            );
            Err(ReplayError::UnknownEventType {
                stream_id: record.stream_id,
                sequence: record.sequence_number,
                event_type: record.event_type.clone(),
            })
        }
        Err(source) => Err(ReplayError::Payload {
            stream_id: record.stream_id,
            sequence: record.sequence_number,
            event_type: record.event_type.clone(),
            source,
        }),
    }
}

/// Folds a stream's records, in order, from the initial state.
pub fn replay<'a, A, I>(stream_id: StreamId, records: I) -> Result<Replayed<A>, ReplayError>
where
    A: Aggregate,
    I: IntoIterator<Item = &'a EventRecord>,
{
    records
        .into_iter()
        .try_fold(Replayed::initial(), |replayed, record| {
            replayed.fold(stream_id, record)
        })
}

/// Reads a stream from the store and replays it as records arrive.
pub async fn load<A, S>(store: &S, stream_id: StreamId) -> Result<Replayed<A>, ReplayError>
where
    A: Aggregate,
    S: EventStore + ?Sized,
{
    let mut records = store.read(stream_id, SequenceNumber::first()).await?;
    let mut replayed = Replayed::initial();

    while let Some(record) = records.next().await {
        replayed = replayed.fold(stream_id, &record?)?;
    }

    Ok(replayed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{Booking, BookingEvent, ResourceId, TimeSlot, UserId};
    use chrono::{TimeZone, Utc};
    use event_store::{GlobalPosition, InMemoryEventStore, NewEvent};

    fn slot() -> TimeSlot {
        let start = Utc.with_ymd_and_hms(2025, 5, 12, 14, 30, 0).unwrap();
        TimeSlot::with_duration(start, chrono::Duration::minutes(60)).unwrap()
    }

    fn record(stream_id: StreamId, sequence: i64, event: &BookingEvent) -> EventRecord {
        EventRecord {
            event_id: Default::default(),
            stream_id,
            sequence_number: SequenceNumber::new(sequence),
            global_position: GlobalPosition::new(sequence),
            event_type: event.event_type().to_string(),
            payload: event.to_payload().unwrap(),
            metadata: Default::default(),
            recorded_at: Utc::now(),
        }
    }

    fn created(stream_id: StreamId) -> BookingEvent {
        BookingEvent::booking_created(
            stream_id,
            UserId::new("alice"),
            ResourceId::new("room-1"),
            slot(),
        )
    }

    #[test]
    fn empty_history_is_initial_state() {
        let replayed: Replayed<Booking> = replay(StreamId::new(), &Vec::new()).unwrap();
        assert_eq!(replayed, Replayed::initial());
        assert!(!replayed.exists());
        assert!(!replayed.state.exists());
    }

    #[test]
    fn replay_twice_is_identical() {
        let stream_id = StreamId::new();
        let records = vec![
            record(stream_id, 1, &created(stream_id)),
            record(
                stream_id,
                2,
                &BookingEvent::booking_cancelled(UserId::new("alice"), None),
            ),
        ];

        let first: Replayed<Booking> = replay(stream_id, &records).unwrap();
        let second: Replayed<Booking> = replay(stream_id, &records).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.version, SequenceNumber::new(2));
    }

    #[test]
    fn unknown_event_type_fails() {
        let stream_id = StreamId::new();
        let mut unknown = record(stream_id, 1, &created(stream_id));
        unknown.event_type = "BookingTeleported".to_string();

        let result: Result<Replayed<Booking>, _> = replay(stream_id, [&unknown]);
        match result {
            Err(ReplayError::UnknownEventType { event_type, .. }) => {
                assert_eq!(event_type, "BookingTeleported")
            }
            other => panic!("expected UnknownEventType, got {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_fails() {
        let stream_id = StreamId::new();
        let mut broken = record(stream_id, 1, &created(stream_id));
        broken.payload = serde_json::json!({"slot": 42});

        let result: Result<Replayed<Booking>, _> = replay(stream_id, [&broken]);
        assert!(matches!(result, Err(ReplayError::Payload { .. })));
    }

    #[test]
    fn skipped_sequence_is_out_of_order() {
        let stream_id = StreamId::new();
        let records = vec![
            record(stream_id, 1, &created(stream_id)),
            record(
                stream_id,
                3,
                &BookingEvent::booking_cancelled(UserId::new("alice"), None),
            ),
        ];

        let result: Result<Replayed<Booking>, _> = replay(stream_id, &records);
        assert!(matches!(result, Err(ReplayError::OutOfOrder { .. })));
    }

    #[test]
    fn foreign_record_is_rejected() {
        let stream_id = StreamId::new();
        let other = StreamId::new();
        let records = vec![record(other, 1, &created(other))];

        let result: Result<Replayed<Booking>, _> = replay(stream_id, &records);
        assert!(matches!(result, Err(ReplayError::StreamMismatch { .. })));
    }

    #[tokio::test]
    async fn load_reads_from_store() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new();
        let event = created(stream_id);
        store
            .append(
                stream_id,
                SequenceNumber::initial(),
                vec![NewEvent::new(event.event_type(), event.to_payload().unwrap())],
            )
            .await
            .unwrap();

        let replayed: Replayed<Booking> = load(&store, stream_id).await.unwrap();
        assert_eq!(replayed.version, SequenceNumber::first());
        assert_eq!(replayed.state.resource_id(), Some(&ResourceId::new("room-1")));
    }

    #[tokio::test]
    async fn load_unknown_stream_is_initial() {
        let store = InMemoryEventStore::new();
        let replayed: Replayed<Booking> = load(&store, StreamId::new()).await.unwrap();
        assert!(!replayed.exists());
    }
}
