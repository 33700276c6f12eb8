use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream;
use tokio::sync::RwLock;

use crate::{
    EventId, EventRecord, EventStoreError, GlobalPosition, NewEvent, Result, SequenceNumber,
    StreamId,
    store::{EventStore, EventStream, validate_append},
};

/// The log plus a per-stream index into it.
///
/// `records[i]` has global position `i + 1`.
#[derive(Default)]
struct Log {
    records: Vec<EventRecord>,
    streams: HashMap<StreamId, Vec<usize>>,
}

impl Log {
    fn version_of(&self, stream_id: StreamId) -> SequenceNumber {
        let len = self.streams.get(&stream_id).map_or(0, Vec::len);
        SequenceNumber::new(len as i64)
    }
}

/// In-memory event store implementation.
///
/// Appends hold the write lock only for the version check and the push, so
/// the critical section never spans I/O. Reads copy the matching records out
/// before returning a stream.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.records.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        stream_id: StreamId,
        expected_version: SequenceNumber,
        events: Vec<NewEvent>,
    ) -> Result<Vec<EventRecord>> {
        validate_append(stream_id, expected_version, &events)?;

        let mut log = self.log.write().await;

        let actual = log.version_of(stream_id);
        if actual != expected_version {
            metrics::counter!("event_store_concurrency_conflicts").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id,
                expected: expected_version,
                actual,
            });
        }

        // recorded_at must not go backwards within a stream, even if the
        // wall clock does.
        let last_recorded = log
            .streams
            .get(&stream_id)
            .and_then(|idx| idx.last())
            .map(|&i| log.records[i].recorded_at);
        let now = Utc::now();
        let recorded_at = match last_recorded {
            Some(last) if last > now => last,
            _ => now,
        };

        let mut sequence = expected_version;
        let mut appended = Vec::with_capacity(events.len());
        for event in events {
            sequence = sequence.next();
            let index = log.records.len();
            let record = EventRecord {
                event_id: EventId::new(),
                stream_id,
                sequence_number: sequence,
                global_position: GlobalPosition::new(index as i64 + 1),
                event_type: event.event_type,
                payload: event.payload,
                metadata: event.metadata,
                recorded_at,
            };
            log.records.push(record.clone());
            log.streams.entry(stream_id).or_default().push(index);
            appended.push(record);
        }

        metrics::counter!("event_store_events_appended").increment(appended.len() as u64);
        tracing::debug!(%stream_id, new_version = %sequence, "appended events");

        Ok(appended)
    }

    async fn read(&self, stream_id: StreamId, from: SequenceNumber) -> Result<EventStream> {
        let log = self.log.read().await;
        let skip = (from.as_i64().max(1) - 1) as usize;
        let records: Vec<EventRecord> = log
            .streams
            .get(&stream_id)
            .map(|idx| {
                idx.iter()
                    .skip(skip)
                    .map(|&i| log.records[i].clone())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::pin(stream::iter(records.into_iter().map(Ok))))
    }

    async fn read_all(&self, from: GlobalPosition) -> Result<EventStream> {
        let log = self.log.read().await;
        let skip = (from.as_i64().max(1) - 1) as usize;
        let records: Vec<EventRecord> = log.records.iter().skip(skip).cloned().collect();

        Ok(Box::pin(stream::iter(records.into_iter().map(Ok))))
    }

    async fn stream_version(&self, stream_id: StreamId) -> Result<SequenceNumber> {
        Ok(self.log.read().await.version_of(stream_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventStoreExt;
    use futures_util::StreamExt;

    fn new_event(event_type: &str) -> NewEvent {
        NewEvent::new(event_type, serde_json::json!({"test": true}))
    }

    #[tokio::test]
    async fn append_single_event() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new();

        let appended = store
            .append(stream_id, SequenceNumber::initial(), vec![new_event("Created")])
            .await
            .unwrap();

        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].sequence_number, SequenceNumber::first());
        assert_eq!(appended[0].global_position, GlobalPosition::start());
        assert_eq!(store.read_stream(stream_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_assigns_consecutive_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new();

        store
            .append(stream_id, SequenceNumber::initial(), vec![new_event("Created")])
            .await
            .unwrap();
        let appended = store
            .append(
                stream_id,
                SequenceNumber::first(),
                vec![new_event("Updated"), new_event("Updated"), new_event("Closed")],
            )
            .await
            .unwrap();

        let sequences: Vec<i64> = appended.iter().map(|r| r.sequence_number.as_i64()).collect();
        assert_eq!(sequences, vec![2, 3, 4]);
        assert_eq!(
            store.stream_version(stream_id).await.unwrap(),
            SequenceNumber::new(4)
        );
    }

    #[tokio::test]
    async fn concurrency_conflict_on_stale_version() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new();

        store
            .append(stream_id, SequenceNumber::initial(), vec![new_event("Created")])
            .await
            .unwrap();

        let result = store
            .append(stream_id, SequenceNumber::initial(), vec![new_event("Created")])
            .await;

        match result {
            Err(EventStoreError::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, SequenceNumber::initial());
                assert_eq!(actual, SequenceNumber::first());
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn expected_version_ahead_of_stream_conflicts() {
        let store = InMemoryEventStore::new();
        let result = store
            .append(StreamId::new(), SequenceNumber::new(2), vec![new_event("X")])
            .await;
        assert!(result.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn empty_append_leaves_stream_unchanged() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new();
        store
            .append(stream_id, SequenceNumber::initial(), vec![new_event("Created")])
            .await
            .unwrap();

        let result = store.append(stream_id, SequenceNumber::first(), vec![]).await;

        assert!(matches!(result, Err(EventStoreError::Validation { .. })));
        assert_eq!(
            store.stream_version(stream_id).await.unwrap(),
            SequenceNumber::first()
        );
    }

    #[tokio::test]
    async fn concurrent_appends_with_same_version_have_one_winner() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(stream_id, SequenceNumber::initial(), vec![new_event("Created")])
                    .await
            }));
        }

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) if e.is_conflict() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn read_from_sequence_number() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new();
        store
            .append(
                stream_id,
                SequenceNumber::initial(),
                vec![new_event("A"), new_event("B"), new_event("C")],
            )
            .await
            .unwrap();

        let records: Vec<_> = store
            .read(stream_id, SequenceNumber::new(2))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].as_ref().unwrap().sequence_number,
            SequenceNumber::new(2)
        );
        assert_eq!(records[1].as_ref().unwrap().event_type, "C");
    }

    #[tokio::test]
    async fn read_unknown_stream_is_empty() {
        let store = InMemoryEventStore::new();
        let records = store.read_stream(StreamId::new()).await.unwrap();
        assert!(records.is_empty());
        assert!(!store.stream_exists(StreamId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn read_all_is_in_global_order_across_streams() {
        let store = InMemoryEventStore::new();
        let a = StreamId::new();
        let b = StreamId::new();

        store
            .append(a, SequenceNumber::initial(), vec![new_event("A1")])
            .await
            .unwrap();
        store
            .append(b, SequenceNumber::initial(), vec![new_event("B1")])
            .await
            .unwrap();
        store
            .append(a, SequenceNumber::first(), vec![new_event("A2")])
            .await
            .unwrap();

        let all: Vec<EventRecord> = store
            .read_all(GlobalPosition::start())
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        let types: Vec<&str> = all.iter().map(|r| r.event_type.as_str()).collect();
        assert_eq!(types, vec!["A1", "B1", "A2"]);

        let tail: Vec<_> = store
            .read_all(GlobalPosition::new(3))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(tail.len(), 1);
    }

    #[tokio::test]
    async fn recorded_at_is_monotonic_per_stream() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::new();
        for i in 0..5 {
            store
                .append(stream_id, SequenceNumber::new(i), vec![new_event("Tick")])
                .await
                .unwrap();
        }

        let records = store.read_stream(stream_id).await.unwrap();
        assert!(
            records
                .windows(2)
                .all(|w| w[0].recorded_at <= w[1].recorded_at)
        );
    }
}
