use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::{StreamExt, stream};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EventId, EventMetadata, EventRecord, EventStoreError, GlobalPosition, NewEvent, Result,
    SequenceNumber, StreamId,
    store::{EventStore, EventStream, validate_append},
};

/// Rows fetched per round trip when streaming.
const PAGE_SIZE: i64 = 256;

const SELECT_STREAM: &str = r#"
    SELECT global_position, event_id, stream_id, sequence_number, event_type, payload, metadata, recorded_at
    FROM events
    WHERE stream_id = $1 AND sequence_number >= $2
    ORDER BY sequence_number ASC
    LIMIT $3
"#;

const SELECT_ALL: &str = r#"
    SELECT global_position, event_id, stream_id, sequence_number, event_type, payload, metadata, recorded_at
    FROM events
    WHERE global_position >= $1
    ORDER BY global_position ASC
    LIMIT $2
"#;

/// Advisory lock key held by every append until it commits.
///
/// `global_position` values are handed out at insert time but only become
/// visible at commit; holding this lock across the insert and the commit
/// makes positions visible in order, so a `read_all` cursor never passes a
/// position that is still in flight.
pub const APPEND_LOCK_KEY: i64 = 0x6576_656e_7473; // "events"

/// PostgreSQL-backed event store implementation.
///
/// The `unique_stream_sequence` constraint on `(stream_id, sequence_number)`
/// settles races between writers on the same stream. Appends to different
/// streams are serialized by [`APPEND_LOCK_KEY`] for the length of their
/// insert and commit.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations (event log and read-model tables).
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<EventRecord> {
        let metadata: EventMetadata = serde_json::from_value(row.try_get("metadata")?)?;

        Ok(EventRecord {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            stream_id: StreamId::from_uuid(row.try_get::<Uuid, _>("stream_id")?),
            sequence_number: SequenceNumber::new(row.try_get("sequence_number")?),
            global_position: GlobalPosition::new(row.try_get("global_position")?),
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            metadata,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

/// Streams records page by page, advancing a keyset cursor.
///
/// Each page is fetched only when the consumer reaches it, so large streams
/// are never held in memory at once.
fn paged<F>(start: i64, fetch_page: F, next_cursor: fn(&EventRecord) -> i64) -> EventStream
where
    F: Fn(i64) -> BoxFuture<'static, Result<Vec<EventRecord>>> + Send + 'static,
{
    let pages = stream::unfold(Some(start), move |cursor| {
        let page = cursor.map(&fetch_page);
        async move {
            match page?.await {
                Ok(records) if records.is_empty() => None,
                Ok(records) => {
                    let next = if records.len() as i64 == PAGE_SIZE {
                        records.last().map(next_cursor)
                    } else {
                        None
                    };
                    let items: Vec<Result<EventRecord>> = records.into_iter().map(Ok).collect();
                    Some((items, next))
                }
                Err(e) => Some((vec![Err(e)], None)),
            }
        }
    });

    Box::pin(pages.flat_map(stream::iter))
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(
        &self,
        stream_id: StreamId,
        expected_version: SequenceNumber,
        events: Vec<NewEvent>,
    ) -> Result<Vec<EventRecord>> {
        validate_append(stream_id, expected_version, &events)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let (current, last_recorded): (Option<i64>, Option<DateTime<Utc>>) = sqlx::query_as(
            "SELECT MAX(sequence_number), MAX(recorded_at) FROM events WHERE stream_id = $1",
        )
        .bind(stream_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        let actual = SequenceNumber::new(current.unwrap_or(0));
        if actual != expected_version {
            metrics::counter!("event_store_concurrency_conflicts").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id,
                expected: expected_version,
                actual,
            });
        }

        let now = Utc::now();
        let recorded_at = match last_recorded {
            Some(last) if last > now => last,
            _ => now,
        };

        let mut sequence = expected_version;
        let mut appended = Vec::with_capacity(events.len());
        for event in events {
            sequence = sequence.next();
            let event_id = EventId::new();
            let metadata_json = serde_json::to_value(&event.metadata)?;

            let global_position: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO events (event_id, stream_id, sequence_number, event_type, payload, metadata, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING global_position
                "#,
            )
            .bind(event_id.as_uuid())
            .bind(stream_id.as_uuid())
            .bind(sequence.as_i64())
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(metadata_json)
            .bind(recorded_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent writer inserted the same sequence number first.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_stream_sequence")
                {
                    metrics::counter!("event_store_concurrency_conflicts").increment(1);
                    return EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected: expected_version,
                        actual: sequence,
                    };
                }
                EventStoreError::Database(e)
            })?;

            appended.push(EventRecord {
                event_id,
                stream_id,
                sequence_number: sequence,
                global_position: GlobalPosition::new(global_position),
                event_type: event.event_type,
                payload: event.payload,
                metadata: event.metadata,
                recorded_at,
            });
        }

        tx.commit().await?;

        metrics::counter!("event_store_events_appended").increment(appended.len() as u64);
        tracing::debug!(%stream_id, new_version = %sequence, "appended events");

        Ok(appended)
    }

    async fn read(&self, stream_id: StreamId, from: SequenceNumber) -> Result<EventStream> {
        let pool = self.pool.clone();
        let fetch = move |cursor: i64| -> BoxFuture<'static, Result<Vec<EventRecord>>> {
            let pool = pool.clone();
            Box::pin(async move {
                let rows = sqlx::query(SELECT_STREAM)
                    .bind(stream_id.as_uuid())
                    .bind(cursor)
                    .bind(PAGE_SIZE)
                    .fetch_all(&pool)
                    .await?;
                rows.into_iter().map(Self::row_to_record).collect()
            })
        };

        Ok(paged(from.as_i64().max(1), fetch, |r| {
            r.sequence_number.as_i64() + 1
        }))
    }

    async fn read_all(&self, from: GlobalPosition) -> Result<EventStream> {
        let pool = self.pool.clone();
        let fetch = move |cursor: i64| -> BoxFuture<'static, Result<Vec<EventRecord>>> {
            let pool = pool.clone();
            Box::pin(async move {
                let rows = sqlx::query(SELECT_ALL)
                    .bind(cursor)
                    .bind(PAGE_SIZE)
                    .fetch_all(&pool)
                    .await?;
                rows.into_iter().map(Self::row_to_record).collect()
            })
        };

        Ok(paged(from.as_i64().max(1), fetch, |r| {
            r.global_position.as_i64() + 1
        }))
    }

    async fn stream_version(&self, stream_id: StreamId) -> Result<SequenceNumber> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence_number) FROM events WHERE stream_id = $1")
                .bind(stream_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(SequenceNumber::new(version.unwrap_or(0)))
    }
}
