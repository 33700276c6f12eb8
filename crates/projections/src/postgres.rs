//! PostgreSQL read model store.

use async_trait::async_trait;
use domain::{ResourceId, TimeSlot};
use event_store::{GlobalPosition, SequenceNumber, StreamId};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::Result;
use crate::read_model::{BookingFilter, BookingPage, BookingView, Page, ReadModelStore};

const UPSERT_VIEW: &str = r#"
    INSERT INTO read_models
        (stream_id, last_applied_sequence_number, user_id, resource_id, status, slot_start, slot_end, state)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (stream_id) DO UPDATE SET
        last_applied_sequence_number = EXCLUDED.last_applied_sequence_number,
        user_id = EXCLUDED.user_id,
        resource_id = EXCLUDED.resource_id,
        status = EXCLUDED.status,
        slot_start = EXCLUDED.slot_start,
        slot_end = EXCLUDED.slot_end,
        state = EXCLUDED.state
"#;

const SELECT_OVERLAPPING: &str = r#"
    SELECT stream_id FROM read_models
    WHERE resource_id = $1 AND status = 'confirmed' AND slot_start < $3 AND slot_end > $2
    ORDER BY stream_id
"#;

const UPSERT_CHECKPOINT: &str = r#"
    INSERT INTO projection_checkpoints (name, global_position)
    VALUES ($1, $2)
    ON CONFLICT (name) DO UPDATE SET global_position = EXCLUDED.global_position
"#;

/// Read model store backed by the `read_models` table.
///
/// The full view is kept as a JSONB snapshot; user, resource, status and slot
/// bounds are duplicated into indexed columns for filtering.
#[derive(Clone)]
pub struct PostgresReadModelStore {
    pool: PgPool,
}

impl PostgresReadModelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_view(row: PgRow) -> Result<BookingView> {
        Ok(BookingView {
            booking_id: StreamId::from_uuid(row.try_get::<Uuid, _>("stream_id")?),
            last_applied_sequence_number: SequenceNumber::new(
                row.try_get("last_applied_sequence_number")?,
            ),
            booking: serde_json::from_value(row.try_get("state")?)?,
        })
    }
}

fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &BookingFilter) {
    query.push(" WHERE TRUE");
    if let Some(user_id) = &filter.user_id {
        query.push(" AND user_id = ").push_bind(user_id.as_str().to_owned());
    }
    if let Some(resource_id) = &filter.resource_id {
        query
            .push(" AND resource_id = ")
            .push_bind(resource_id.as_str().to_owned());
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(after) = filter.starts_after {
        query.push(" AND slot_start >= ").push_bind(after);
    }
    if let Some(before) = filter.starts_before {
        query.push(" AND slot_start < ").push_bind(before);
    }
}

#[async_trait]
impl ReadModelStore for PostgresReadModelStore {
    async fn get(&self, booking_id: StreamId) -> Result<Option<BookingView>> {
        let row = sqlx::query(
            "SELECT stream_id, last_applied_sequence_number, state FROM read_models WHERE stream_id = $1",
        )
        .bind(booking_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_view).transpose()
    }

    async fn put(&self, view: &BookingView) -> Result<()> {
        let slot = view.slot();
        sqlx::query(UPSERT_VIEW)
            .bind(view.booking_id.as_uuid())
            .bind(view.last_applied_sequence_number.as_i64())
            .bind(view.user_id().map(|u| u.as_str().to_owned()))
            .bind(view.resource_id().map(|r| r.as_str().to_owned()))
            .bind(view.status().as_str())
            .bind(slot.map(|s| s.start()))
            .bind(slot.map(|s| s.end()))
            .bind(serde_json::to_value(&view.booking)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, booking_id: StreamId) -> Result<()> {
        sqlx::query("DELETE FROM read_models WHERE stream_id = $1")
            .bind(booking_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, filter: &BookingFilter, page: Page) -> Result<BookingPage> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM read_models");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new(
            "SELECT stream_id, last_applied_sequence_number, state FROM read_models",
        );
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY slot_start ASC, stream_id ASC OFFSET ")
            .push_bind(page.offset as i64)
            .push(" LIMIT ")
            .push_bind(page.limit as i64);

        let rows = select.build().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(Self::row_to_view)
            .collect::<Result<Vec<_>>>()?;

        Ok(BookingPage {
            items,
            total: total as usize,
            offset: page.offset,
            limit: page.limit,
        })
    }

    async fn overlapping(
        &self,
        resource_id: &ResourceId,
        slot: &TimeSlot,
    ) -> Result<Vec<StreamId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(SELECT_OVERLAPPING)
            .bind(resource_id.as_str())
            .bind(slot.start())
            .bind(slot.end())
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().map(StreamId::from_uuid).collect())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM read_models")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_checkpoint(&self, name: &str) -> Result<GlobalPosition> {
        let position: Option<i64> =
            sqlx::query_scalar("SELECT global_position FROM projection_checkpoints WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        Ok(position.map(GlobalPosition::new).unwrap_or_default())
    }

    async fn save_checkpoint(&self, name: &str, position: GlobalPosition) -> Result<()> {
        sqlx::query(UPSERT_CHECKPOINT)
            .bind(name)
            .bind(position.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
