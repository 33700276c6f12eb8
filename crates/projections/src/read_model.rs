//! Booking read models and the storage they live in.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Booking, BookingStatus, ReplayError, Replayed, ResourceId, TimeSlot, UserId};
use event_store::{EventRecord, GlobalPosition, SequenceNumber, StreamId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Largest page a caller can ask for.
pub const MAX_PAGE_LIMIT: usize = 200;

/// Denormalized view of one booking stream.
///
/// The view is exactly the replayed aggregate state at
/// `last_applied_sequence_number`, so incremental application and a full
/// rebuild always agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingView {
    pub booking_id: StreamId,
    pub last_applied_sequence_number: SequenceNumber,
    pub booking: Booking,
}

impl BookingView {
    /// Builds a view from replayed state; `None` if nothing was replayed.
    pub fn from_replayed(booking_id: StreamId, replayed: Replayed<Booking>) -> Option<Self> {
        replayed.exists().then(|| Self {
            booking_id,
            last_applied_sequence_number: replayed.version,
            booking: replayed.state,
        })
    }

    /// Folds the next record of the stream into the view.
    pub fn apply(self, record: &EventRecord) -> std::result::Result<Self, ReplayError> {
        let replayed = Replayed {
            state: self.booking,
            version: self.last_applied_sequence_number,
        }
        .fold(self.booking_id, record)?;

        Ok(Self {
            booking_id: self.booking_id,
            last_applied_sequence_number: replayed.version,
            booking: replayed.state,
        })
    }

    pub fn status(&self) -> BookingStatus {
        self.booking.status()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.booking.user_id()
    }

    pub fn resource_id(&self) -> Option<&ResourceId> {
        self.booking.resource_id()
    }

    pub fn slot(&self) -> Option<TimeSlot> {
        self.booking.slot()
    }

    /// Sort key for listings: slot start, then booking id.
    fn sort_key(&self) -> (Option<DateTime<Utc>>, StreamId) {
        (self.slot().map(|s| s.start()), self.booking_id)
    }
}

/// Criteria for listing bookings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
    pub user_id: Option<UserId>,
    pub resource_id: Option<ResourceId>,
    pub status: Option<BookingStatus>,

    /// Inclusive lower bound on the slot start.
    pub starts_after: Option<DateTime<Utc>>,

    /// Exclusive upper bound on the slot start.
    pub starts_before: Option<DateTime<Utc>>,
}

impl BookingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn resource(mut self, resource_id: impl Into<ResourceId>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn status(mut self, status: BookingStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn starts_after(mut self, at: DateTime<Utc>) -> Self {
        self.starts_after = Some(at);
        self
    }

    pub fn starts_before(mut self, at: DateTime<Utc>) -> Self {
        self.starts_before = Some(at);
        self
    }

    pub fn matches(&self, view: &BookingView) -> bool {
        if let Some(user_id) = &self.user_id
            && view.user_id() != Some(user_id)
        {
            return false;
        }
        if let Some(resource_id) = &self.resource_id
            && view.resource_id() != Some(resource_id)
        {
            return false;
        }
        if let Some(status) = self.status
            && view.status() != status
        {
            return false;
        }

        let start = view.slot().map(|s| s.start());
        if let Some(after) = self.starts_after
            && !start.is_some_and(|s| s >= after)
        {
            return false;
        }
        if let Some(before) = self.starts_before
            && !start.is_some_and(|s| s < before)
        {
            return false;
        }
        true
    }
}

/// Offset pagination over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    /// Creates a page, clamping `limit` to `1..=MAX_PAGE_LIMIT`.
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_LIMIT)
    }
}

/// One page of a listing plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingPage {
    pub items: Vec<BookingView>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Storage for booking views and projection checkpoints.
///
/// Only the projection engine writes through this trait; queries only read.
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    async fn get(&self, booking_id: StreamId) -> Result<Option<BookingView>>;

    /// Inserts or replaces the view for `view.booking_id`.
    async fn put(&self, view: &BookingView) -> Result<()>;

    async fn delete(&self, booking_id: StreamId) -> Result<()>;

    /// Lists matching views ordered by slot start, then booking id.
    async fn list(&self, filter: &BookingFilter, page: Page) -> Result<BookingPage>;

    /// Ids of bookings on `resource_id` that hold a slot overlapping `slot`.
    async fn overlapping(&self, resource_id: &ResourceId, slot: &TimeSlot)
    -> Result<Vec<StreamId>>;

    /// Removes every view. Checkpoints are left untouched.
    async fn clear(&self) -> Result<()>;

    /// Last global position processed by the named projection (0 if none).
    async fn load_checkpoint(&self, name: &str) -> Result<GlobalPosition>;

    async fn save_checkpoint(&self, name: &str, position: GlobalPosition) -> Result<()>;
}

/// In-memory read model store for tests and database-less deployments.
#[derive(Clone, Default)]
pub struct InMemoryReadModelStore {
    views: Arc<RwLock<HashMap<StreamId, BookingView>>>,
    checkpoints: Arc<RwLock<HashMap<String, GlobalPosition>>>,
}

impl InMemoryReadModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored views.
    pub async fn len(&self) -> usize {
        self.views.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.views.read().await.is_empty()
    }
}

#[async_trait]
impl ReadModelStore for InMemoryReadModelStore {
    async fn get(&self, booking_id: StreamId) -> Result<Option<BookingView>> {
        Ok(self.views.read().await.get(&booking_id).cloned())
    }

    async fn put(&self, view: &BookingView) -> Result<()> {
        self.views
            .write()
            .await
            .insert(view.booking_id, view.clone());
        Ok(())
    }

    async fn delete(&self, booking_id: StreamId) -> Result<()> {
        self.views.write().await.remove(&booking_id);
        Ok(())
    }

    async fn list(&self, filter: &BookingFilter, page: Page) -> Result<BookingPage> {
        let views = self.views.read().await;
        let mut matches: Vec<&BookingView> = views.values().filter(|v| filter.matches(v)).collect();
        matches.sort_by_key(|v| v.sort_key());

        Ok(BookingPage {
            total: matches.len(),
            items: matches
                .into_iter()
                .skip(page.offset)
                .take(page.limit)
                .cloned()
                .collect(),
            offset: page.offset,
            limit: page.limit,
        })
    }

    async fn overlapping(
        &self,
        resource_id: &ResourceId,
        slot: &TimeSlot,
    ) -> Result<Vec<StreamId>> {
        let views = self.views.read().await;
        let mut ids: Vec<StreamId> = views
            .values()
            .filter(|v| v.booking.holds_slot())
            .filter(|v| v.resource_id() == Some(resource_id))
            .filter(|v| v.slot().is_some_and(|s| s.overlaps(slot)))
            .map(|v| v.booking_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn clear(&self) -> Result<()> {
        self.views.write().await.clear();
        Ok(())
    }

    async fn load_checkpoint(&self, name: &str) -> Result<GlobalPosition> {
        Ok(self
            .checkpoints
            .read()
            .await
            .get(name)
            .copied()
            .unwrap_or_default())
    }

    async fn save_checkpoint(&self, name: &str, position: GlobalPosition) -> Result<()> {
        self.checkpoints
            .write()
            .await
            .insert(name.to_string(), position);
        Ok(())
    }
}
