//! Projection engine keeping booking read models in step with the event log.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use domain::{
    AvailabilityError, Booking, EventListener, ResourceId, SlotIndex, TimeSlot,
    replay::{self, Replayed},
};
use event_store::{EventRecord, EventStore, GlobalPosition, SequenceNumber, StreamId};
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::read_model::{BookingView, ReadModelStore};
use crate::{ProjectionError, Result};

/// Checkpoint name used for the booking projection.
pub const BOOKINGS_PROJECTION: &str = "bookings";

/// What [`ProjectionEngine::apply_event`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,

    /// The read model already reflects this record.
    Duplicate,
}

/// Summary of a catch-up run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatchUpReport {
    pub applied: u64,
    pub duplicates: u64,
    pub rebuilt: u64,

    /// Last global position read, or the starting checkpoint if nothing was read.
    pub position: GlobalPosition,
}

/// Maintains booking read models from the event log.
///
/// The engine is the only writer of read models and serializes its own
/// writes. It is fed two ways: synchronously by the command handler after
/// each append (as an [`EventListener`]) and in bulk by
/// [`catch_up`](Self::catch_up).
pub struct ProjectionEngine<S, R> {
    events: S,
    views: R,
    writer: Mutex<()>,
    repairs: Mutex<BTreeSet<StreamId>>,
}

impl<S: EventStore, R: ReadModelStore> ProjectionEngine<S, R> {
    pub fn new(events: S, views: R) -> Self {
        Self {
            events,
            views,
            writer: Mutex::new(()),
            repairs: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn read_models(&self) -> &R {
        &self.views
    }

    /// Applies one record to its stream's read model.
    ///
    /// Records at or below the last applied sequence number are skipped;
    /// a record further ahead than the next one fails with
    /// [`ProjectionError::Gap`] and leaves the read model unchanged.
    #[tracing::instrument(
        skip(self, record),
        fields(stream_id = %record.stream_id, sequence = %record.sequence_number)
    )]
    pub async fn apply_event(&self, record: &EventRecord) -> Result<ApplyOutcome> {
        let _writer = self.writer.lock().await;
        self.apply_locked(record).await
    }

    async fn apply_locked(&self, record: &EventRecord) -> Result<ApplyOutcome> {
        let current = self.views.get(record.stream_id).await?;
        let last_applied = current
            .as_ref()
            .map(|v| v.last_applied_sequence_number)
            .unwrap_or_default();

        if record.sequence_number <= last_applied {
            tracing::debug!(%last_applied, "duplicate record skipped");
            return Ok(ApplyOutcome::Duplicate);
        }

        if record.sequence_number != last_applied.next() {
            metrics::counter!("projection_gaps").increment(1);
            return Err(ProjectionError::Gap {
                stream_id: record.stream_id,
                last_applied,
                received: record.sequence_number,
            });
        }

        let view = current
            .unwrap_or_else(|| BookingView {
                booking_id: record.stream_id,
                last_applied_sequence_number: SequenceNumber::initial(),
                booking: Booking::default(),
            })
            .apply(record)?;

        self.views.put(&view).await?;
        metrics::counter!("projection_events_applied").increment(1);
        Ok(ApplyOutcome::Applied)
    }

    /// Discards a stream's read model and recomputes it by full replay.
    ///
    /// Returns the new view, or `None` if the stream has no events.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild(&self, stream_id: StreamId) -> Result<Option<BookingView>> {
        let _writer = self.writer.lock().await;
        self.rebuild_locked(stream_id).await
    }

    async fn rebuild_locked(&self, stream_id: StreamId) -> Result<Option<BookingView>> {
        let replayed: Replayed<Booking> = replay::load(&self.events, stream_id).await?;
        let view = BookingView::from_replayed(stream_id, replayed);

        self.views.delete(stream_id).await?;
        if let Some(view) = &view {
            self.views.put(view).await?;
        }
        self.repairs.lock().await.remove(&stream_id);

        metrics::counter!("projection_rebuilds").increment(1);
        tracing::info!(
            %stream_id,
            version = %view.as_ref().map(|v| v.last_applied_sequence_number).unwrap_or_default(),
            "read model rebuilt"
        );
        Ok(view)
    }

    /// Applies every record from `from` onward.
    ///
    /// A record that arrives ahead of its predecessor is held back until the
    /// predecessor is applied; streams still holding records once the log is
    /// drained are rebuilt. The last position read is saved as the
    /// checkpoint.
    #[tracing::instrument(skip(self))]
    pub async fn catch_up(&self, from: GlobalPosition) -> Result<CatchUpReport> {
        let _writer = self.writer.lock().await;
        self.catch_up_locked(from).await
    }

    /// Resumes catch-up after the last saved checkpoint.
    pub async fn catch_up_from_checkpoint(&self) -> Result<CatchUpReport> {
        let _writer = self.writer.lock().await;
        let checkpoint = self.views.load_checkpoint(BOOKINGS_PROJECTION).await?;
        self.catch_up_locked(checkpoint.next()).await
    }

    /// Drops every read model and replays the whole log.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<CatchUpReport> {
        let _writer = self.writer.lock().await;
        self.views.clear().await?;
        self.views
            .save_checkpoint(BOOKINGS_PROJECTION, GlobalPosition::default())
            .await?;
        self.repairs.lock().await.clear();
        self.catch_up_locked(GlobalPosition::start()).await
    }

    async fn catch_up_locked(&self, from: GlobalPosition) -> Result<CatchUpReport> {
        let mut report = CatchUpReport {
            position: GlobalPosition::new(from.as_i64() - 1).max(GlobalPosition::default()),
            ..Default::default()
        };
        let mut held: HashMap<StreamId, BTreeMap<SequenceNumber, EventRecord>> = HashMap::new();
        let mut records = self.events.read_all(from).await?;

        while let Some(record) = records.next().await {
            let record = record?;
            report.position = record.global_position;

            match self.apply_locked(&record).await {
                Ok(ApplyOutcome::Applied) => {
                    report.applied += 1;
                    report.applied += self.release_held(&mut held, &record).await?;
                }
                Ok(ApplyOutcome::Duplicate) => report.duplicates += 1,
                Err(ProjectionError::Gap { .. }) => {
                    held.entry(record.stream_id)
                        .or_default()
                        .insert(record.sequence_number, record);
                }
                Err(ProjectionError::Replay(e)) => self.queue_repair(record.stream_id, &e).await,
                Err(e) => return Err(e),
            }
        }

        for stream_id in held.into_keys() {
            match self.rebuild_locked(stream_id).await {
                Ok(_) => report.rebuilt += 1,
                Err(ProjectionError::Replay(e)) => self.queue_repair(stream_id, &e).await,
                Err(e) => return Err(e),
            }
        }

        self.views
            .save_checkpoint(BOOKINGS_PROJECTION, report.position)
            .await?;

        tracing::info!(
            events_applied = report.applied,
            duplicates = report.duplicates,
            streams_rebuilt = report.rebuilt,
            position = %report.position,
            "catch-up complete"
        );
        Ok(report)
    }

    /// Applies held records that directly follow `applied`.
    async fn release_held(
        &self,
        held: &mut HashMap<StreamId, BTreeMap<SequenceNumber, EventRecord>>,
        applied: &EventRecord,
    ) -> Result<u64> {
        let Some(waiting) = held.get_mut(&applied.stream_id) else {
            return Ok(0);
        };

        let mut released = 0;
        let mut next = applied.sequence_number.next();
        while let Some(record) = waiting.remove(&next) {
            match self.apply_locked(&record).await {
                Ok(_) => released += 1,
                Err(ProjectionError::Replay(e)) => {
                    // The rest of the stream cannot be applied past a bad record.
                    held.remove(&applied.stream_id);
                    self.queue_repair(applied.stream_id, &e).await;
                    return Ok(released);
                }
                Err(e) => return Err(e),
            }
            next = next.next();
        }

        if waiting.is_empty() {
            held.remove(&applied.stream_id);
        }
        Ok(released)
    }

    async fn queue_repair(&self, stream_id: StreamId, error: &impl std::fmt::Display) {
        tracing::error!(%stream_id, %error, "projection failed, queued for repair");
        self.repairs.lock().await.insert(stream_id);
    }

    /// Listener entry point: applies freshly appended records.
    ///
    /// A gap triggers a rebuild of the stream. Any other failure is logged and
    /// the stream is queued for [`repair_pending`](Self::repair_pending); the
    /// append that produced the records is never affected.
    pub async fn handle(&self, records: &[EventRecord]) {
        for record in records {
            match self.apply_event(record).await {
                Ok(_) => {}
                Err(ProjectionError::Gap {
                    stream_id,
                    last_applied,
                    received,
                }) => {
                    tracing::warn!(%stream_id, %last_applied, %received, "projection gap, rebuilding");
                    if let Err(e) = self.rebuild(stream_id).await {
                        tracing::error!(%stream_id, error = %e, "rebuild failed");
                        self.repairs.lock().await.insert(stream_id);
                    }
                }
                Err(e) => {
                    tracing::error!(stream_id = %record.stream_id, error = %e, "projection failed");
                    self.repairs.lock().await.insert(record.stream_id);
                }
            }
        }
    }

    /// Streams waiting for repair, in id order.
    pub async fn pending_repairs(&self) -> Vec<StreamId> {
        self.repairs.lock().await.iter().copied().collect()
    }

    /// Rebuilds every stream queued for repair.
    ///
    /// Streams that still fail stay queued. Returns how many were repaired.
    #[tracing::instrument(skip(self))]
    pub async fn repair_pending(&self) -> usize {
        let queued = self.pending_repairs().await;
        let mut repaired = 0;

        for stream_id in queued {
            match self.rebuild(stream_id).await {
                Ok(_) => repaired += 1,
                Err(e) => {
                    tracing::error!(%stream_id, error = %e, "repair failed");
                    self.repairs.lock().await.insert(stream_id);
                }
            }
        }
        repaired
    }
}

#[async_trait]
impl<S, R> EventListener for ProjectionEngine<S, R>
where
    S: EventStore,
    R: ReadModelStore,
{
    fn name(&self) -> &'static str {
        BOOKINGS_PROJECTION
    }

    async fn on_appended(&self, records: &[EventRecord]) {
        self.handle(records).await;
    }
}

#[async_trait]
impl<S, R> SlotIndex for ProjectionEngine<S, R>
where
    S: EventStore,
    R: ReadModelStore,
{
    async fn overlapping(
        &self,
        resource_id: &ResourceId,
        slot: &TimeSlot,
    ) -> std::result::Result<Vec<StreamId>, AvailabilityError> {
        self.views
            .overlapping(resource_id, slot)
            .await
            .map_err(|e| AvailabilityError(e.to_string()))
    }
}
