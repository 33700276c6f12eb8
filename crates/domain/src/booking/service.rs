//! Booking service providing the command API for bookings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use event_store::{EventMetadata, EventStore, StreamId};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::command::{CommandHandler, CommandOutcome, RetryPolicy};
use crate::error::{AvailabilityError, DomainError};
use crate::listener::EventListener;

use super::{
    Booking, BookingError, CancelBooking, CreateBooking, RescheduleBooking, ResourceId, TimeSlot,
};

/// Answers "which live bookings overlap this slot?" for the availability rule.
///
/// Backed by the booking read models, so it may lag the event log; the
/// service closes that window by serializing writers per resource.
#[async_trait]
pub trait SlotIndex: Send + Sync {
    /// Returns the ids of non-cancelled bookings on `resource_id` whose slot
    /// overlaps `slot`.
    async fn overlapping(
        &self,
        resource_id: &ResourceId,
        slot: &TimeSlot,
    ) -> Result<Vec<StreamId>, AvailabilityError>;
}

/// Service for managing bookings.
///
/// Create and reschedule hold a per-resource lock across the availability
/// check, the append and the synchronous listener notifications, so the next
/// writer on the same resource sees the updated read models. Writers on
/// different resources never wait for each other.
pub struct BookingService<S: EventStore> {
    handler: CommandHandler<S, Booking>,
    slots: Arc<dyn SlotIndex>,
    resource_locks: Mutex<HashMap<ResourceId, Arc<Mutex<()>>>>,
}

impl<S: EventStore> BookingService<S> {
    /// Creates a new booking service with the given event store.
    pub fn new(store: S, slots: Arc<dyn SlotIndex>) -> Self {
        Self {
            handler: CommandHandler::new(store),
            slots,
            resource_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.handler = self.handler.with_retry_policy(retry);
        self
    }

    /// Registers a listener notified after every successful append.
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.handler = self.handler.with_listener(listener);
        self
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, Booking> {
        &self.handler
    }

    /// Books a slot.
    #[tracing::instrument(skip(self), fields(booking_id = %cmd.booking_id))]
    pub async fn create_booking(
        &self,
        cmd: CreateBooking,
    ) -> Result<CommandOutcome<Booking>, DomainError> {
        let _guard = self.lock_resource(&cmd.resource_id).await;
        let cmd = &cmd;

        self.handler
            .execute_with(cmd.booking_id, metadata_for(&cmd.user_id), |booking| async move {
                let events = booking.create(
                    cmd.booking_id,
                    cmd.user_id.clone(),
                    cmd.resource_id.clone(),
                    cmd.slot,
                )?;
                self.ensure_available(&cmd.resource_id, &cmd.slot, cmd.booking_id)
                    .await?;
                Ok(events)
            })
            .await
    }

    /// Moves a booking to another slot on its resource.
    #[tracing::instrument(skip(self), fields(booking_id = %cmd.booking_id))]
    pub async fn reschedule_booking(
        &self,
        cmd: RescheduleBooking,
    ) -> Result<CommandOutcome<Booking>, DomainError> {
        // A booking never changes resource, so the lock key can be read
        // before the command runs.
        let resource_id = self
            .handler
            .load_existing(cmd.booking_id)
            .await?
            .and_then(|booking| booking.resource_id().cloned())
            .ok_or(BookingError::NotFound)?;

        let _guard = self.lock_resource(&resource_id).await;
        let cmd = &cmd;
        let resource_id = &resource_id;

        self.handler
            .execute_with(cmd.booking_id, metadata_for(&cmd.requested_by), |booking| async move {
                let events = booking.reschedule(&cmd.requested_by, cmd.new_slot)?;
                if !events.is_empty() {
                    self.ensure_available(resource_id, &cmd.new_slot, cmd.booking_id)
                        .await?;
                }
                Ok(events)
            })
            .await
    }

    /// Cancels a booking. Cancelling frees a slot, so no lock is taken.
    #[tracing::instrument(skip(self), fields(booking_id = %cmd.booking_id))]
    pub async fn cancel_booking(
        &self,
        cmd: CancelBooking,
    ) -> Result<CommandOutcome<Booking>, DomainError> {
        self.handler
            .execute(cmd.booking_id, metadata_for(&cmd.cancelled_by), |booking| {
                booking.cancel(&cmd.cancelled_by, cmd.reason.clone())
            })
            .await
    }

    /// Gets a booking by replaying its stream.
    #[tracing::instrument(skip(self))]
    pub async fn get_booking(&self, booking_id: StreamId) -> Result<Option<Booking>, DomainError> {
        self.handler.load_existing(booking_id).await
    }

    async fn ensure_available(
        &self,
        resource_id: &ResourceId,
        slot: &TimeSlot,
        booking_id: StreamId,
    ) -> Result<(), DomainError> {
        let overlapping = self.slots.overlapping(resource_id, slot).await?;

        match overlapping.into_iter().find(|id| *id != booking_id) {
            Some(conflicting) => Err(BookingError::SlotUnavailable {
                resource_id: resource_id.clone(),
                slot: *slot,
                conflicting,
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Locks `resource_id` for the caller.
    ///
    /// Entries nobody holds or waits on are dropped here, so the map only
    /// tracks resources with writers in flight.
    async fn lock_resource(&self, resource_id: &ResourceId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.resource_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(resource_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

fn metadata_for(actor: &super::UserId) -> EventMetadata {
    EventMetadata::new()
        .actor(actor.as_str())
        .correlation_id(Uuid::new_v4())
}
