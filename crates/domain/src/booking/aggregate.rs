//! Booking aggregate implementation.

use chrono::{DateTime, Utc};
use event_store::StreamId;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{BookingError, BookingEvent, BookingStatus, ResourceId, TimeSlot, UserId};

/// Booking aggregate root.
///
/// One booking holds one slot on one resource for one user. Timestamps come
/// from event data, so replaying the same events always yields the same
/// value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    id: Option<StreamId>,
    user_id: Option<UserId>,
    resource_id: Option<ResourceId>,
    slot: Option<TimeSlot>,
    status: BookingStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    cancellation_reason: Option<String>,

    #[serde(default)]
    reschedule_count: u32,

    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Booking {
    type Event = BookingEvent;
    type Error = BookingError;

    fn aggregate_type() -> &'static str {
        "Booking"
    }

    fn apply(mut self, event: &Self::Event) -> Self {
        match event {
            BookingEvent::BookingCreated(data) => {
                self.id = Some(data.booking_id);
                self.user_id = Some(data.user_id.clone());
                self.resource_id = Some(data.resource_id.clone());
                self.slot = Some(data.slot);
                self.status = BookingStatus::Confirmed;
                self.created_at = Some(data.created_at);
                self.updated_at = Some(data.created_at);
            }
            BookingEvent::BookingRescheduled(data) => {
                self.slot = Some(data.new_slot);
                self.reschedule_count += 1;
                self.updated_at = Some(data.rescheduled_at);
            }
            BookingEvent::BookingCancelled(data) => {
                self.status = BookingStatus::Cancelled;
                self.cancellation_reason = data.reason.clone();
                self.updated_at = Some(data.cancelled_at);
            }
        }
        self
    }

    fn exists(&self) -> bool {
        self.id.is_some()
    }
}

// Query methods
impl Booking {
    pub fn id(&self) -> Option<StreamId> {
        self.id
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn resource_id(&self) -> Option<&ResourceId> {
        self.resource_id.as_ref()
    }

    pub fn slot(&self) -> Option<TimeSlot> {
        self.slot
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn reschedule_count(&self) -> u32 {
        self.reschedule_count
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns true if the booking currently blocks its slot.
    pub fn holds_slot(&self) -> bool {
        self.status.holds_slot()
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.user_id.as_ref() == Some(user)
    }

    /// Fails unless the booking exists and belongs to `user`.
    pub fn ensure_owner(&self, user: &UserId) -> Result<(), BookingError> {
        if !self.exists() {
            return Err(BookingError::NotFound);
        }
        if !self.is_owned_by(user) {
            return Err(BookingError::NotOwner);
        }
        Ok(())
    }
}

// Command methods (return events)
impl Booking {
    /// Books `slot` on `resource_id` for `user_id`.
    ///
    /// Availability against other bookings is checked by the service; this
    /// only validates the request against this stream.
    pub fn create(
        &self,
        booking_id: StreamId,
        user_id: UserId,
        resource_id: ResourceId,
        slot: TimeSlot,
    ) -> Result<Vec<BookingEvent>, BookingError> {
        if self.exists() {
            return Err(BookingError::AlreadyExists { booking_id });
        }

        if user_id.is_blank() {
            return Err(BookingError::UserIdRequired);
        }

        if resource_id.is_blank() {
            return Err(BookingError::ResourceIdRequired);
        }

        validate_slot(&slot)?;

        Ok(vec![BookingEvent::booking_created(
            booking_id,
            user_id,
            resource_id,
            slot,
        )])
    }

    /// Moves the booking to `new_slot`. Moving to the same slot is a no-op.
    pub fn reschedule(
        &self,
        requested_by: &UserId,
        new_slot: TimeSlot,
    ) -> Result<Vec<BookingEvent>, BookingError> {
        self.ensure_owner(requested_by)?;

        if !self.status.can_reschedule() {
            return Err(BookingError::InvalidStateTransition {
                current_status: self.status,
                action: "reschedule",
            });
        }

        validate_slot(&new_slot)?;

        match self.slot {
            Some(current) if current == new_slot => Ok(vec![]),
            Some(current) => Ok(vec![BookingEvent::booking_rescheduled(
                current,
                new_slot,
                requested_by.clone(),
            )]),
            None => Err(BookingError::NotFound),
        }
    }

    /// Cancels the booking, releasing its slot.
    pub fn cancel(
        &self,
        cancelled_by: &UserId,
        reason: Option<String>,
    ) -> Result<Vec<BookingEvent>, BookingError> {
        self.ensure_owner(cancelled_by)?;

        if self.status == BookingStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled);
        }

        if !self.status.can_cancel() {
            return Err(BookingError::InvalidStateTransition {
                current_status: self.status,
                action: "cancel",
            });
        }

        let reason = reason.filter(|r| !r.trim().is_empty());
        Ok(vec![BookingEvent::booking_cancelled(
            cancelled_by.clone(),
            reason,
        )])
    }
}

fn validate_slot(slot: &TimeSlot) -> Result<(), BookingError> {
    if slot.is_valid() {
        Ok(())
    } else {
        Err(BookingError::InvalidSlot {
            start: slot.start(),
            end: slot.end(),
        })
    }
}
