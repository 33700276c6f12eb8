//! Booking commands.

use event_store::StreamId;

use crate::command::Command;

use super::{Booking, ResourceId, TimeSlot, UserId};

/// Command to book a slot on a resource.
#[derive(Debug, Clone)]
pub struct CreateBooking {
    /// The booking ID to create.
    pub booking_id: StreamId,

    /// The caller, who becomes the owner.
    pub user_id: UserId,

    pub resource_id: ResourceId,

    pub slot: TimeSlot,
}

impl CreateBooking {
    /// Creates a new CreateBooking command with a generated booking ID.
    pub fn new(user_id: impl Into<UserId>, resource_id: impl Into<ResourceId>, slot: TimeSlot) -> Self {
        Self {
            booking_id: StreamId::new(),
            user_id: user_id.into(),
            resource_id: resource_id.into(),
            slot,
        }
    }

    /// Uses a caller-chosen booking ID.
    pub fn with_id(mut self, booking_id: StreamId) -> Self {
        self.booking_id = booking_id;
        self
    }
}

impl Command for CreateBooking {
    type Aggregate = Booking;

    fn stream_id(&self) -> StreamId {
        self.booking_id
    }
}

/// Command to move a booking to another slot on the same resource.
#[derive(Debug, Clone)]
pub struct RescheduleBooking {
    pub booking_id: StreamId,

    pub new_slot: TimeSlot,

    /// The caller; must own the booking.
    pub requested_by: UserId,
}

impl RescheduleBooking {
    pub fn new(booking_id: StreamId, new_slot: TimeSlot, requested_by: impl Into<UserId>) -> Self {
        Self {
            booking_id,
            new_slot,
            requested_by: requested_by.into(),
        }
    }
}

impl Command for RescheduleBooking {
    type Aggregate = Booking;

    fn stream_id(&self) -> StreamId {
        self.booking_id
    }
}

/// Command to cancel a booking.
#[derive(Debug, Clone)]
pub struct CancelBooking {
    pub booking_id: StreamId,

    /// Optional reason recorded on the event.
    pub reason: Option<String>,

    /// The caller; must own the booking.
    pub cancelled_by: UserId,
}

impl CancelBooking {
    pub fn new(booking_id: StreamId, cancelled_by: impl Into<UserId>) -> Self {
        Self {
            booking_id,
            reason: None,
            cancelled_by: cancelled_by.into(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl Command for CancelBooking {
    type Aggregate = Booking;

    fn stream_id(&self) -> StreamId {
        self.booking_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn slot() -> TimeSlot {
        let start = Utc.with_ymd_and_hms(2025, 5, 12, 14, 30, 0).unwrap();
        TimeSlot::with_duration(start, Duration::minutes(60)).unwrap()
    }

    #[test]
    fn test_create_booking_generates_id() {
        let a = CreateBooking::new("alice", "room-1", slot());
        let b = CreateBooking::new("alice", "room-1", slot());
        assert_ne!(a.booking_id, b.booking_id);
        assert_eq!(a.stream_id(), a.booking_id);
    }

    #[test]
    fn test_create_booking_with_id() {
        let id = StreamId::new();
        let cmd = CreateBooking::new("alice", "room-1", slot()).with_id(id);
        assert_eq!(cmd.stream_id(), id);
    }

    #[test]
    fn test_cancel_booking_reason() {
        let id = StreamId::new();
        let cmd = CancelBooking::new(id, "alice").with_reason("sick");
        assert_eq!(cmd.stream_id(), id);
        assert_eq!(cmd.reason.as_deref(), Some("sick"));
        assert_eq!(cmd.cancelled_by, UserId::new("alice"));
    }

    #[test]
    fn test_reschedule_targets_booking_stream() {
        let id = StreamId::new();
        let cmd = RescheduleBooking::new(id, slot(), "alice");
        assert_eq!(cmd.stream_id(), id);
    }
}
