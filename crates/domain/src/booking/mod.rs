//! Booking aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::Booking;
pub use commands::*;
pub use events::{
    BOOKING_CANCELLED, BOOKING_CREATED, BOOKING_RESCHEDULED, BookingCancelledData,
    BookingCreatedData, BookingEvent, BookingRescheduledData,
};
pub use service::{BookingService, SlotIndex};
pub use state::{BookingStatus, ParseBookingStatusError};
pub use value_objects::{ResourceId, TimeSlot, UserId};

use chrono::{DateTime, Utc};
use event_store::StreamId;
use thiserror::Error;

/// Errors that can occur during booking operations.
#[derive(Debug, Error)]
pub enum BookingError {
    /// A booking already exists under this id.
    #[error("Booking {booking_id} already exists")]
    AlreadyExists { booking_id: StreamId },

    /// The booking does not exist.
    #[error("Booking not found")]
    NotFound,

    /// Only the owner may change a booking.
    #[error("Booking belongs to another user")]
    NotOwner,

    #[error("Booking is already cancelled")]
    AlreadyCancelled,

    /// Booking is not in the expected status.
    #[error("Invalid state transition: cannot {action} a {current_status} booking")]
    InvalidStateTransition {
        current_status: BookingStatus,
        action: &'static str,
    },

    /// The slot's end is not after its start.
    #[error("Invalid slot: end {end} is not after start {start}")]
    InvalidSlot {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("User ID is required")]
    UserIdRequired,

    #[error("Resource ID is required")]
    ResourceIdRequired,

    /// Another live booking holds an overlapping slot on the resource.
    #[error("Slot {slot} on resource {resource_id} is unavailable")]
    SlotUnavailable {
        resource_id: ResourceId,
        slot: TimeSlot,
        conflicting: StreamId,
    },
}
