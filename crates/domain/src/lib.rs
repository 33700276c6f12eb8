//! Domain layer for the booking engine.
//!
//! This crate provides the write side:
//! - Aggregate and DomainEvent traits for event-sourced entities
//! - The replayer that folds a stream into aggregate state
//! - CommandHandler with bounded retry on concurrency conflicts
//! - The Booking aggregate, its commands and the BookingService
//! - Listeners notified after each successful append

pub mod aggregate;
pub mod booking;
pub mod command;
pub mod error;
pub mod listener;
pub mod notifier;
pub mod replay;

pub use aggregate::{Aggregate, DomainEvent};
pub use booking::{
    Booking, BookingError, BookingEvent, BookingService, BookingStatus, CancelBooking,
    CreateBooking, RescheduleBooking, ResourceId, SlotIndex, TimeSlot, UserId,
};
pub use command::{Command, CommandHandler, CommandOutcome, RetryPolicy};
pub use error::{AvailabilityError, DomainError};
pub use listener::EventListener;
pub use notifier::{BookingNotifier, LoggingNotifier, NotificationListener, NotifyError};
pub use replay::{ReplayError, Replayed};
