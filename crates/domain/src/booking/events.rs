//! Booking domain events.

use chrono::{DateTime, Utc};
use event_store::StreamId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::DomainEvent;

use super::{ResourceId, TimeSlot, UserId};

pub const BOOKING_CREATED: &str = "BookingCreated";
pub const BOOKING_RESCHEDULED: &str = "BookingRescheduled";
pub const BOOKING_CANCELLED: &str = "BookingCancelled";

/// Events that can occur on a booking aggregate.
///
/// Stored records keep the variant name in `event_type` and only the data
/// struct in the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BookingEvent {
    /// A slot was booked.
    BookingCreated(BookingCreatedData),

    /// The booking moved to another slot on the same resource.
    BookingRescheduled(BookingRescheduledData),

    /// The booking was cancelled (terminal).
    BookingCancelled(BookingCancelledData),
}

impl DomainEvent for BookingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BookingEvent::BookingCreated(_) => BOOKING_CREATED,
            BookingEvent::BookingRescheduled(_) => BOOKING_RESCHEDULED,
            BookingEvent::BookingCancelled(_) => BOOKING_CANCELLED,
        }
    }

    fn decode(event_type: &str, payload: &Value) -> Result<Option<Self>, serde_json::Error> {
        let event = match event_type {
            BOOKING_CREATED => BookingEvent::BookingCreated(serde_json::from_value(payload.clone())?),
            BOOKING_RESCHEDULED => {
                BookingEvent::BookingRescheduled(serde_json::from_value(payload.clone())?)
            }
            BOOKING_CANCELLED => {
                BookingEvent::BookingCancelled(serde_json::from_value(payload.clone())?)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    fn to_payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            BookingEvent::BookingCreated(data) => serde_json::to_value(data),
            BookingEvent::BookingRescheduled(data) => serde_json::to_value(data),
            BookingEvent::BookingCancelled(data) => serde_json::to_value(data),
        }
    }
}

/// Data for BookingCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingCreatedData {
    pub booking_id: StreamId,

    /// The user who owns the booking.
    pub user_id: UserId,

    pub resource_id: ResourceId,

    pub slot: TimeSlot,

    pub created_at: DateTime<Utc>,
}

/// Data for BookingRescheduled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRescheduledData {
    pub previous_slot: TimeSlot,

    pub new_slot: TimeSlot,

    pub rescheduled_by: UserId,

    pub rescheduled_at: DateTime<Utc>,
}

/// Data for BookingCancelled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingCancelledData {
    /// Free-text reason given by the caller, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub cancelled_by: UserId,

    pub cancelled_at: DateTime<Utc>,
}

// Convenience constructors for events
impl BookingEvent {
    /// Creates a BookingCreated event.
    pub fn booking_created(
        booking_id: StreamId,
        user_id: UserId,
        resource_id: ResourceId,
        slot: TimeSlot,
    ) -> Self {
        BookingEvent::BookingCreated(BookingCreatedData {
            booking_id,
            user_id,
            resource_id,
            slot,
            created_at: Utc::now(),
        })
    }

    /// Creates a BookingRescheduled event.
    pub fn booking_rescheduled(
        previous_slot: TimeSlot,
        new_slot: TimeSlot,
        rescheduled_by: UserId,
    ) -> Self {
        BookingEvent::BookingRescheduled(BookingRescheduledData {
            previous_slot,
            new_slot,
            rescheduled_by,
            rescheduled_at: Utc::now(),
        })
    }

    /// Creates a BookingCancelled event.
    pub fn booking_cancelled(cancelled_by: UserId, reason: Option<String>) -> Self {
        BookingEvent::BookingCancelled(BookingCancelledData {
            reason,
            cancelled_by,
            cancelled_at: Utc::now(),
        })
    }

    /// Returns the slot this event books, if it books one.
    pub fn booked_slot(&self) -> Option<TimeSlot> {
        match self {
            BookingEvent::BookingCreated(data) => Some(data.slot),
            BookingEvent::BookingRescheduled(data) => Some(data.new_slot),
            BookingEvent::BookingCancelled(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slot() -> TimeSlot {
        let start = Utc.with_ymd_and_hms(2025, 5, 12, 14, 30, 0).unwrap();
        TimeSlot::with_duration(start, chrono::Duration::minutes(60)).unwrap()
    }

    fn created() -> BookingEvent {
        BookingEvent::booking_created(
            StreamId::new(),
            UserId::new("alice"),
            ResourceId::new("room-1"),
            slot(),
        )
    }

    #[test]
    fn test_event_types() {
        assert_eq!(created().event_type(), "BookingCreated");
        assert_eq!(
            BookingEvent::booking_rescheduled(slot(), slot(), UserId::new("alice")).event_type(),
            "BookingRescheduled"
        );
        assert_eq!(
            BookingEvent::booking_cancelled(UserId::new("alice"), None).event_type(),
            "BookingCancelled"
        );
    }

    #[test]
    fn test_payload_is_data_only() {
        let payload = created().to_payload().unwrap();
        assert_eq!(payload["resource_id"], "room-1");
        assert_eq!(payload["user_id"], "alice");
        assert!(payload.get("type").is_none());
    }

    #[test]
    fn test_every_tag_decodes_to_its_variant() {
        let events = vec![
            created(),
            BookingEvent::booking_rescheduled(slot(), slot(), UserId::new("alice")),
            BookingEvent::booking_cancelled(UserId::new("alice"), Some("ill".to_string())),
        ];

        for event in events {
            let payload = event.to_payload().unwrap();
            let decoded = BookingEvent::decode(event.event_type(), &payload)
                .unwrap()
                .unwrap();
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn test_unknown_tag_decodes_to_none() {
        let decoded = BookingEvent::decode("BookingDeleted", &serde_json::json!({})).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_cancel_reason_is_optional_in_payload() {
        let payload = serde_json::json!({
            "cancelled_by": "alice",
            "cancelled_at": "2025-05-12T10:00:00Z",
        });
        let decoded = BookingEvent::decode(BOOKING_CANCELLED, &payload)
            .unwrap()
            .unwrap();
        assert!(matches!(
            decoded,
            BookingEvent::BookingCancelled(BookingCancelledData { reason: None, .. })
        ));
    }

    #[test]
    fn test_booked_slot() {
        assert_eq!(created().booked_slot(), Some(slot()));
        assert_eq!(
            BookingEvent::booking_cancelled(UserId::new("alice"), None).booked_slot(),
            None
        );
    }
}
