//! Booking status machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of a booking in its lifecycle.
///
/// ```text
/// New ──create──► Confirmed ──reschedule──► Confirmed
///                     │
///                     └──cancel──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// No event has been applied yet.
    #[default]
    New,

    /// The slot is held.
    Confirmed,

    /// The slot was released (terminal state).
    Cancelled,
}

impl BookingStatus {
    pub fn can_reschedule(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    /// Returns true if the booking holds its slot.
    pub fn holds_slot(&self) -> bool {
        matches!(self, BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::New => "new",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown booking status: {0}")]
pub struct ParseBookingStatusError(pub String);

impl FromStr for BookingStatus {
    type Err = ParseBookingStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "new" => Ok(BookingStatus::New),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            _ => Err(ParseBookingStatusError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_new() {
        assert_eq!(BookingStatus::default(), BookingStatus::New);
    }

    #[test]
    fn test_only_confirmed_can_change() {
        assert!(!BookingStatus::New.can_reschedule());
        assert!(BookingStatus::Confirmed.can_reschedule());
        assert!(!BookingStatus::Cancelled.can_reschedule());

        assert!(!BookingStatus::New.can_cancel());
        assert!(BookingStatus::Confirmed.can_cancel());
        assert!(!BookingStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!BookingStatus::New.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_serialization_is_lowercase() {
        let json = serde_json::to_string(&BookingStatus::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
        let back: BookingStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(back, BookingStatus::Cancelled);
    }

    #[test]
    fn test_parse() {
        assert_eq!("Confirmed".parse(), Ok(BookingStatus::Confirmed));
        assert_eq!("canceled".parse(), Ok(BookingStatus::Cancelled));
        assert!("pending".parse::<BookingStatus>().is_err());
    }
}
