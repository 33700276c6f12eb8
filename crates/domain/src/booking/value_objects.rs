//! Value objects for the booking domain.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::BookingError;

/// Verified identity of the caller who owns or acts on a booking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The bookable thing (a room, a desk, a practitioner).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A half-open time interval `[start, end)`.
///
/// Two slots that merely touch (one ends when the other starts) do not
/// overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeSlot {
    /// Creates a slot, rejecting empty or inverted intervals.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, BookingError> {
        if end <= start {
            return Err(BookingError::InvalidSlot { start, end });
        }
        Ok(Self { start, end })
    }

    /// Creates a slot of the given length starting at `start`.
    pub fn with_duration(start: DateTime<Utc>, duration: Duration) -> Result<Self, BookingError> {
        Self::new(start, start + duration)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Slots deserialized from storage bypass [`TimeSlot::new`].
    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 12, hour, minute, 0).unwrap()
    }

    fn slot(from: (u32, u32), to: (u32, u32)) -> TimeSlot {
        TimeSlot::new(at(from.0, from.1), at(to.0, to.1)).unwrap()
    }

    #[test]
    fn test_slot_rejects_empty_and_inverted() {
        assert!(TimeSlot::new(at(14, 30), at(14, 30)).is_err());
        assert!(TimeSlot::new(at(15, 0), at(14, 30)).is_err());
        assert!(TimeSlot::with_duration(at(14, 30), Duration::zero()).is_err());
    }

    #[test]
    fn test_slot_with_duration() {
        let s = TimeSlot::with_duration(at(14, 30), Duration::minutes(60)).unwrap();
        assert_eq!(s.end(), at(15, 30));
        assert_eq!(s.duration(), Duration::minutes(60));
    }

    #[test]
    fn test_overlapping_slots() {
        let a = slot((14, 30), (15, 30));
        assert!(a.overlaps(&slot((15, 0), (16, 0))));
        assert!(a.overlaps(&slot((14, 0), (14, 45))));
        assert!(a.overlaps(&slot((14, 45), (15, 0))));
        assert!(a.overlaps(&a));
    }

    #[test]
    fn test_adjacent_slots_do_not_overlap() {
        let a = slot((14, 30), (15, 30));
        assert!(!a.overlaps(&slot((15, 30), (16, 30))));
        assert!(!a.overlaps(&slot((13, 30), (14, 30))));
    }

    #[test]
    fn test_ids_display_and_blank() {
        assert_eq!(UserId::new("alice").to_string(), "alice");
        assert!(UserId::new("  ").is_blank());
        assert!(!ResourceId::from("room-1").is_blank());
    }

    #[test]
    fn test_slot_serialization() {
        let s = slot((14, 30), (15, 30));
        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["start"], "2025-05-12T14:30:00Z");
        let back: TimeSlot = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }
}
