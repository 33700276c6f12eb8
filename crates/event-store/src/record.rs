use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::StreamId;

/// Unique identifier for an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an event inside its stream.
///
/// Sequence numbers start at 1 for the first event and are gapless. A stream
/// with no events is at [`SequenceNumber::initial`] (0), which is also the
/// expected version used when creating a stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceNumber(i64);

impl SequenceNumber {
    /// Creates a sequence number from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The version of a stream that has no events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// The sequence number of a stream's first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next sequence number.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SequenceNumber {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Store-wide insertion position, used as the catch-up cursor.
///
/// Positions start at 1. [`GlobalPosition::start`] reads the whole log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GlobalPosition(i64);

impl GlobalPosition {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Position of the first record ever appended.
    pub fn start() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for GlobalPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation and actor information attached to an event.
///
/// Carried for auditing only; nothing in the write or read path branches on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,

    /// Verified identity of the caller that issued the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl EventMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn causation_id(mut self, id: Uuid) -> Self {
        self.causation_id = Some(id);
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// An event that has not been appended yet.
///
/// The store assigns the sequence number, global position and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub metadata: EventMetadata,
}

impl NewEvent {
    /// Creates an event from a raw JSON payload.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            metadata: EventMetadata::default(),
        }
    }

    /// Creates an event by serializing `payload`.
    pub fn from_payload<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, serde_json::to_value(payload)?))
    }

    /// Replaces the event metadata.
    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// An event as stored in the log.
///
/// Records are immutable once appended. `(stream_id, sequence_number)` is
/// unique across the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: EventId,

    /// The stream (aggregate instance) this event belongs to.
    pub stream_id: StreamId,

    /// Position inside the stream, starting at 1.
    pub sequence_number: SequenceNumber,

    /// Position inside the whole store.
    pub global_position: GlobalPosition,

    /// Name of the domain fact, e.g. `BookingCreated`.
    pub event_type: String,

    pub payload: serde_json::Value,

    pub metadata: EventMetadata,

    /// Assigned by the store; never decreases within a stream.
    pub recorded_at: DateTime<Utc>,
}

impl EventRecord {
    /// Deserializes the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        let id1 = EventId::new();
        let id2 = EventId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn sequence_number_ordering() {
        let s1 = SequenceNumber::new(1);
        let s2 = SequenceNumber::new(2);
        assert!(s1 < s2);
        assert_eq!(s1.next(), s2);
    }

    #[test]
    fn sequence_number_initial_and_first() {
        assert_eq!(SequenceNumber::initial().as_i64(), 0);
        assert_eq!(SequenceNumber::first().as_i64(), 1);
        assert_eq!(SequenceNumber::initial().next(), SequenceNumber::first());
    }

    #[test]
    fn global_position_starts_at_one() {
        assert_eq!(GlobalPosition::start().as_i64(), 1);
        assert_eq!(GlobalPosition::default().next(), GlobalPosition::start());
    }

    #[test]
    fn new_event_from_payload() {
        #[derive(Serialize)]
        struct Payload {
            slot: &'static str,
        }

        let event = NewEvent::from_payload("BookingCreated", &Payload { slot: "14:30" })
            .unwrap()
            .with_metadata(EventMetadata::new().actor("user-1"));

        assert_eq!(event.event_type, "BookingCreated");
        assert_eq!(event.payload, serde_json::json!({"slot": "14:30"}));
        assert_eq!(event.metadata.actor.as_deref(), Some("user-1"));
    }

    #[test]
    fn empty_metadata_serializes_to_empty_object() {
        let json = serde_json::to_value(EventMetadata::new()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
