//! Core aggregate and domain event traits.

use serde_json::Value;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Send + Sync + Clone + Sized {
    /// Returns the event type name stored alongside the payload.
    fn event_type(&self) -> &'static str;

    /// Decodes a stored payload given its type tag.
    ///
    /// Returns `Ok(None)` when the tag is not one this event type knows.
    /// Implementations must map every tag they produce in
    /// [`event_type`](Self::event_type) back to its variant.
    fn decode(event_type: &str, payload: &Value) -> Result<Option<Self>, serde_json::Error>;

    /// Serializes the event's data into the stored payload.
    fn to_payload(&self) -> Result<Value, serde_json::Error>;
}

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate is a single consistency boundary whose state is derived from
/// one event stream. State is never mutated in place: [`apply`](Self::apply)
/// consumes the old state and returns the new one, so a fold over the same
/// events always produces the same result.
pub trait Aggregate: Default + Clone + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate's decisions can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Applies an event, returning the next state.
    ///
    /// Must be pure and total: events are facts, so applying one cannot fail.
    fn apply(self, event: &Self::Event) -> Self;

    /// Returns true once the aggregate has been created.
    fn exists(&self) -> bool;

    /// Applies multiple events in sequence.
    fn apply_all<'a>(self, events: impl IntoIterator<Item = &'a Self::Event>) -> Self
    where
        Self::Event: 'a,
    {
        events.into_iter().fold(self, Self::apply)
    }
}
