//! Query handler for booking reads.

use std::str::FromStr;

use domain::{Booking, Replayed, replay};
use event_store::{EventRecord, EventStore, EventStoreExt, StreamId};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::read_model::{BookingFilter, BookingPage, BookingView, Page, ReadModelStore};

/// How fresh a single-booking read must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    /// Served from the read model; may lag the latest append.
    #[default]
    Eventual,

    /// Replayed from the event log; reflects every committed append.
    Strong,
}

impl FromStr for Consistency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eventual" => Ok(Self::Eventual),
            "strong" => Ok(Self::Strong),
            other => Err(format!("unknown consistency level '{other}'")),
        }
    }
}

/// Answers booking queries from read models, or the event log when asked
/// for a strong read.
#[derive(Clone)]
pub struct BookingQueries<S, R> {
    events: S,
    views: R,
}

impl<S: EventStore, R: ReadModelStore> BookingQueries<S, R> {
    pub fn new(events: S, views: R) -> Self {
        Self { events, views }
    }

    /// Fetches one booking; `None` if it does not exist (or, for eventual
    /// reads, is not projected yet).
    #[tracing::instrument(skip(self))]
    pub async fn get(
        &self,
        booking_id: StreamId,
        consistency: Consistency,
    ) -> Result<Option<BookingView>> {
        match consistency {
            Consistency::Eventual => self.views.get(booking_id).await,
            Consistency::Strong => {
                let replayed: Replayed<Booking> = replay::load(&self.events, booking_id).await?;
                Ok(BookingView::from_replayed(booking_id, replayed))
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, filter: &BookingFilter, page: Page) -> Result<BookingPage> {
        self.views.list(filter, page).await
    }

    /// Raw records of one booking stream, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn history(&self, booking_id: StreamId) -> Result<Vec<EventRecord>> {
        Ok(self.events.read_stream(booking_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryReadModelStore;
    use chrono::{Duration, TimeZone, Utc};
    use domain::{BookingEvent, BookingStatus, DomainEvent, TimeSlot};
    use event_store::{InMemoryEventStore, NewEvent, SequenceNumber};

    fn slot() -> TimeSlot {
        let start = Utc.with_ymd_and_hms(2025, 5, 12, 14, 30, 0).unwrap();
        TimeSlot::with_duration(start, Duration::minutes(60)).unwrap()
    }

    async fn booked(events: &InMemoryEventStore) -> StreamId {
        let booking_id = StreamId::new();
        let created =
            BookingEvent::booking_created(booking_id, "alice".into(), "room-1".into(), slot());
        events
            .append(
                booking_id,
                SequenceNumber::initial(),
                vec![NewEvent::new(created.event_type(), created.to_payload().unwrap())],
            )
            .await
            .unwrap();
        booking_id
    }

    #[test]
    fn consistency_parses_case_insensitively() {
        assert_eq!("Strong".parse::<Consistency>().unwrap(), Consistency::Strong);
        assert_eq!("eventual".parse::<Consistency>().unwrap(), Consistency::Eventual);
        assert!("linearizable".parse::<Consistency>().is_err());
    }

    #[tokio::test]
    async fn strong_read_sees_unprojected_append() {
        let events = InMemoryEventStore::new();
        let queries = BookingQueries::new(events.clone(), InMemoryReadModelStore::new());
        let booking_id = booked(&events).await;

        assert!(
            queries
                .get(booking_id, Consistency::Eventual)
                .await
                .unwrap()
                .is_none()
        );

        let view = queries
            .get(booking_id, Consistency::Strong)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view.status(), BookingStatus::Confirmed);
        assert_eq!(view.last_applied_sequence_number, SequenceNumber::first());
    }

    #[tokio::test]
    async fn strong_read_of_empty_stream_is_none() {
        let queries =
            BookingQueries::new(InMemoryEventStore::new(), InMemoryReadModelStore::new());
        assert!(
            queries
                .get(StreamId::new(), Consistency::Strong)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn history_returns_raw_records() {
        let events = InMemoryEventStore::new();
        let queries = BookingQueries::new(events.clone(), InMemoryReadModelStore::new());
        let booking_id = booked(&events).await;

        let history = queries.history(booking_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_type, "BookingCreated");
    }
}
