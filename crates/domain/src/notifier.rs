//! Notifications sent to users after their bookings change.

use std::sync::Arc;

use async_trait::async_trait;
use event_store::{EventRecord, StreamId};
use thiserror::Error;

use crate::booking::BookingEvent;
use crate::listener::EventListener;
use crate::replay;

#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers a message about a booking event (email, push, ...).
#[async_trait]
pub trait BookingNotifier: Send + Sync {
    async fn notify(&self, booking_id: StreamId, event: &BookingEvent) -> Result<(), NotifyError>;
}

#[async_trait]
impl<T: BookingNotifier + ?Sized> BookingNotifier for Arc<T> {
    async fn notify(&self, booking_id: StreamId, event: &BookingEvent) -> Result<(), NotifyError> {
        (**self).notify(booking_id, event).await
    }
}

/// Records notifications in the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl BookingNotifier for LoggingNotifier {
    async fn notify(&self, booking_id: StreamId, event: &BookingEvent) -> Result<(), NotifyError> {
        match event {
            BookingEvent::BookingCreated(data) => tracing::info!(
                %booking_id,
                user_id = %data.user_id,
                resource_id = %data.resource_id,
                slot = %data.slot,
                "booking confirmed"
            ),
            BookingEvent::BookingRescheduled(data) => tracing::info!(
                %booking_id,
                user_id = %data.rescheduled_by,
                slot = %data.new_slot,
                "booking rescheduled"
            ),
            BookingEvent::BookingCancelled(data) => tracing::info!(
                %booking_id,
                user_id = %data.cancelled_by,
                reason = data.reason.as_deref().unwrap_or(""),
                "booking cancelled"
            ),
        }
        Ok(())
    }
}

/// Feeds appended booking records to a [`BookingNotifier`].
///
/// Delivery is fire-and-forget: failures are logged and dropped.
pub struct NotificationListener<N> {
    notifier: N,
}

impl<N: BookingNotifier> NotificationListener<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl<N: BookingNotifier> EventListener for NotificationListener<N> {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn on_appended(&self, records: &[EventRecord]) {
        for record in records {
            let event = match replay::decode::<BookingEvent>(record) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(stream_id = %record.stream_id, error = %e, "skipping notification");
                    continue;
                }
            };

            if let Err(e) = self.notifier.notify(record.stream_id, &event).await {
                tracing::warn!(stream_id = %record.stream_id, error = %e, "notification failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DomainEvent;
    use crate::booking::{ResourceId, TimeSlot, UserId};
    use chrono::{Duration, TimeZone, Utc};
    use event_store::{GlobalPosition, SequenceNumber};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<&'static str>>,
        fail: bool,
    }

    #[async_trait]
    impl BookingNotifier for RecordingNotifier {
        async fn notify(&self, _: StreamId, event: &BookingEvent) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(event.event_type());
            if self.fail {
                return Err(NotifyError("smtp down".to_string()));
            }
            Ok(())
        }
    }

    fn record(event: &BookingEvent, sequence: i64) -> EventRecord {
        EventRecord {
            event_id: Default::default(),
            stream_id: StreamId::new(),
            sequence_number: SequenceNumber::new(sequence),
            global_position: GlobalPosition::new(sequence),
            event_type: event.event_type().to_string(),
            payload: event.to_payload().unwrap(),
            metadata: Default::default(),
            recorded_at: Utc::now(),
        }
    }

    fn created() -> BookingEvent {
        let start = Utc.with_ymd_and_hms(2025, 5, 12, 14, 30, 0).unwrap();
        BookingEvent::booking_created(
            StreamId::new(),
            UserId::new("alice"),
            ResourceId::new("room-1"),
            TimeSlot::with_duration(start, Duration::minutes(60)).unwrap(),
        )
    }

    #[tokio::test]
    async fn notifies_each_booking_event() {
        let notifier = Arc::new(RecordingNotifier::default());
        let listener = NotificationListener::new(notifier.clone());

        listener
            .on_appended(&[
                record(&created(), 1),
                record(&BookingEvent::booking_cancelled(UserId::new("alice"), None), 2),
            ])
            .await;

        assert_eq!(
            *notifier.sent.lock().unwrap(),
            vec!["BookingCreated", "BookingCancelled"]
        );
    }

    #[tokio::test]
    async fn failures_and_unknown_records_are_swallowed() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let listener = NotificationListener::new(notifier.clone());
        let mut unknown = record(&created(), 2);
        unknown.event_type = "Mystery".to_string();

        listener.on_appended(&[record(&created(), 1), unknown]).await;

        assert_eq!(*notifier.sent.lock().unwrap(), vec!["BookingCreated"]);
    }

    #[tokio::test]
    async fn logging_notifier_never_fails() {
        assert!(LoggingNotifier.notify(StreamId::new(), &created()).await.is_ok());
    }
}
