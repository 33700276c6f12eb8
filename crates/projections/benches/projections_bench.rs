use chrono::{Duration, TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{BookingEvent, DomainEvent, TimeSlot};
use event_store::{
    EventRecord, EventStore, EventStoreExt, GlobalPosition, InMemoryEventStore, NewEvent,
    SequenceNumber, StreamId,
};
use projections::{BookingFilter, InMemoryReadModelStore, Page, ProjectionEngine, ReadModelStore};

fn slot(offset_hours: i64) -> TimeSlot {
    let start = Utc.with_ymd_and_hms(2025, 5, 12, 0, 0, 0).unwrap() + Duration::hours(offset_hours);
    TimeSlot::with_duration(start, Duration::minutes(60)).unwrap()
}

fn new_event(event: BookingEvent) -> NewEvent {
    NewEvent::new(event.event_type(), event.to_payload().unwrap())
}

/// Populate a store with N bookings, each having 3 events (created + rescheduled + cancelled).
async fn populate_store(store: &InMemoryEventStore, n: i64) -> Vec<StreamId> {
    let mut ids = Vec::new();
    for i in 0..n {
        let booking_id = StreamId::new();
        let user = format!("user-{}", i % 10);
        let events = vec![
            new_event(BookingEvent::booking_created(
                booking_id,
                user.as_str().into(),
                format!("room-{}", i % 5).into(),
                slot(i),
            )),
            new_event(BookingEvent::booking_rescheduled(
                slot(i),
                slot(i + 1),
                user.as_str().into(),
            )),
            new_event(BookingEvent::booking_cancelled(user.into(), None)),
        ];
        store
            .append(booking_id, SequenceNumber::initial(), events)
            .await
            .unwrap();
        ids.push(booking_id);
    }
    ids
}

fn bench_catch_up(c: &mut Criterion, bookings: i64) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();

    rt.block_on(populate_store(&store, bookings));

    c.bench_function(&format!("projections/catch_up_{}_events", bookings * 3), |b| {
        b.iter(|| {
            rt.block_on(async {
                let engine = ProjectionEngine::new(store.clone(), InMemoryReadModelStore::new());
                engine.catch_up(GlobalPosition::start()).await.unwrap();
            });
        });
    });
}

fn bench_catch_up_100_bookings(c: &mut Criterion) {
    bench_catch_up(c, 100);
}

fn bench_catch_up_1000_bookings(c: &mut Criterion) {
    bench_catch_up(c, 1000);
}

fn bench_apply_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let engine = ProjectionEngine::new(store.clone(), InMemoryReadModelStore::new());

    c.bench_function("projections/apply_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let booking_id = StreamId::new();
                let records: Vec<EventRecord> = store
                    .append(
                        booking_id,
                        SequenceNumber::initial(),
                        vec![new_event(BookingEvent::booking_created(
                            booking_id,
                            "alice".into(),
                            "room-1".into(),
                            slot(0),
                        ))],
                    )
                    .await
                    .unwrap();
                engine.apply_event(&records[0]).await.unwrap();
            });
        });
    });
}

fn bench_list_by_user(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let engine = ProjectionEngine::new(store.clone(), InMemoryReadModelStore::new());

    rt.block_on(async {
        populate_store(&store, 1000).await;
        engine.catch_up(GlobalPosition::start()).await.unwrap();
    });

    let filter = BookingFilter::new().user("user-3");
    c.bench_function("projections/list_by_user_1000_bookings", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine
                    .read_models()
                    .list(&filter, Page::default())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_rebuild_stream(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let engine = ProjectionEngine::new(store.clone(), InMemoryReadModelStore::new());

    let booking_id = rt.block_on(async {
        let ids = populate_store(&store, 1).await;
        assert_eq!(store.read_stream(ids[0]).await.unwrap().len(), 3);
        ids[0]
    });

    c.bench_function("projections/rebuild_stream", |b| {
        b.iter(|| {
            rt.block_on(async {
                engine.rebuild(booking_id).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_catch_up_100_bookings,
    bench_catch_up_1000_bookings,
    bench_apply_single_event,
    bench_list_by_user,
    bench_rebuild_stream,
);
criterion_main!(benches);
