//! HTTP API server with observability for the booking engine.
//!
//! Provides REST endpoints for booking commands and queries, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{BookingService, LoggingNotifier, NotificationListener};
use event_store::{EventStore, InMemoryEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{BookingQueries, InMemoryReadModelStore, ProjectionEngine, ReadModelStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::bookings::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, R>(state: Arc<AppState<S, R>>, metrics_handle: PrometheusHandle) -> Router
where
    S: EventStore + 'static,
    R: ReadModelStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S, R>))
        .route(
            "/bookings",
            post(routes::bookings::create::<S, R>).get(routes::bookings::list::<S, R>),
        )
        .route("/bookings/{id}", get(routes::bookings::get::<S, R>))
        .route(
            "/bookings/{id}/reschedule",
            post(routes::bookings::reschedule::<S, R>),
        )
        .route("/bookings/{id}/cancel", post(routes::bookings::cancel::<S, R>))
        .route("/bookings/{id}/events", get(routes::bookings::events::<S, R>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the write side, projection engine and queries over the given stores.
///
/// The projection engine is registered as the booking service's slot index
/// and as a listener, so read models are updated before a command returns.
pub fn create_state<S, R>(events: S, views: R, config: &Config) -> Arc<AppState<S, R>>
where
    S: EventStore + Clone + 'static,
    R: ReadModelStore + Clone + 'static,
{
    let projections = Arc::new(ProjectionEngine::new(events.clone(), views.clone()));

    let bookings = BookingService::new(events.clone(), projections.clone())
        .with_retry_policy(config.retry_policy())
        .with_listener(projections.clone())
        .with_listener(Arc::new(NotificationListener::new(LoggingNotifier)));

    Arc::new(AppState {
        bookings,
        queries: BookingQueries::new(events, views),
        projections,
        default_slot: config.default_slot(),
    })
}

/// Creates the default application state backed by in-memory stores.
pub fn create_default_state(
    config: &Config,
) -> Arc<AppState<InMemoryEventStore, InMemoryReadModelStore>> {
    create_state(
        InMemoryEventStore::new(),
        InMemoryReadModelStore::new(),
        config,
    )
}
