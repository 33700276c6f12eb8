//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_store::EventStore;
use projections::ReadModelStore;
use serde::Serialize;

use super::bookings::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,

    /// Booking streams whose read model failed to update and await repair.
    pub pending_repairs: usize,
}

/// GET /health: returns system health status.
///
/// Reports `degraded` while read models are queued for repair; the write
/// side keeps working either way.
pub async fn check<S, R>(State(state): State<Arc<AppState<S, R>>>) -> Json<HealthResponse>
where
    S: EventStore + 'static,
    R: ReadModelStore + 'static,
{
    let pending_repairs = state.projections.pending_repairs().await.len();
    let status = if pending_repairs == 0 { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        pending_repairs,
    })
}
