//! Booking command and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use domain::{
    Booking, BookingService, BookingStatus, CancelBooking, CommandOutcome, CreateBooking,
    RescheduleBooking, TimeSlot,
};
use event_store::{EventRecord, EventStore, StreamId};
use projections::{
    BookingFilter, BookingQueries, BookingView, Consistency, DEFAULT_PAGE_LIMIT, Page,
    ProjectionEngine, ReadModelStore,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::identity::Caller;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore, R> {
    pub bookings: BookingService<S>,
    pub queries: BookingQueries<S, R>,
    pub projections: Arc<ProjectionEngine<S, R>>,

    /// Slot length used when a request gives no duration.
    pub default_slot: chrono::Duration,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub resource_id: String,
    pub slot: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
}

#[derive(Deserialize)]
pub struct RescheduleRequest {
    pub slot: DateTime<Utc>,
    pub duration_minutes: Option<i64>,
}

#[derive(Deserialize, Default)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct GetParams {
    pub consistency: Option<Consistency>,
}

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub resource_id: Option<String>,
    pub status: Option<String>,
    pub starts_after: Option<DateTime<Utc>>,
    pub starts_before: Option<DateTime<Utc>>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CommandResponse {
    pub booking_id: String,
    pub sequence_number: i64,
    pub status: BookingStatus,
}

#[derive(Serialize)]
pub struct BookingResponse {
    pub booking_id: String,
    pub user_id: Option<String>,
    pub resource_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
    pub reschedule_count: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub sequence_number: i64,
}

impl From<BookingView> for BookingResponse {
    fn from(view: BookingView) -> Self {
        let booking = &view.booking;
        let slot = booking.slot();
        Self {
            booking_id: view.booking_id.to_string(),
            user_id: booking.user_id().map(|u| u.to_string()),
            resource_id: booking.resource_id().map(|r| r.to_string()),
            start: slot.map(|s| s.start()),
            end: slot.map(|s| s.end()),
            status: booking.status(),
            cancellation_reason: booking.cancellation_reason().map(String::from),
            reschedule_count: booking.reschedule_count(),
            created_at: booking.created_at(),
            updated_at: booking.updated_at(),
            sequence_number: view.last_applied_sequence_number.as_i64(),
        }
    }
}

#[derive(Serialize)]
pub struct BookingListResponse {
    pub items: Vec<BookingResponse>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Response type for stored event records.
#[derive(Serialize)]
pub struct EventResponse {
    pub event_id: String,
    pub event_type: String,
    pub sequence_number: i64,
    pub global_position: i64,
    pub recorded_at: String,
    pub actor: Option<String>,
    pub payload: serde_json::Value,
}

impl From<EventRecord> for EventResponse {
    fn from(record: EventRecord) -> Self {
        Self {
            event_id: record.event_id.to_string(),
            event_type: record.event_type,
            sequence_number: record.sequence_number.as_i64(),
            global_position: record.global_position.as_i64(),
            recorded_at: record.recorded_at.to_rfc3339(),
            actor: record.metadata.actor,
            payload: record.payload,
        }
    }
}

// -- Handlers --

/// POST /bookings: book a slot for the caller.
#[tracing::instrument(skip(state, caller, req), fields(user_id = %caller.0))]
pub async fn create<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    caller: Caller,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError>
where
    S: EventStore + 'static,
    R: ReadModelStore + 'static,
{
    let slot = requested_slot(&state, req.slot, req.duration_minutes)?;
    let cmd = CreateBooking::new(caller.0, req.resource_id, slot);
    let booking_id = cmd.booking_id;

    let outcome = state.bookings.create_booking(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(command_response(booking_id, &outcome)),
    ))
}

/// POST /bookings/{id}/reschedule: move the caller's booking to another slot.
#[tracing::instrument(skip(state, caller, req), fields(user_id = %caller.0))]
pub async fn reschedule<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<CommandResponse>, ApiError>
where
    S: EventStore + 'static,
    R: ReadModelStore + 'static,
{
    let booking_id = parse_booking_id(&id)?;
    let slot = requested_slot(&state, req.slot, req.duration_minutes)?;

    let outcome = state
        .bookings
        .reschedule_booking(RescheduleBooking::new(booking_id, slot, caller.0))
        .await?;

    Ok(Json(command_response(booking_id, &outcome)))
}

/// POST /bookings/{id}/cancel: cancel the caller's booking.
#[tracing::instrument(skip(state, caller, req), fields(user_id = %caller.0))]
pub async fn cancel<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    caller: Caller,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<CommandResponse>, ApiError>
where
    S: EventStore + 'static,
    R: ReadModelStore + 'static,
{
    let booking_id = parse_booking_id(&id)?;
    let mut cmd = CancelBooking::new(booking_id, caller.0);
    if let Some(reason) = req.reason {
        cmd = cmd.with_reason(reason);
    }

    let outcome = state.bookings.cancel_booking(cmd).await?;

    Ok(Json(command_response(booking_id, &outcome)))
}

/// GET /bookings/{id}?consistency=eventual|strong: one of the caller's bookings.
#[tracing::instrument(skip(state, caller, params), fields(user_id = %caller.0))]
pub async fn get<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    caller: Caller,
    Path(id): Path<String>,
    Query(params): Query<GetParams>,
) -> Result<Json<BookingResponse>, ApiError>
where
    S: EventStore + 'static,
    R: ReadModelStore + 'static,
{
    let booking_id = parse_booking_id(&id)?;
    let consistency = params.consistency.unwrap_or_default();

    let view = owned_view(&state.queries, &caller, booking_id, consistency).await?;
    Ok(Json(view.into()))
}

/// GET /bookings: the caller's bookings from the read models.
#[tracing::instrument(skip(state, caller, params), fields(user_id = %caller.0))]
pub async fn list<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> Result<Json<BookingListResponse>, ApiError>
where
    S: EventStore + 'static,
    R: ReadModelStore + 'static,
{
    let mut filter = BookingFilter::new().user(caller.0);
    if let Some(resource_id) = params.resource_id {
        filter = filter.resource(resource_id);
    }
    if let Some(status) = params.status {
        let status: BookingStatus = status
            .parse()
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
        filter = filter.status(status);
    }
    filter.starts_after = params.starts_after;
    filter.starts_before = params.starts_before;

    let page = Page::new(
        params.offset.unwrap_or(0),
        params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
    );
    let page = state.queries.list(&filter, page).await?;

    Ok(Json(BookingListResponse {
        items: page.items.into_iter().map(BookingResponse::from).collect(),
        total: page.total,
        offset: page.offset,
        limit: page.limit,
    }))
}

/// GET /bookings/{id}/events: the raw event history of one of the caller's bookings.
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.0))]
pub async fn events<S, R>(
    State(state): State<Arc<AppState<S, R>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventResponse>>, ApiError>
where
    S: EventStore + 'static,
    R: ReadModelStore + 'static,
{
    let booking_id = parse_booking_id(&id)?;
    owned_view(&state.queries, &caller, booking_id, Consistency::Strong).await?;

    let records = state.queries.history(booking_id).await?;
    Ok(Json(records.into_iter().map(EventResponse::from).collect()))
}

/// Loads a booking and checks that the caller owns it.
async fn owned_view<S, R>(
    queries: &BookingQueries<S, R>,
    caller: &Caller,
    booking_id: StreamId,
    consistency: Consistency,
) -> Result<BookingView, ApiError>
where
    S: EventStore,
    R: ReadModelStore,
{
    let view = queries
        .get(booking_id, consistency)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Booking {booking_id} not found")))?;

    if !view.booking.is_owned_by(&caller.0) {
        return Err(ApiError::Forbidden(
            "Booking belongs to another user".to_string(),
        ));
    }
    Ok(view)
}

fn requested_slot<S: EventStore, R>(
    state: &AppState<S, R>,
    start: DateTime<Utc>,
    duration_minutes: Option<i64>,
) -> Result<TimeSlot, ApiError> {
    let duration = match duration_minutes {
        Some(minutes) => chrono::Duration::try_minutes(minutes)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid duration: {minutes} minutes")))?,
        None => state.default_slot,
    };
    let end = start
        .checked_add_signed(duration)
        .ok_or_else(|| ApiError::BadRequest("Slot end is out of range".to_string()))?;

    Ok(TimeSlot::new(start, end)?)
}

fn command_response(booking_id: StreamId, outcome: &CommandOutcome<Booking>) -> CommandResponse {
    CommandResponse {
        booking_id: booking_id.to_string(),
        sequence_number: outcome.new_version.as_i64(),
        status: outcome.state.status(),
    }
}

fn parse_booking_id(id: &str) -> Result<StreamId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid booking ID: {e}")))
}
