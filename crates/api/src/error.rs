//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{BookingError, DomainError};
use event_store::EventStoreError;
use projections::ProjectionError;

/// API-level error type that maps to HTTP responses.
///
/// Every error renders as `{ "error": <message>, "retryable": <bool> }`.
#[derive(Debug)]
pub enum ApiError {
    /// The request carried no caller identity.
    Unauthorized(String),
    /// The caller may not touch this booking.
    Forbidden(String),
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Command rejected or failed on the write side.
    Domain(DomainError),
    /// Read side failure.
    Projection(ProjectionError),
}

impl ApiError {
    fn parts(self) -> (StatusCode, String, bool) {
        match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, false),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, false),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, false),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, false),
            ApiError::Domain(err) => {
                let retryable = err.is_retryable();
                (domain_error_status(&err), err.to_string(), retryable)
            }
            ApiError::Projection(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), false),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = self.parts();
        metrics::counter!("api_errors", "status" => status.as_u16().to_string()).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %message, %status, "internal server error");
        }

        let body = serde_json::json!({ "error": message, "retryable": retryable });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Booking(booking_err) => match booking_err {
            BookingError::NotFound => StatusCode::NOT_FOUND,
            BookingError::NotOwner => StatusCode::FORBIDDEN,
            BookingError::AlreadyExists { .. } | BookingError::SlotUnavailable { .. } => {
                StatusCode::CONFLICT
            }
            BookingError::AlreadyCancelled | BookingError::InvalidStateTransition { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            BookingError::InvalidSlot { .. }
            | BookingError::UserIdRequired
            | BookingError::ResourceIdRequired => StatusCode::BAD_REQUEST,
        },
        DomainError::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
        DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => {
            StatusCode::CONFLICT
        }
        DomainError::EventStore(EventStoreError::Validation { .. }) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Domain(DomainError::Booking(err))
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_store::StreamId;

    #[test]
    fn booking_rejections_map_to_client_errors() {
        let cases = [
            (BookingError::NotFound, StatusCode::NOT_FOUND),
            (BookingError::NotOwner, StatusCode::FORBIDDEN),
            (BookingError::AlreadyCancelled, StatusCode::UNPROCESSABLE_ENTITY),
            (BookingError::ResourceIdRequired, StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            let (actual, _, retryable) = ApiError::from(err).parts();
            assert_eq!(actual, status);
            assert!(!retryable);
        }
    }

    #[test]
    fn exhausted_conflict_is_retryable_409() {
        let err = ApiError::Domain(DomainError::ConcurrencyConflict {
            stream_id: StreamId::new(),
            attempts: 3,
        });
        let (status, _, retryable) = err.parts();
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(retryable);
    }

    #[test]
    fn missing_identity_is_401() {
        let (status, _, _) = ApiError::Unauthorized("missing".into()).parts();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
