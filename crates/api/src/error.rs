//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use event_store::EventStoreError;
use feed::{EmptyReason, FeedError};
use projections::ProjectionError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Projection management error.
    Projection(ProjectionError),
    /// Log error outside of a projection.
    EventStore(EventStoreError),
    /// Malformed feed parameters.
    Feed(FeedError),
    /// A read that produced nothing to render.
    Empty(EmptyReason),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Projection(err) => projection_error_to_response(err),
            ApiError::EventStore(err) => event_store_error_to_response(err),
            ApiError::Feed(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            ApiError::Empty(reason) => empty_reason_to_response(reason),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn projection_error_to_response(err: ProjectionError) -> (StatusCode, String) {
    match err {
        ProjectionError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        ProjectionError::AlreadyExists(_) | ProjectionError::InvalidState { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        ProjectionError::ActorUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        ProjectionError::EventStore(inner) => event_store_error_to_response(inner),
        ProjectionError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn event_store_error_to_response(err: EventStoreError) -> (StatusCode, String) {
    let status = match &err {
        EventStoreError::WrongExpectedVersion { .. } => StatusCode::CONFLICT,
        EventStoreError::StreamDeleted(_) => StatusCode::GONE,
        EventStoreError::AccessDenied(_) => StatusCode::UNAUTHORIZED,
        EventStoreError::InvalidAppend(_) => StatusCode::BAD_REQUEST,
        EventStoreError::Timeout(_) | EventStoreError::Unavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn empty_reason_to_response(reason: EmptyReason) -> (StatusCode, String) {
    match reason {
        EmptyReason::NotFound => (StatusCode::NOT_FOUND, "Event not found".to_string()),
        EmptyReason::NoStream => (StatusCode::NOT_FOUND, "Stream not found".to_string()),
        EmptyReason::StreamDeleted => (StatusCode::GONE, "Stream deleted".to_string()),
        EmptyReason::AccessDenied => (StatusCode::UNAUTHORIZED, "Access denied".to_string()),
        EmptyReason::Error(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            msg.unwrap_or_else(|| "Read failed".to_string()),
        ),
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}

impl From<EventStoreError> for ApiError {
    fn from(err: EventStoreError) -> Self {
        ApiError::EventStore(err)
    }
}

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        ApiError::Feed(err)
    }
}

impl From<common::IdentifierError> for ApiError {
    fn from(err: common::IdentifierError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
