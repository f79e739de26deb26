//! Stream append and stream feed endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::Response;
use common::{LogPosition, StreamId};
use event_store::{EventId, EventNumber, ExpectedVersion, NewEvent, ReadDirection, ReadResult};
use feed::PageCursor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::render::{FeedQuery, HEAD, parse_count, parse_page_direction, render};
use crate::state::AppState;

/// Header carrying the optimistic concurrency expectation of an append.
pub const EXPECTED_VERSION_HEADER: &str = "es-expectedversion";

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendEventRequest {
    pub event_id: Option<Uuid>,
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl AppendEventRequest {
    fn into_event(self) -> Result<NewEvent, ApiError> {
        if self.event_type.trim().is_empty() {
            return Err(ApiError::BadRequest("eventType must not be empty".to_string()));
        }
        let mut builder = NewEvent::builder()
            .event_type(self.event_type)
            .data_raw(self.data);
        if let Some(id) = self.event_id {
            builder = builder.event_id(EventId::from_uuid(id));
        }
        for (key, value) in self.metadata {
            builder = builder.metadata(key, value);
        }
        builder
            .try_build()
            .ok_or_else(|| ApiError::BadRequest("Incomplete event".to_string()))
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResponse {
    pub first_event_number: EventNumber,
    pub last_event_number: EventNumber,
    pub position: LogPosition,
}

// -- Handlers --

/// POST /streams/{stream}: append events, honouring `ES-ExpectedVersion`.
#[tracing::instrument(skip(state, headers, events), fields(count = events.len()))]
pub async fn append(
    State(state): State<Arc<AppState>>,
    Path(stream): Path<String>,
    headers: HeaderMap,
    Json(events): Json<Vec<AppendEventRequest>>,
) -> Result<(StatusCode, [(HeaderName, String); 1], Json<AppendResponse>), ApiError> {
    let stream = StreamId::new(stream)?;
    let expected = expected_version(&headers)?;
    if events.is_empty() {
        return Err(ApiError::BadRequest("No events to append".to_string()));
    }
    let events = events
        .into_iter()
        .map(AppendEventRequest::into_event)
        .collect::<Result<Vec<_>, _>>()?;
    let count = events.len();

    let appended = state.store.append(&stream, events, expected).await?;
    metrics::counter!("events_appended_total").increment(count as u64);
    tracing::info!(%stream, last = %appended.last_event_number, "events appended");

    let location = state
        .adapter
        .urls()
        .event(&stream, appended.first_event_number);
    Ok((
        StatusCode::CREATED,
        [(LOCATION, location)],
        Json(AppendResponse {
            first_event_number: appended.first_event_number,
            last_event_number: appended.last_event_number,
            position: appended.position,
        }),
    ))
}

/// GET /streams/{stream}: the newest page, backward.
#[tracing::instrument(skip(state, query, headers))]
pub async fn head(
    State(state): State<Arc<AppState>>,
    Path(stream): Path<String>,
    Query(query): Query<FeedQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let stream = StreamId::new(stream)?;
    let embed = query.embed()?;
    let read = state
        .store
        .read_stream_backward(&stream, EventNumber::LAST, state.page_size)
        .await?;
    render(
        &state,
        read.into(),
        embed,
        ReadDirection::Backward,
        PageCursor::head(state.page_size),
        &headers,
    )
}

/// GET /streams/{stream}/{event}: one event, by number or `head`.
#[tracing::instrument(skip(state, query, headers))]
pub async fn event(
    State(state): State<Arc<AppState>>,
    Path((stream, event)): Path<(String, String)>,
    Query(query): Query<FeedQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let stream = StreamId::new(stream)?;
    let embed = query.embed()?;
    let number = if event == HEAD {
        EventNumber::LAST
    } else {
        parse_event_number(&event)?
    };
    let read = state.store.read_event(&stream, number).await?;
    render(
        &state,
        read.into(),
        embed,
        ReadDirection::Forward,
        PageCursor::at(1),
        &headers,
    )
}

/// GET /streams/{stream}/{from}/{direction}/{count}: one page of a stream.
#[tracing::instrument(skip(state, query, headers))]
pub async fn page(
    State(state): State<Arc<AppState>>,
    Path((stream, from, direction, count)): Path<(String, String, String, String)>,
    Query(query): Query<FeedQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let stream = StreamId::new(stream)?;
    let embed = query.embed()?;
    let direction = parse_page_direction(&direction)?;
    let count = parse_count(&count)?;

    let (from, cursor) = match (from.as_str(), direction) {
        (HEAD, ReadDirection::Backward) => (EventNumber::LAST, PageCursor::head(count)),
        (HEAD, ReadDirection::Forward) => {
            return Err(ApiError::BadRequest(
                "A forward read cannot start at head".to_string(),
            ));
        }
        (number, _) => (parse_event_number(number)?, PageCursor::at(count)),
    };

    let read: ReadResult = match direction {
        ReadDirection::Forward => state.store.read_stream_forward(&stream, from, count).await?,
        ReadDirection::Backward => state.store.read_stream_backward(&stream, from, count).await?,
    }
    .into();
    render(&state, read, embed, direction, cursor, &headers)
}

fn expected_version(headers: &HeaderMap) -> Result<ExpectedVersion, ApiError> {
    let Some(value) = headers.get(EXPECTED_VERSION_HEADER) else {
        return Ok(ExpectedVersion::Any);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {EXPECTED_VERSION_HEADER} header")))
}

fn parse_event_number(segment: &str) -> Result<EventNumber, ApiError> {
    match segment.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(EventNumber::new(n)),
        _ => Err(ApiError::BadRequest(format!("Invalid event number: {segment}"))),
    }
}
