//! Feed endpoints over the global log.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use common::LogPosition;
use event_store::{ReadDirection, ReadResult};
use feed::PageCursor;

use crate::error::ApiError;
use crate::routes::render::{FeedQuery, HEAD, parse_count, parse_page_direction, render};
use crate::state::AppState;

/// GET /all: the newest page of the log, backward.
#[tracing::instrument(skip(state, query, headers))]
pub async fn head(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let embed = query.embed()?;
    let read = state
        .store
        .read_all_backward(LogPosition::END, state.page_size)
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

/// GET /all/{position}/{direction}/{count}: one page of the log.
#[tracing::instrument(skip(state, query, headers))]
pub async fn page(
    State(state): State<Arc<AppState>>,
    Path((position, direction, count)): Path<(String, String, String)>,
    Query(query): Query<FeedQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let embed = query.embed()?;
    let direction = parse_page_direction(&direction)?;
    let count = parse_count(&count)?;

    let (from, cursor) = match (position.as_str(), direction) {
        (HEAD, ReadDirection::Backward) => (LogPosition::END, PageCursor::head(count)),
        (HEAD, ReadDirection::Forward) => {
            return Err(ApiError::BadRequest(
                "A forward read cannot start at head".to_string(),
            ));
        }
        (position, _) => (position.parse::<LogPosition>()?, PageCursor::at(count)),
    };

    let read: ReadResult = match direction {
        ReadDirection::Forward => state.store.read_all_forward(from, count).await?,
        ReadDirection::Backward => state.store.read_all_backward(from, count).await?,
    }
    .into();
    render(&state, read, embed, direction, cursor, &headers)
}
