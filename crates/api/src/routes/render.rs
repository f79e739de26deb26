//! Feed rendering shared by the stream and `$all` routes.

use std::str::FromStr;

use axum::Json;
use axum::http::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use event_store::{ReadDirection, ReadResult};
use feed::{CacheDecision, EmbedLevel, FeedOutput, PageCursor, parse_direction};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Largest page a client may request.
pub const MAX_PAGE_SIZE: usize = 4096;

/// Path segment naming the newest page.
pub const HEAD: &str = "head";

/// Query string accepted by every feed route.
#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub embed: Option<String>,
}

impl FeedQuery {
    pub fn embed(&self) -> Result<EmbedLevel, ApiError> {
        match self.embed.as_deref() {
            None | Some("") => Ok(EmbedLevel::default()),
            Some(level) => Ok(EmbedLevel::from_str(level)?),
        }
    }
}

/// Parses a `{count}` path segment.
pub fn parse_count(segment: &str) -> Result<usize, ApiError> {
    match segment.parse::<usize>() {
        Ok(count) if (1..=MAX_PAGE_SIZE).contains(&count) => Ok(count),
        _ => Err(ApiError::BadRequest(format!(
            "Invalid page size {segment}: expected 1..={MAX_PAGE_SIZE}"
        ))),
    }
}

/// Parses a `{forward|backward}` path segment.
pub fn parse_page_direction(segment: &str) -> Result<ReadDirection, ApiError> {
    Ok(parse_direction(segment)?)
}

/// Answers a completed read: `304` when the client's validator is current,
/// the rendered feed or entry otherwise, or the status of an empty read.
pub fn render(
    state: &AppState,
    read: ReadResult,
    embed: EmbedLevel,
    direction: ReadDirection,
    cursor: PageCursor,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let if_none_match = headers
        .get(IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok());

    let (validator, cache_control) = match state.cache.decide(&read, embed, if_none_match) {
        CacheDecision::NotModified { validator } => {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            set_header(&mut response, ETAG, &validator.header_value());
            return Ok(response);
        }
        CacheDecision::Render {
            validator,
            cache_control,
        } => (validator, cache_control),
    };

    let mut response = match state.adapter.adapt(&read, embed, direction, cursor) {
        FeedOutput::Feed(document) => Json(document).into_response(),
        FeedOutput::Entry(entry) => Json(entry).into_response(),
        FeedOutput::NotModified => StatusCode::NOT_MODIFIED.into_response(),
        FeedOutput::Empty(reason) => return Err(ApiError::Empty(reason)),
    };
    if let Some(validator) = validator {
        set_header(&mut response, ETAG, &validator.header_value());
    }
    set_header(&mut response, CACHE_CONTROL, &cache_control.header_value());
    Ok(response)
}

fn set_header(response: &mut Response, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            response.headers_mut().insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, value, "skipping unrepresentable header"),
    }
}
