//! Conditional-read decisions for feeds.
//!
//! Stream pages validate on `(stream, last event number, embed)` and `$all`
//! pages on `(last commit position, embed)`. Single-event reads carry no
//! validator and always re-render.

use std::time::Duration;

use event_store::{ReadAllResult, ReadResult, ReadStreamResult};
use tracing::debug;

use crate::EmbedLevel;

/// Opaque entity tag of a rendered feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Validator(String);

impl Validator {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quoted form for the `ETag` header.
    pub fn header_value(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// True if an `If-None-Match` header value names this validator.
    pub fn matches(&self, if_none_match: &str) -> bool {
        if_none_match.split(',').map(str::trim).any(|tag| {
            tag == "*" || tag.trim_start_matches("W/").trim_matches('"') == self.0
        })
    }
}

impl std::fmt::Display for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache lifetime hint for a rendered response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheControl {
    NoCache,
    MaxAge(Duration),
}

impl CacheControl {
    /// Value for the `Cache-Control` header.
    pub fn header_value(&self) -> String {
        match self {
            CacheControl::NoCache => "no-cache".to_string(),
            CacheControl::MaxAge(age) => format!("max-age={}", age.as_secs()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// The client's representation is current.
    NotModified { validator: Validator },
    /// Render the read, tagging the response with `validator` if present.
    Render {
        validator: Option<Validator>,
        cache_control: CacheControl,
    },
}

/// Decides between `NotModified` and re-rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCache {
    /// Max age of pages that can still gain events.
    pub head_max_age: Duration,
    /// Max age of full historical pages, which never change.
    pub page_max_age: Duration,
}

impl Default for FeedCache {
    fn default() -> Self {
        Self {
            head_max_age: Duration::from_secs(1),
            page_max_age: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

impl FeedCache {
    pub fn new(head_max_age: Duration, page_max_age: Duration) -> Self {
        Self {
            head_max_age,
            page_max_age,
        }
    }

    /// The validator of a successful directional read.
    pub fn validator(read: &ReadResult, embed: EmbedLevel) -> Option<Validator> {
        match read {
            ReadResult::Event(_) => None,
            ReadResult::Stream(r) if r.result == ReadStreamResult::Success => Some(Validator(
                format!("{}:{};{embed}", r.stream_id, r.last_event_number),
            )),
            ReadResult::All(r) if r.result == ReadAllResult::Success => Some(Validator(format!(
                "$all:{};{embed}",
                r.tf_last_commit_position
            ))),
            _ => None,
        }
    }

    /// Decides how to answer `read` given the client's `If-None-Match` value.
    pub fn decide(
        &self,
        read: &ReadResult,
        embed: EmbedLevel,
        if_none_match: Option<&str>,
    ) -> CacheDecision {
        let Some(validator) = Self::validator(read, embed) else {
            return CacheDecision::Render {
                validator: None,
                cache_control: CacheControl::NoCache,
            };
        };
        if if_none_match.is_some_and(|prior| validator.matches(prior)) {
            metrics::counter!("feed_not_modified_total", "kind" => read.kind()).increment(1);
            debug!(kind = read.kind(), %validator, "feed not modified");
            return CacheDecision::NotModified { validator };
        }
        CacheDecision::Render {
            cache_control: self.cache_control(read),
            validator: Some(validator),
        }
    }

    fn cache_control(&self, read: &ReadResult) -> CacheControl {
        let historical = match read {
            ReadResult::Event(_) => return CacheControl::NoCache,
            ReadResult::Stream(r) => {
                r.events.len() >= r.max_count && !r.from_event_number.is_last()
            }
            ReadResult::All(r) => r.events.len() >= r.max_count && !r.current_pos.is_end(),
        };
        if historical {
            CacheControl::MaxAge(self.page_max_age)
        } else {
            CacheControl::MaxAge(self.head_max_age)
        }
    }
}
