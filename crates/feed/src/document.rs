//! Feed documents handed to the serving layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{LogPosition, StreamId};
use event_store::{EventId, EventNumber};
use serde::Serialize;
use serde_json::Value;

/// Relation of a link to the document it appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    #[serde(rename = "self")]
    Current,
    First,
    Last,
    /// Newer events.
    Previous,
    /// Older events.
    Next,
    Edit,
    Alternate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub uri: String,
    pub relation: Relation,
}

impl Link {
    pub fn new(relation: Relation, uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            relation,
        }
    }
}

/// One event in a feed, populated according to the embed level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub updated: DateTime<Utc>,
    pub summary: String,
    pub links: Vec<Link>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_number: Option<EventNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<StreamId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<LogPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

/// A page of a stream or of `$all`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDocument {
    pub id: String,
    pub title: String,
    /// Timestamp of the newest entry on the page.
    pub updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<StreamId>,
    /// Terminal page: no further backward (`next`) link.
    pub head_of_stream: bool,
    pub links: Vec<Link>,
    pub entries: Vec<FeedEntry>,
}

impl FeedDocument {
    /// Returns the URI of the first link with `relation`.
    pub fn link(&self, relation: Relation) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.relation == relation)
            .map(|l| l.uri.as_str())
    }
}

/// Why a read produced no document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "camelCase")]
pub enum EmptyReason {
    NotFound,
    NoStream,
    StreamDeleted,
    AccessDenied,
    Error(Option<String>),
}

/// Outcome of adapting a read result.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutput {
    Feed(FeedDocument),
    Entry(FeedEntry),
    /// Nothing to render; the boundary picks the status signal.
    Empty(EmptyReason),
    /// The caller reuses its previously cached representation.
    NotModified,
}
