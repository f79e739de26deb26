//! Turns completed reads into feed documents.
//!
//! The adapter is pure: it never touches the log and never fails. Read
//! outcomes without content become [`FeedOutput::Empty`] and the serving
//! boundary decides how to represent them.

use common::{LogPosition, StreamId};
use event_store::{
    EventNumber, ReadAllCompleted, ReadAllResult, ReadDirection, ReadEventCompleted,
    ReadEventResult, ReadResult, ReadStreamCompleted, ReadStreamResult, RecordedEvent,
};
use tracing::debug;

use crate::{
    EmbedLevel, EmptyReason, FeedDocument, FeedEntry, FeedError, FeedOutput, Link, Relation,
};

/// Parses a `forward`/`backward` path segment.
pub fn parse_direction(s: &str) -> crate::Result<ReadDirection> {
    match s.to_ascii_lowercase().as_str() {
        "forward" => Ok(ReadDirection::Forward),
        "backward" => Ok(ReadDirection::Backward),
        _ => Err(FeedError::InvalidDirection(s.to_string())),
    }
}

/// Absolute feed URIs under a public base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedUrls {
    base: String,
}

impl FeedUrls {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn stream(&self, stream: &StreamId) -> String {
        format!("{}/streams/{stream}", self.base)
    }

    pub fn event(&self, stream: &StreamId, number: EventNumber) -> String {
        format!("{}/streams/{stream}/{number}", self.base)
    }

    pub fn stream_head_page(&self, stream: &StreamId, count: usize) -> String {
        format!("{}/streams/{stream}/head/backward/{count}", self.base)
    }

    pub fn stream_page(
        &self,
        stream: &StreamId,
        from: EventNumber,
        direction: ReadDirection,
        count: usize,
    ) -> String {
        format!("{}/streams/{stream}/{from}/{direction}/{count}", self.base)
    }

    pub fn all(&self) -> String {
        format!("{}/all", self.base)
    }

    pub fn all_head_page(&self, count: usize) -> String {
        format!("{}/all/head/backward/{count}", self.base)
    }

    pub fn all_page(&self, from: LogPosition, direction: ReadDirection, count: usize) -> String {
        format!("{}/all/{from}/{direction}/{count}", self.base)
    }
}

/// Where a requested page starts and how large pages are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    /// The caller asked for the newest page.
    pub head: bool,
    pub count: usize,
}

impl PageCursor {
    pub fn head(count: usize) -> Self {
        Self { head: true, count }
    }

    pub fn at(count: usize) -> Self {
        Self { head: false, count }
    }
}

/// Formats read results as feeds.
#[derive(Debug, Clone)]
pub struct ReadResultAdapter {
    urls: FeedUrls,
}

impl ReadResultAdapter {
    pub fn new(urls: FeedUrls) -> Self {
        Self { urls }
    }

    pub fn urls(&self) -> &FeedUrls {
        &self.urls
    }

    /// Adapts one completed read. Entries are ordered by `direction`:
    /// ascending for forward, descending for backward.
    pub fn adapt(
        &self,
        read: &ReadResult,
        embed: EmbedLevel,
        direction: ReadDirection,
        cursor: PageCursor,
    ) -> FeedOutput {
        let output = match read {
            ReadResult::Event(r) => self.adapt_event(r, embed),
            ReadResult::Stream(r) => self.adapt_stream(r, embed, direction, cursor),
            ReadResult::All(r) => self.adapt_all(r, embed, direction, cursor),
        };
        if let FeedOutput::Empty(reason) = &output {
            debug!(kind = read.kind(), ?reason, "read produced no feed");
        }
        output
    }

    /// A single entry at `embed`.
    pub fn entry(&self, event: &RecordedEvent, embed: EmbedLevel) -> FeedEntry {
        let uri = self.urls.event(&event.stream_id, event.event_number);
        let body = embed.includes_body();
        let rich = embed.includes_system_metadata();
        FeedEntry {
            id: uri.clone(),
            title: format!("{}@{}", event.event_number, event.stream_id),
            updated: event.timestamp,
            summary: event.event_type.clone(),
            links: vec![
                Link::new(Relation::Edit, uri.clone()),
                Link::new(Relation::Alternate, uri),
            ],
            event_type: body.then(|| event.event_type.clone()),
            event_number: body.then_some(event.event_number),
            stream_id: body.then(|| event.stream_id.clone()),
            data: body.then(|| event.data.clone()),
            event_id: rich.then_some(event.event_id),
            position: rich.then_some(event.position),
            metadata: rich.then(|| {
                event
                    .metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            }),
        }
    }

    fn adapt_event(&self, read: &ReadEventCompleted, embed: EmbedLevel) -> FeedOutput {
        match (read.result, &read.record) {
            (ReadEventResult::Success, Some(record)) => FeedOutput::Entry(self.entry(record, embed)),
            (ReadEventResult::Success, None) => FeedOutput::Empty(EmptyReason::Error(Some(
                format!("{}#{} read without a record", read.stream_id, read.event_number),
            ))),
            (ReadEventResult::NotFound, _) => FeedOutput::Empty(EmptyReason::NotFound),
            (ReadEventResult::NoStream, _) => FeedOutput::Empty(EmptyReason::NoStream),
            (ReadEventResult::StreamDeleted, _) => FeedOutput::Empty(EmptyReason::StreamDeleted),
            (ReadEventResult::AccessDenied, _) => FeedOutput::Empty(EmptyReason::AccessDenied),
            (ReadEventResult::Error, _) => {
                FeedOutput::Empty(EmptyReason::Error(read.error.clone()))
            }
        }
    }

    fn adapt_stream(
        &self,
        read: &ReadStreamCompleted,
        embed: EmbedLevel,
        direction: ReadDirection,
        cursor: PageCursor,
    ) -> FeedOutput {
        match read.result {
            ReadStreamResult::Success => {}
            ReadStreamResult::NotModified => return FeedOutput::NotModified,
            ReadStreamResult::NoStream => return FeedOutput::Empty(EmptyReason::NoStream),
            ReadStreamResult::StreamDeleted => {
                return FeedOutput::Empty(EmptyReason::StreamDeleted);
            }
            ReadStreamResult::AccessDenied => return FeedOutput::Empty(EmptyReason::AccessDenied),
            ReadStreamResult::Error => {
                return FeedOutput::Empty(EmptyReason::Error(read.error.clone()));
            }
        }

        let stream = &read.stream_id;
        let count = cursor.count;
        let mut events: Vec<&RecordedEvent> = read.events.iter().collect();
        events.sort_by_key(|e| e.event_number);
        if direction == ReadDirection::Backward {
            events.reverse();
        }

        let mut links = vec![
            Link::new(Relation::Current, self.urls.stream(stream)),
            Link::new(Relation::First, self.urls.stream_head_page(stream, count)),
        ];
        match direction {
            ReadDirection::Backward => {
                if !read.is_end_of_stream {
                    links.push(Link::new(
                        Relation::Last,
                        self.urls
                            .stream_page(stream, EventNumber::first(), ReadDirection::Forward, count),
                    ));
                }
                let newest = events
                    .first()
                    .map(|e| e.event_number)
                    .unwrap_or(read.last_event_number);
                links.push(Link::new(
                    Relation::Previous,
                    self.urls
                        .stream_page(stream, newest.next(), ReadDirection::Forward, count),
                ));
                if !read.is_end_of_stream {
                    links.push(Link::new(
                        Relation::Next,
                        self.urls.stream_page(
                            stream,
                            read.next_event_number,
                            ReadDirection::Backward,
                            count,
                        ),
                    ));
                }
            }
            ReadDirection::Forward => {
                let from = read.from_event_number.as_i64();
                if from > 0 {
                    links.push(Link::new(
                        Relation::Last,
                        self.urls
                            .stream_page(stream, EventNumber::first(), ReadDirection::Forward, count),
                    ));
                }
                links.push(Link::new(
                    Relation::Previous,
                    self.urls.stream_page(
                        stream,
                        read.next_event_number,
                        ReadDirection::Forward,
                        count,
                    ),
                ));
                if from > 0 {
                    links.push(Link::new(
                        Relation::Next,
                        self.urls.stream_page(
                            stream,
                            EventNumber::new(from - 1),
                            ReadDirection::Backward,
                            count,
                        ),
                    ));
                }
            }
        }

        FeedOutput::Feed(FeedDocument {
            id: self.urls.stream(stream),
            title: format!("Event stream '{stream}'"),
            updated: events.iter().map(|e| e.timestamp).max(),
            stream_id: Some(stream.clone()),
            head_of_stream: cursor.head
                || (direction == ReadDirection::Backward && read.is_end_of_stream),
            links,
            entries: events.into_iter().map(|e| self.entry(e, embed)).collect(),
        })
    }

    fn adapt_all(
        &self,
        read: &ReadAllCompleted,
        embed: EmbedLevel,
        direction: ReadDirection,
        cursor: PageCursor,
    ) -> FeedOutput {
        match read.result {
            ReadAllResult::Success => {}
            ReadAllResult::NotModified => return FeedOutput::NotModified,
            ReadAllResult::AccessDenied => return FeedOutput::Empty(EmptyReason::AccessDenied),
            ReadAllResult::Error => {
                return FeedOutput::Empty(EmptyReason::Error(read.error.clone()));
            }
        }

        let count = cursor.count;
        let mut events: Vec<&RecordedEvent> = read.events.iter().collect();
        events.sort_by_key(|e| e.position);
        if direction == ReadDirection::Backward {
            events.reverse();
        }
        let end_of_log = read.is_end_of_log();

        let mut links = vec![
            Link::new(Relation::Current, self.urls.all()),
            Link::new(Relation::First, self.urls.all_head_page(count)),
        ];
        match direction {
            ReadDirection::Backward => {
                if !end_of_log {
                    links.push(Link::new(
                        Relation::Last,
                        self.urls
                            .all_page(LogPosition::START, ReadDirection::Forward, count),
                    ));
                }
                links.push(Link::new(
                    Relation::Previous,
                    self.urls
                        .all_page(read.prev_pos, ReadDirection::Forward, count),
                ));
                if !end_of_log {
                    links.push(Link::new(
                        Relation::Next,
                        self.urls
                            .all_page(read.next_pos, ReadDirection::Backward, count),
                    ));
                }
            }
            ReadDirection::Forward => {
                let at_start = read.current_pos <= LogPosition::START;
                if !at_start {
                    links.push(Link::new(
                        Relation::Last,
                        self.urls
                            .all_page(LogPosition::START, ReadDirection::Forward, count),
                    ));
                }
                links.push(Link::new(
                    Relation::Previous,
                    self.urls
                        .all_page(read.next_pos, ReadDirection::Forward, count),
                ));
                if !at_start {
                    links.push(Link::new(
                        Relation::Next,
                        self.urls
                            .all_page(read.prev_pos, ReadDirection::Backward, count),
                    ));
                }
            }
        }

        FeedOutput::Feed(FeedDocument {
            id: self.urls.all(),
            title: "All events".to_string(),
            updated: events.iter().map(|e| e.timestamp).max(),
            stream_id: None,
            head_of_stream: cursor.head || (direction == ReadDirection::Backward && end_of_log),
            links,
            entries: events.into_iter().map(|e| self.entry(e, embed)).collect(),
        })
    }
}
