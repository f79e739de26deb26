//! Completed-read messages returned by the log.
//!
//! Each read kind has its own result enum, so `NotModified` cannot be
//! produced for a single-event read and `NotFound` only exists there.

use serde::{Deserialize, Serialize};

use crate::{EventNumber, LogPosition, RecordedEvent, StreamId};

/// Direction of a paged read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadDirection {
    Forward,
    Backward,
}

impl ReadDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadDirection::Forward => "forward",
            ReadDirection::Backward => "backward",
        }
    }
}

impl std::fmt::Display for ReadDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of reading one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadEventResult {
    Success,
    NotFound,
    NoStream,
    StreamDeleted,
    Error,
    AccessDenied,
}

/// Outcome of a forward/backward read over one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadStreamResult {
    Success,
    NoStream,
    StreamDeleted,
    NotModified,
    Error,
    AccessDenied,
}

/// Outcome of a forward/backward read over the whole log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadAllResult {
    Success,
    NotModified,
    Error,
    AccessDenied,
}

/// A completed single-event read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadEventCompleted {
    pub stream_id: StreamId,
    /// The requested number (may be `EventNumber::LAST`).
    pub event_number: EventNumber,
    pub result: ReadEventResult,
    /// Present only for `Success`.
    pub record: Option<RecordedEvent>,
    pub error: Option<String>,
}

impl ReadEventCompleted {
    pub fn success(stream_id: StreamId, event_number: EventNumber, record: RecordedEvent) -> Self {
        Self {
            stream_id,
            event_number,
            result: ReadEventResult::Success,
            record: Some(record),
            error: None,
        }
    }

    /// A read that produced no record.
    pub fn failed(
        stream_id: StreamId,
        event_number: EventNumber,
        result: ReadEventResult,
        error: Option<String>,
    ) -> Self {
        Self {
            stream_id,
            event_number,
            result,
            record: None,
            error,
        }
    }
}

/// A completed page read over one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadStreamCompleted {
    pub stream_id: StreamId,
    pub direction: ReadDirection,
    /// First requested event number (`LAST` for a backward read from the head).
    pub from_event_number: EventNumber,
    pub max_count: usize,
    pub result: ReadStreamResult,
    /// Events in read order: ascending when forward, descending when backward.
    pub events: Vec<RecordedEvent>,
    /// Where the next page in the same direction starts.
    pub next_event_number: EventNumber,
    /// Number of the last event in the stream at read time.
    pub last_event_number: EventNumber,
    /// Forward: no events after this page. Backward: the page reached event 0.
    pub is_end_of_stream: bool,
    /// Commit position of the log head at read time.
    pub tf_last_commit_position: i64,
    pub error: Option<String>,
}

impl ReadStreamCompleted {
    /// A read that produced no events (`NoStream`, `StreamDeleted`, `Error`, ...).
    pub fn failed(
        stream_id: StreamId,
        direction: ReadDirection,
        from_event_number: EventNumber,
        max_count: usize,
        result: ReadStreamResult,
        error: Option<String>,
    ) -> Self {
        Self {
            stream_id,
            direction,
            from_event_number,
            max_count,
            result,
            events: Vec::new(),
            next_event_number: EventNumber::LAST,
            last_event_number: EventNumber::LAST,
            is_end_of_stream: true,
            tf_last_commit_position: -1,
            error,
        }
    }

    /// Turns this read into a `NotModified` answer carrying the same cursor fields.
    pub fn into_not_modified(self) -> Self {
        Self {
            result: ReadStreamResult::NotModified,
            events: Vec::new(),
            ..self
        }
    }
}

/// A completed page read over the whole log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadAllCompleted {
    pub direction: ReadDirection,
    pub result: ReadAllResult,
    /// Events in read order: ascending when forward, descending when backward.
    pub events: Vec<RecordedEvent>,
    /// The requested position.
    pub current_pos: LogPosition,
    /// Where the next page in the same direction starts. A backward read
    /// that reached the first event of the log sets this to `START`.
    pub next_pos: LogPosition,
    /// Where a page in the opposite direction starts.
    pub prev_pos: LogPosition,
    /// Commit position of the log head at read time (`-1` for an empty log).
    pub tf_last_commit_position: i64,
    pub max_count: usize,
    pub error: Option<String>,
}

impl ReadAllCompleted {
    pub fn failed(
        direction: ReadDirection,
        current_pos: LogPosition,
        max_count: usize,
        result: ReadAllResult,
        error: Option<String>,
    ) -> Self {
        Self {
            direction,
            result,
            events: Vec::new(),
            current_pos,
            next_pos: current_pos,
            prev_pos: current_pos,
            tf_last_commit_position: -1,
            max_count,
            error,
        }
    }

    /// Forward: the page returned fewer events than requested. Backward: no
    /// event precedes this page.
    pub fn is_end_of_log(&self) -> bool {
        match self.direction {
            ReadDirection::Forward => self.events.len() < self.max_count,
            ReadDirection::Backward => self.next_pos <= LogPosition::START,
        }
    }

    /// Turns this read into a `NotModified` answer carrying the same cursor fields.
    pub fn into_not_modified(self) -> Self {
        Self {
            result: ReadAllResult::NotModified,
            events: Vec::new(),
            ..self
        }
    }
}

/// Any completed read, discriminated by read kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReadResult {
    Event(ReadEventCompleted),
    Stream(ReadStreamCompleted),
    All(ReadAllCompleted),
}

impl ReadResult {
    /// Short label of the read kind, used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ReadResult::Event(_) => "event",
            ReadResult::Stream(_) => "stream",
            ReadResult::All(_) => "all",
        }
    }

    /// True when the read was served successfully.
    pub fn is_success(&self) -> bool {
        match self {
            ReadResult::Event(r) => r.result == ReadEventResult::Success,
            ReadResult::Stream(r) => r.result == ReadStreamResult::Success,
            ReadResult::All(r) => r.result == ReadAllResult::Success,
        }
    }
}

impl From<ReadEventCompleted> for ReadResult {
    fn from(value: ReadEventCompleted) -> Self {
        ReadResult::Event(value)
    }
}

impl From<ReadStreamCompleted> for ReadResult {
    fn from(value: ReadStreamCompleted) -> Self {
        ReadResult::Stream(value)
    }
}

impl From<ReadAllCompleted> for ReadResult {
    fn from(value: ReadAllCompleted) -> Self {
        ReadResult::All(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> StreamId {
        StreamId::new("orders").unwrap()
    }

    #[test]
    fn failed_stream_read_has_no_events() {
        let read = ReadStreamCompleted::failed(
            stream(),
            ReadDirection::Forward,
            EventNumber::first(),
            20,
            ReadStreamResult::NoStream,
            None,
        );
        assert!(read.events.is_empty());
        assert!(read.is_end_of_stream);
        assert_eq!(read.last_event_number, EventNumber::LAST);
    }

    #[test]
    fn not_modified_keeps_cursor_fields() {
        let mut read = ReadAllCompleted::failed(
            ReadDirection::Forward,
            LogPosition::START,
            10,
            ReadAllResult::Success,
            None,
        );
        read.tf_last_commit_position = 42;
        let nm = read.into_not_modified();
        assert_eq!(nm.result, ReadAllResult::NotModified);
        assert_eq!(nm.tf_last_commit_position, 42);
    }

    #[test]
    fn read_result_kind_and_success() {
        let ev = ReadEventCompleted::failed(
            stream(),
            EventNumber::first(),
            ReadEventResult::NotFound,
            None,
        );
        let result = ReadResult::from(ev);
        assert_eq!(result.kind(), "event");
        assert!(!result.is_success());
    }

    #[test]
    fn direction_display() {
        assert_eq!(ReadDirection::Forward.to_string(), "forward");
        assert_eq!(ReadDirection::Backward.to_string(), "backward");
    }
}
