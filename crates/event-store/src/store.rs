use async_trait::async_trait;

use crate::{
    EventNumber, EventStoreError, ExpectedVersion, LogPosition, NewEvent, ReadAllCompleted,
    ReadEventCompleted, ReadEventResult, ReadStreamCompleted, ReadStreamResult, RecordedEvent,
    Result, StreamId,
};

/// Page size used by helpers that read a whole stream.
pub const READ_PAGE_SIZE: usize = 500;

/// Where an append landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    pub first_event_number: EventNumber,
    pub last_event_number: EventNumber,
    /// Log position of the last appended event.
    pub position: LogPosition,
}

/// Core trait for the append-only log.
///
/// Reads never fail for "expected" outcomes like a missing or deleted
/// stream: those come back in the completed message's `result`. `Err` is
/// reserved for infrastructure failures and rejected appends.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to a stream atomically.
    ///
    /// Fails with `WrongExpectedVersion` when `expected` does not match the
    /// stream's last event number, and with `StreamDeleted` after a hard delete.
    async fn append(
        &self,
        stream: &StreamId,
        events: Vec<NewEvent>,
        expected: ExpectedVersion,
    ) -> Result<AppendResult>;

    /// Hard-deletes a stream. Later appends and reads report it as deleted.
    async fn delete_stream(&self, stream: &StreamId, expected: ExpectedVersion) -> Result<()>;

    /// Reads one event. `EventNumber::LAST` reads the stream's latest event.
    async fn read_event(&self, stream: &StreamId, number: EventNumber)
    -> Result<ReadEventCompleted>;

    /// Reads up to `max_count` events starting at `from`, ascending.
    async fn read_stream_forward(
        &self,
        stream: &StreamId,
        from: EventNumber,
        max_count: usize,
    ) -> Result<ReadStreamCompleted>;

    /// Reads up to `max_count` events starting at `from`, descending.
    /// `EventNumber::LAST` starts from the head of the stream.
    async fn read_stream_backward(
        &self,
        stream: &StreamId,
        from: EventNumber,
        max_count: usize,
    ) -> Result<ReadStreamCompleted>;

    /// Reads up to `max_count` events of the global log at or after `from`.
    async fn read_all_forward(&self, from: LogPosition, max_count: usize)
    -> Result<ReadAllCompleted>;

    /// Reads up to `max_count` events of the global log before `from`.
    /// `LogPosition::END` starts from the head of the log.
    async fn read_all_backward(
        &self,
        from: LogPosition,
        max_count: usize,
    ) -> Result<ReadAllCompleted>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event.
    async fn append_event(
        &self,
        stream: &StreamId,
        event: NewEvent,
        expected: ExpectedVersion,
    ) -> Result<AppendResult> {
        self.append(stream, vec![event], expected).await
    }

    /// Reads a whole stream forward. A missing stream reads as empty.
    async fn read_stream_to_end(&self, stream: &StreamId) -> Result<Vec<RecordedEvent>> {
        let mut events = Vec::new();
        let mut from = EventNumber::first();
        loop {
            let page = self
                .read_stream_forward(stream, from, READ_PAGE_SIZE)
                .await?;
            match page.result {
                ReadStreamResult::Success => {}
                ReadStreamResult::NoStream => return Ok(events),
                ReadStreamResult::StreamDeleted => {
                    return Err(EventStoreError::StreamDeleted(stream.clone()));
                }
                ReadStreamResult::AccessDenied => {
                    return Err(EventStoreError::AccessDenied(stream.clone()));
                }
                ReadStreamResult::Error | ReadStreamResult::NotModified => {
                    return Err(EventStoreError::Unavailable(
                        page.error.unwrap_or_else(|| format!("read of {stream} failed")),
                    ));
                }
            }
            events.extend(page.events);
            if page.is_end_of_stream {
                return Ok(events);
            }
            from = page.next_event_number;
        }
    }

    /// Returns the latest event of a stream, if any.
    async fn last_event(&self, stream: &StreamId) -> Result<Option<RecordedEvent>> {
        let read = self.read_event(stream, EventNumber::LAST).await?;
        match read.result {
            ReadEventResult::Success => Ok(read.record),
            ReadEventResult::NotFound | ReadEventResult::NoStream => Ok(None),
            ReadEventResult::StreamDeleted => Err(EventStoreError::StreamDeleted(stream.clone())),
            ReadEventResult::AccessDenied => Err(EventStoreError::AccessDenied(stream.clone())),
            ReadEventResult::Error => Err(EventStoreError::Unavailable(
                read.error
                    .unwrap_or_else(|| format!("read of {stream} failed")),
            )),
        }
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates an append request before it touches storage.
pub fn validate_events_for_append(stream: &StreamId, events: &[NewEvent]) -> Result<()> {
    if events.is_empty() {
        return Err(EventStoreError::InvalidAppend(format!(
            "cannot append an empty event list to {stream}"
        )));
    }
    if let Some(event) = events.iter().find(|e| e.event_type.is_empty()) {
        return Err(EventStoreError::InvalidAppend(format!(
            "event {} has an empty event type",
            event.event_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_append_is_rejected() {
        let stream = StreamId::new("s").unwrap();
        let err = validate_events_for_append(&stream, &[]).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
    }

    #[test]
    fn blank_event_type_is_rejected() {
        let stream = StreamId::new("s").unwrap();
        let event = NewEvent::builder()
            .event_type("")
            .data_raw(serde_json::json!({}))
            .build();
        assert!(validate_events_for_append(&stream, &[event]).is_err());
    }
}
