use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    EventNumber, EventStoreError, ExpectedVersion, LogPosition, NewEvent, ReadAllCompleted,
    ReadAllResult, ReadDirection, ReadEventCompleted, ReadEventResult, ReadStreamCompleted,
    ReadStreamResult, RecordedEvent, Result, StreamId,
    store::{AppendResult, EventStore, validate_events_for_append},
};

#[derive(Default)]
struct LogState {
    /// The global log; a record's index is its commit and prepare position.
    records: Vec<RecordedEvent>,
    /// Indexes into `records`, per stream, in event-number order.
    streams: HashMap<StreamId, Vec<usize>>,
    deleted: HashSet<StreamId>,
    denied: HashSet<StreamId>,
    fail_next_appends: usize,
    fail_next_reads: usize,
}

impl LogState {
    fn last_event_number(&self, stream: &StreamId) -> Option<EventNumber> {
        self.streams
            .get(stream)
            .and_then(|idx| idx.len().checked_sub(1))
            .map(|n| EventNumber::new(n as i64))
    }

    fn tf_last_commit_position(&self) -> i64 {
        self.records.len() as i64 - 1
    }

    fn take_read_failure(&mut self) -> Result<()> {
        if self.fail_next_reads > 0 {
            self.fail_next_reads -= 1;
            return Err(EventStoreError::Unavailable(
                "injected read failure".to_string(),
            ));
        }
        Ok(())
    }

    fn stream_events(&self, stream: &StreamId) -> Vec<&RecordedEvent> {
        self.streams
            .get(stream)
            .map(|idx| idx.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }
}

fn position_of(index: usize) -> LogPosition {
    LogPosition::new(index as i64, index as i64)
}

/// In-memory log implementation for tests and single-node use.
///
/// Provides the same interface as the PostgreSQL implementation, plus
/// failure toggles for exercising retry and fault paths.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<LogState>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events in the global log.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Makes the next `count` appends fail with a transient timeout.
    pub async fn fail_next_appends(&self, count: usize) {
        self.state.write().await.fail_next_appends = count;
    }

    /// Makes the next `count` reads fail with a transient error.
    pub async fn fail_next_reads(&self, count: usize) {
        self.state.write().await.fail_next_reads = count;
    }

    /// Denies all access to a stream.
    pub async fn deny_access(&self, stream: StreamId) {
        self.state.write().await.denied.insert(stream);
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        stream: &StreamId,
        events: Vec<NewEvent>,
        expected: ExpectedVersion,
    ) -> Result<AppendResult> {
        validate_events_for_append(stream, &events)?;

        let mut state = self.state.write().await;
        if state.fail_next_appends > 0 {
            state.fail_next_appends -= 1;
            return Err(EventStoreError::Timeout(format!("append to {stream}")));
        }
        if state.denied.contains(stream) {
            return Err(EventStoreError::AccessDenied(stream.clone()));
        }
        if state.deleted.contains(stream) {
            return Err(EventStoreError::StreamDeleted(stream.clone()));
        }

        let current = state.last_event_number(stream);
        if !expected.is_satisfied_by(current) {
            return Err(EventStoreError::WrongExpectedVersion {
                stream: stream.clone(),
                expected,
                current,
            });
        }

        let first = current.map(|n| n.next()).unwrap_or_else(EventNumber::first);
        metrics::counter!("log_events_appended_total").increment(events.len() as u64);
        let mut number = first;
        let mut last = first;
        let mut position = LogPosition::START;
        for event in events {
            let index = state.records.len();
            position = position_of(index);
            last = number;
            state.records.push(RecordedEvent {
                event_id: event.event_id,
                stream_id: stream.clone(),
                event_number: number,
                event_type: event.event_type,
                position,
                timestamp: Utc::now(),
                data: event.data,
                metadata: event.metadata,
            });
            state.streams.entry(stream.clone()).or_default().push(index);
            number = number.next();
        }

        Ok(AppendResult {
            first_event_number: first,
            last_event_number: last,
            position,
        })
    }

    async fn delete_stream(&self, stream: &StreamId, expected: ExpectedVersion) -> Result<()> {
        let mut state = self.state.write().await;
        if state.denied.contains(stream) {
            return Err(EventStoreError::AccessDenied(stream.clone()));
        }
        if state.deleted.contains(stream) {
            return Err(EventStoreError::StreamDeleted(stream.clone()));
        }
        let current = state.last_event_number(stream);
        if !expected.is_satisfied_by(current) {
            return Err(EventStoreError::WrongExpectedVersion {
                stream: stream.clone(),
                expected,
                current,
            });
        }
        state.deleted.insert(stream.clone());
        Ok(())
    }

    async fn read_event(
        &self,
        stream: &StreamId,
        number: EventNumber,
    ) -> Result<ReadEventCompleted> {
        let mut state = self.state.write().await;
        state.take_read_failure()?;

        let failed = |result| ReadEventCompleted::failed(stream.clone(), number, result, None);
        if state.denied.contains(stream) {
            return Ok(failed(ReadEventResult::AccessDenied));
        }
        if state.deleted.contains(stream) {
            return Ok(failed(ReadEventResult::StreamDeleted));
        }
        let events = state.stream_events(stream);
        if events.is_empty() {
            return Ok(failed(ReadEventResult::NoStream));
        }
        let record = if number.is_last() {
            events.last().copied()
        } else {
            usize::try_from(number.as_i64())
                .ok()
                .and_then(|i| events.get(i).copied())
        };
        Ok(match record {
            Some(record) => ReadEventCompleted::success(stream.clone(), number, record.clone()),
            None => failed(ReadEventResult::NotFound),
        })
    }

    async fn read_stream_forward(
        &self,
        stream: &StreamId,
        from: EventNumber,
        max_count: usize,
    ) -> Result<ReadStreamCompleted> {
        let mut state = self.state.write().await;
        state.take_read_failure()?;

        let direction = ReadDirection::Forward;
        if let Some(result) = unreadable(&state, stream) {
            return Ok(ReadStreamCompleted::failed(
                stream.clone(),
                direction,
                from,
                max_count,
                result,
                None,
            ));
        }

        let all = state.stream_events(stream);
        let last = EventNumber::new(all.len() as i64 - 1);
        let start = from.as_i64().max(0) as usize;
        let events: Vec<RecordedEvent> = all
            .iter()
            .skip(start)
            .take(max_count)
            .map(|e| (*e).clone())
            .collect();
        let next = events
            .last()
            .map(|e| e.event_number.next())
            .unwrap_or(EventNumber::new(start as i64));

        Ok(ReadStreamCompleted {
            stream_id: stream.clone(),
            direction,
            from_event_number: from,
            max_count,
            result: ReadStreamResult::Success,
            events,
            next_event_number: next,
            last_event_number: last,
            is_end_of_stream: next > last,
            tf_last_commit_position: state.tf_last_commit_position(),
            error: None,
        })
    }

    async fn read_stream_backward(
        &self,
        stream: &StreamId,
        from: EventNumber,
        max_count: usize,
    ) -> Result<ReadStreamCompleted> {
        let mut state = self.state.write().await;
        state.take_read_failure()?;

        let direction = ReadDirection::Backward;
        if let Some(result) = unreadable(&state, stream) {
            return Ok(ReadStreamCompleted::failed(
                stream.clone(),
                direction,
                from,
                max_count,
                result,
                None,
            ));
        }

        let all = state.stream_events(stream);
        let last = EventNumber::new(all.len() as i64 - 1);
        let start = if from.is_last() || from > last {
            last
        } else {
            from
        };
        let events: Vec<RecordedEvent> = all
            .iter()
            .take((start.as_i64() + 1).max(0) as usize)
            .rev()
            .take(max_count)
            .map(|e| (*e).clone())
            .collect();
        let lowest = events.last().map(|e| e.event_number.as_i64()).unwrap_or(0);

        Ok(ReadStreamCompleted {
            stream_id: stream.clone(),
            direction,
            from_event_number: from,
            max_count,
            result: ReadStreamResult::Success,
            events,
            next_event_number: EventNumber::new(lowest - 1),
            last_event_number: last,
            is_end_of_stream: lowest == 0,
            tf_last_commit_position: state.tf_last_commit_position(),
            error: None,
        })
    }

    async fn read_all_forward(
        &self,
        from: LogPosition,
        max_count: usize,
    ) -> Result<ReadAllCompleted> {
        let mut state = self.state.write().await;
        state.take_read_failure()?;

        let start = from.commit.max(0) as usize;
        let events: Vec<RecordedEvent> = state
            .records
            .iter()
            .skip(start)
            .take(max_count)
            .cloned()
            .collect();
        let next_pos = events
            .last()
            .map(|e| position_of(e.position.commit as usize + 1))
            .unwrap_or(from);

        Ok(ReadAllCompleted {
            direction: ReadDirection::Forward,
            result: ReadAllResult::Success,
            events,
            current_pos: from,
            next_pos,
            prev_pos: from,
            tf_last_commit_position: state.tf_last_commit_position(),
            max_count,
            error: None,
        })
    }

    async fn read_all_backward(
        &self,
        from: LogPosition,
        max_count: usize,
    ) -> Result<ReadAllCompleted> {
        let mut state = self.state.write().await;
        state.take_read_failure()?;

        let len = state.records.len();
        let end = if from.is_end() {
            len
        } else {
            (from.commit.max(0) as usize).min(len)
        };
        let events: Vec<RecordedEvent> = state.records[..end]
            .iter()
            .rev()
            .take(max_count)
            .cloned()
            .collect();
        let next_pos = match events.last() {
            Some(lowest) if end > max_count => lowest.position,
            _ => LogPosition::START,
        };

        Ok(ReadAllCompleted {
            direction: ReadDirection::Backward,
            result: ReadAllResult::Success,
            events,
            current_pos: from,
            next_pos,
            prev_pos: position_of(end),
            tf_last_commit_position: state.tf_last_commit_position(),
            max_count,
            error: None,
        })
    }
}

fn unreadable(state: &LogState, stream: &StreamId) -> Option<ReadStreamResult> {
    if state.denied.contains(stream) {
        Some(ReadStreamResult::AccessDenied)
    } else if state.deleted.contains(stream) {
        Some(ReadStreamResult::StreamDeleted)
    } else if !state.streams.contains_key(stream) {
        Some(ReadStreamResult::NoStream)
    } else {
        None
    }
}
