use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    EventId, EventNumber, EventStoreError, ExpectedVersion, LogPosition, NewEvent,
    ReadAllCompleted, ReadAllResult, ReadDirection, ReadEventCompleted, ReadEventResult,
    ReadStreamCompleted, ReadStreamResult, RecordedEvent, Result, StreamId,
    store::{AppendResult, EventStore, validate_events_for_append},
};

/// Advisory lock key that serializes appends, so global positions commit in order.
const APPEND_LOCK_KEY: i64 = 0x6c6f_675f_6170_7064;

const SELECT_COLUMNS: &str = "global_position, event_id, stream_id, event_number, event_type, timestamp, data, metadata";

/// PostgreSQL-backed log implementation.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL log.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<RecordedEvent> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;
        let stream_name: String = row.try_get("stream_id")?;
        let stream_id = StreamId::new(stream_name)
            .map_err(|e| EventStoreError::Unavailable(format!("corrupt stream id: {e}")))?;
        let global: i64 = row.try_get("global_position")?;

        Ok(RecordedEvent {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            stream_id,
            event_number: EventNumber::new(row.try_get("event_number")?),
            event_type: row.try_get("event_type")?,
            position: LogPosition::new(global, global),
            timestamp: row.try_get("timestamp")?,
            data: row.try_get("data")?,
            metadata,
        })
    }

    async fn is_deleted(&self, stream: &StreamId) -> Result<bool> {
        let deleted: Option<String> =
            sqlx::query_scalar("SELECT stream_id FROM deleted_streams WHERE stream_id = $1")
                .bind(stream.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(deleted.is_some())
    }

    async fn last_event_number(&self, stream: &StreamId) -> Result<Option<EventNumber>> {
        let last: Option<i64> =
            sqlx::query_scalar("SELECT MAX(event_number) FROM log_events WHERE stream_id = $1")
                .bind(stream.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(last.map(EventNumber::new))
    }

    async fn tf_last_commit_position(&self) -> Result<i64> {
        let head: Option<i64> = sqlx::query_scalar("SELECT MAX(global_position) FROM log_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(head.unwrap_or(-1))
    }

    /// Checks the stream's current version inside an append/delete transaction.
    async fn check_expected(
        tx: &mut Transaction<'_, Postgres>,
        stream: &StreamId,
        expected: ExpectedVersion,
    ) -> Result<Option<EventNumber>> {
        let deleted: Option<String> =
            sqlx::query_scalar("SELECT stream_id FROM deleted_streams WHERE stream_id = $1")
                .bind(stream.as_str())
                .fetch_optional(&mut **tx)
                .await?;
        if deleted.is_some() {
            return Err(EventStoreError::StreamDeleted(stream.clone()));
        }

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(event_number) FROM log_events WHERE stream_id = $1")
                .bind(stream.as_str())
                .fetch_one(&mut **tx)
                .await?;
        let current = current.map(EventNumber::new);
        if !expected.is_satisfied_by(current) {
            return Err(EventStoreError::WrongExpectedVersion {
                stream: stream.clone(),
                expected,
                current,
            });
        }
        Ok(current)
    }

    async fn stream_read_status(&self, stream: &StreamId) -> Result<Option<ReadStreamResult>> {
        if self.is_deleted(stream).await? {
            return Ok(Some(ReadStreamResult::StreamDeleted));
        }
        Ok(None)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self, stream, events), fields(stream = %stream, count = events.len()))]
    async fn append(
        &self,
        stream: &StreamId,
        events: Vec<NewEvent>,
        expected: ExpectedVersion,
    ) -> Result<AppendResult> {
        validate_events_for_append(stream, &events)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let current = Self::check_expected(&mut tx, stream, expected).await?;
        let first = current.map(|n| n.next()).unwrap_or_else(EventNumber::first);

        let mut number = first;
        let mut last = first;
        let mut global = 0i64;
        for event in &events {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            global = sqlx::query_scalar(
                r#"
                INSERT INTO log_events (event_id, stream_id, event_number, event_type, data, metadata)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING global_position
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(stream.as_str())
            .bind(number.as_i64())
            .bind(&event.event_type)
            .bind(&event.data)
            .bind(metadata_json)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_stream_event_number")
                {
                    return EventStoreError::WrongExpectedVersion {
                        stream: stream.clone(),
                        expected,
                        current,
                    };
                }
                EventStoreError::Database(e)
            })?;

            last = number;
            number = number.next();
        }

        tx.commit().await?;
        metrics::counter!("log_events_appended_total").increment(events.len() as u64);
        Ok(AppendResult {
            first_event_number: first,
            last_event_number: last,
            position: LogPosition::new(global, global),
        })
    }

    #[instrument(skip(self, stream), fields(stream = %stream))]
    async fn delete_stream(&self, stream: &StreamId, expected: ExpectedVersion) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        Self::check_expected(&mut tx, stream, expected).await?;
        sqlx::query("INSERT INTO deleted_streams (stream_id) VALUES ($1)")
            .bind(stream.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn read_event(
        &self,
        stream: &StreamId,
        number: EventNumber,
    ) -> Result<ReadEventCompleted> {
        let failed = |result| ReadEventCompleted::failed(stream.clone(), number, result, None);
        if self.is_deleted(stream).await? {
            return Ok(failed(ReadEventResult::StreamDeleted));
        }
        let Some(last) = self.last_event_number(stream).await? else {
            return Ok(failed(ReadEventResult::NoStream));
        };
        let target = if number.is_last() { last } else { number };

        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM log_events WHERE stream_id = $1 AND event_number = $2"
        ))
        .bind(stream.as_str())
        .bind(target.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(ReadEventCompleted::success(
                stream.clone(),
                number,
                Self::row_to_event(row)?,
            )),
            None => Ok(failed(ReadEventResult::NotFound)),
        }
    }

    async fn read_stream_forward(
        &self,
        stream: &StreamId,
        from: EventNumber,
        max_count: usize,
    ) -> Result<ReadStreamCompleted> {
        let direction = ReadDirection::Forward;
        let failed = |result| {
            ReadStreamCompleted::failed(stream.clone(), direction, from, max_count, result, None)
        };
        if let Some(result) = self.stream_read_status(stream).await? {
            return Ok(failed(result));
        }
        let Some(last) = self.last_event_number(stream).await? else {
            return Ok(failed(ReadStreamResult::NoStream));
        };

        let start = from.as_i64().max(0);
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM log_events
             WHERE stream_id = $1 AND event_number >= $2
             ORDER BY event_number ASC LIMIT $3"
        ))
        .bind(stream.as_str())
        .bind(start)
        .bind(max_count as i64)
        .fetch_all(&self.pool)
        .await?;
        let events = rows
            .into_iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>>>()?;
        let next = events
            .last()
            .map(|e| e.event_number.next())
            .unwrap_or(EventNumber::new(start));

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
            tf_last_commit_position: self.tf_last_commit_position().await?,
            error: None,
        })
    }

    async fn read_stream_backward(
        &self,
        stream: &StreamId,
        from: EventNumber,
        max_count: usize,
    ) -> Result<ReadStreamCompleted> {
        let direction = ReadDirection::Backward;
        let failed = |result| {
            ReadStreamCompleted::failed(stream.clone(), direction, from, max_count, result, None)
        };
        if let Some(result) = self.stream_read_status(stream).await? {
            return Ok(failed(result));
        }
        let Some(last) = self.last_event_number(stream).await? else {
            return Ok(failed(ReadStreamResult::NoStream));
        };

        let start = if from.is_last() || from > last {
            last
        } else {
            from
        };
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM log_events
             WHERE stream_id = $1 AND event_number <= $2
             ORDER BY event_number DESC LIMIT $3"
        ))
        .bind(stream.as_str())
        .bind(start.as_i64())
        .bind(max_count as i64)
        .fetch_all(&self.pool)
        .await?;
        let events = rows
            .into_iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>>>()?;
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
            tf_last_commit_position: self.tf_last_commit_position().await?,
            error: None,
        })
    }

    async fn read_all_forward(
        &self,
        from: LogPosition,
        max_count: usize,
    ) -> Result<ReadAllCompleted> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM log_events
             WHERE global_position >= $1
             ORDER BY global_position ASC LIMIT $2"
        ))
        .bind(from.commit.max(0))
        .bind(max_count as i64)
        .fetch_all(&self.pool)
        .await?;
        let events = rows
            .into_iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>>>()?;
        let next_pos = events
            .last()
            .map(|e| LogPosition::new(e.position.commit + 1, e.position.commit + 1))
            .unwrap_or(from);

        Ok(ReadAllCompleted {
            direction: ReadDirection::Forward,
            result: ReadAllResult::Success,
            events,
            current_pos: from,
            next_pos,
            prev_pos: from,
            tf_last_commit_position: self.tf_last_commit_position().await?,
            max_count,
            error: None,
        })
    }

    async fn read_all_backward(
        &self,
        from: LogPosition,
        max_count: usize,
    ) -> Result<ReadAllCompleted> {
        let head = self.tf_last_commit_position().await?;
        let end = if from.is_end() {
            head + 1
        } else {
            from.commit
        };
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM log_events
             WHERE global_position < $1
             ORDER BY global_position DESC LIMIT $2"
        ))
        .bind(end)
        .bind(max_count as i64 + 1)
        .fetch_all(&self.pool)
        .await?;
        let more = rows.len() > max_count;
        let events = rows
            .into_iter()
            .take(max_count)
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>>>()?;
        let next_pos = match events.last() {
            Some(lowest) if more => lowest.position,
            _ => LogPosition::START,
        };

        Ok(ReadAllCompleted {
            direction: ReadDirection::Backward,
            result: ReadAllResult::Success,
            events,
            current_pos: from,
            next_pos,
            prev_pos: LogPosition::new(end, end),
            tf_last_commit_position: head,
            max_count,
            error: None,
        })
    }
}
