use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{LogPosition, StreamId};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Position of an event inside its stream.
///
/// The first event of a stream is number 0. `LAST` is a sentinel meaning
/// "the most recent event" and is only valid as a read argument.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventNumber(i64);

impl EventNumber {
    /// Sentinel for the last event of a stream.
    pub const LAST: EventNumber = EventNumber(-1);

    /// Creates an event number from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the number of the first event in a stream.
    pub fn first() -> Self {
        Self(0)
    }

    /// Returns the next event number.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true for the `LAST` sentinel.
    pub fn is_last(&self) -> bool {
        *self == Self::LAST
    }

    /// Returns the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for EventNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventNumber {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Optimistic concurrency expectation for an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// No check.
    Any,
    /// The stream must not exist yet.
    NoStream,
    /// The stream's last event must have this number.
    Exact(EventNumber),
}

impl ExpectedVersion {
    /// Returns true if a stream whose last event is `current` satisfies this expectation.
    pub fn is_satisfied_by(&self, current: Option<EventNumber>) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => current.is_none(),
            ExpectedVersion::Exact(expected) => current == Some(*expected),
        }
    }
}

/// Wire format: `-2` any, `-1` no stream, otherwise an exact event number.
impl std::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpectedVersion::Any => write!(f, "-2"),
            ExpectedVersion::NoStream => write!(f, "-1"),
            ExpectedVersion::Exact(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for ExpectedVersion {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i64>()? {
            -2 => ExpectedVersion::Any,
            -1 => ExpectedVersion::NoStream,
            n => ExpectedVersion::Exact(EventNumber::new(n)),
        })
    }
}

/// An event to be appended. The log assigns number, position and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub data: serde_json::Value,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NewEvent {
    /// Creates a new event builder.
    pub fn builder() -> NewEventBuilder {
        NewEventBuilder::default()
    }
}

/// An event as stored in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub event_id: EventId,
    pub stream_id: StreamId,
    pub event_number: EventNumber,
    pub event_type: String,
    /// Position in the global log.
    pub position: LogPosition,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RecordedEvent {
    /// Returns true if the event lives in a `$` system stream.
    pub fn is_system(&self) -> bool {
        self.stream_id.is_system()
    }

    /// Deserializes the event data into a concrete type.
    pub fn data_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

/// Builder for constructing events to append.
#[derive(Debug, Default)]
pub struct NewEventBuilder {
    event_id: Option<EventId>,
    event_type: Option<String>,
    data: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
}

impl NewEventBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the data from a serializable value.
    pub fn data<T: Serialize>(mut self, data: &T) -> Result<Self, serde_json::Error> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    /// Sets the data from a raw JSON value.
    pub fn data_raw(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Adds a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Builds the event.
    ///
    /// # Panics
    ///
    /// Panics if `event_type` or the data are not set.
    pub fn build(self) -> NewEvent {
        NewEvent {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type.expect("event_type is required"),
            data: self.data.expect("data is required"),
            metadata: self.metadata,
        }
    }

    /// Tries to build the event, returning None if required fields are missing.
    pub fn try_build(self) -> Option<NewEvent> {
        Some(NewEvent {
            event_id: self.event_id.unwrap_or_default(),
            event_type: self.event_type?,
            data: self.data?,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_new_creates_unique_ids() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn event_number_ordering() {
        let first = EventNumber::first();
        assert_eq!(first.as_i64(), 0);
        assert_eq!(first.next(), EventNumber::new(1));
        assert!(EventNumber::LAST < first);
        assert!(EventNumber::LAST.is_last());
    }

    #[test]
    fn expected_version_checks() {
        assert!(ExpectedVersion::Any.is_satisfied_by(None));
        assert!(ExpectedVersion::Any.is_satisfied_by(Some(EventNumber::new(4))));
        assert!(ExpectedVersion::NoStream.is_satisfied_by(None));
        assert!(!ExpectedVersion::NoStream.is_satisfied_by(Some(EventNumber::first())));
        let exact = ExpectedVersion::Exact(EventNumber::new(2));
        assert!(exact.is_satisfied_by(Some(EventNumber::new(2))));
        assert!(!exact.is_satisfied_by(Some(EventNumber::new(3))));
        assert!(!exact.is_satisfied_by(None));
    }

    #[test]
    fn expected_version_wire_format() {
        assert_eq!("-2".parse::<ExpectedVersion>().unwrap(), ExpectedVersion::Any);
        assert_eq!(
            "-1".parse::<ExpectedVersion>().unwrap(),
            ExpectedVersion::NoStream
        );
        assert_eq!(
            "7".parse::<ExpectedVersion>().unwrap(),
            ExpectedVersion::Exact(EventNumber::new(7))
        );
        assert_eq!(ExpectedVersion::NoStream.to_string(), "-1");
        assert!("seven".parse::<ExpectedVersion>().is_err());
    }

    #[test]
    fn new_event_builder() {
        let event = NewEvent::builder()
            .event_type("ItemAdded")
            .data_raw(serde_json::json!({"sku": "A-1"}))
            .metadata("correlation_id", serde_json::json!("123"))
            .build();

        assert_eq!(event.event_type, "ItemAdded");
        assert_eq!(event.data, serde_json::json!({"sku": "A-1"}));
        assert_eq!(
            event.metadata.get("correlation_id"),
            Some(&serde_json::json!("123"))
        );
    }

    #[test]
    fn new_event_try_build_returns_none_on_missing_fields() {
        assert!(NewEvent::builder().try_build().is_none());
        assert!(NewEvent::builder().event_type("X").try_build().is_none());
    }
}
