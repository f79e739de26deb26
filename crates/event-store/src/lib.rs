pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod read;
pub mod store;

pub use common::{LogPosition, StreamId};
pub use error::{EventStoreError, Result};
pub use event::{EventId, EventNumber, ExpectedVersion, NewEvent, NewEventBuilder, RecordedEvent};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use read::{
    ReadAllCompleted, ReadAllResult, ReadDirection, ReadEventCompleted, ReadEventResult,
    ReadResult, ReadStreamCompleted, ReadStreamResult,
};
pub use store::{AppendResult, EventStore, EventStoreExt, READ_PAGE_SIZE, validate_events_for_append};
