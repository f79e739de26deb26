//! Identifiers shared by the log, the projection manager and the feed layer.

pub mod types;

pub use types::{
    IdentifierError, LogPosition, PROJECTION_REGISTRY_STREAM, ProjectionName, SYSTEM_STREAM_PREFIX,
    StreamId,
};
