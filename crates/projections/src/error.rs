//! Projection management error types.

use common::ProjectionName;
use thiserror::Error;

use crate::ManagedProjectionState;

/// Errors returned by projection management commands.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// No live projection has this name.
    #[error("Projection not found: {0}")]
    NotFound(ProjectionName),

    /// The name is taken by a different definition or was deleted.
    #[error("Projection already exists: {0}")]
    AlreadyExists(ProjectionName),

    /// The command is not valid in the projection's current state.
    #[error("Cannot {command} projection {name} while {state}")]
    InvalidState {
        name: ProjectionName,
        state: ManagedProjectionState,
        command: &'static str,
    },

    /// The projection's actor has stopped and no longer takes commands.
    #[error("Projection actor unavailable: {0}")]
    ActorUnavailable(ProjectionName),

    /// An error occurred in the log.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// Failed to (de)serialize a persisted management event.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for projection management operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Errors reported by a projection runtime. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The definition's query could not be compiled.
    #[error("Compile error: {0}")]
    Compile(String),

    /// The execution failed while loading state or handling an event.
    #[error("Execution fault: {0}")]
    Fault(String),
}
