//! Managed projections: lifecycle actors over the event log.
//!
//! A projection is a long-lived computation over `$all`. This crate runs
//! each one as a [`ManagedProjectionHandle`] actor that persists its
//! definition, enabled flag and checkpoints as `$` system events, and a
//! [`ProjectionCoordinator`] that creates, commands and recovers them.
//!
//! - [`ManagedProjectionState`]: the lifecycle state machine
//! - [`ProjectionRuntime`]: the execution collaborator, with [`BuiltinRuntime`]
//! - [`ManagementSettings`]: retry budget, timeouts and pacing

pub mod coordinator;
pub mod definition;
pub mod error;
pub mod events;
pub mod managed;
pub mod retry;
pub mod runtime;
pub mod settings;
pub mod state;

pub use coordinator::ProjectionCoordinator;
pub use definition::{
    Checkpoint, FaultInfo, ProjectionConfig, ProjectionDefinition, ProjectionStatus,
    StateTransition,
};
pub use error::{ExecutionError, ProjectionError, Result};
pub use managed::{ManagedProjectionHandle, Startup};
pub use runtime::{
    BuiltinRuntime, CompiledPlan, ProcessOutcome, ProjectionExecution, ProjectionRuntime,
};
pub use settings::ManagementSettings;
pub use state::ManagedProjectionState;
