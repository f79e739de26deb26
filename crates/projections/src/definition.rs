//! Projection definitions, checkpoints and status snapshots.

use chrono::{DateTime, Utc};
use common::{LogPosition, ProjectionName};
use serde::{Deserialize, Serialize};

use crate::ManagedProjectionState;

/// Per-projection switches fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Whether the projection may write to other streams.
    pub emit_enabled: bool,
    /// Whether progress is checkpointed. Without checkpoints a restart replays from the start.
    pub checkpoints_enabled: bool,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            emit_enabled: false,
            checkpoints_enabled: true,
        }
    }
}

/// The durable description of a projection. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionDefinition {
    pub name: ProjectionName,
    /// Query source text, interpreted by the runtime.
    pub query: String,
    pub config: ProjectionConfig,
    pub created_at: DateTime<Utc>,
}

impl ProjectionDefinition {
    pub fn new(name: ProjectionName, query: impl Into<String>, config: ProjectionConfig) -> Self {
        Self {
            name,
            query: query.into(),
            config,
            created_at: Utc::now(),
        }
    }

    /// True if `other` describes the same projection, ignoring the creation time.
    pub fn same_as(&self, other: &ProjectionDefinition) -> bool {
        self.name == other.name && self.query == other.query && self.config == other.config
    }
}

/// A durable record of projection progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Where reading resumes in the global log.
    pub position: LogPosition,
    /// Projection state as of `position`.
    pub state: serde_json::Value,
    /// Strictly increasing per projection.
    pub version: u64,
}

impl Checkpoint {
    /// A checkpoint that restarts processing from the beginning of the log.
    pub fn reset(version: u64) -> Self {
        Self {
            position: LogPosition::START,
            state: serde_json::Value::Null,
            version,
        }
    }

    /// True for a checkpoint written by a reset.
    pub fn is_reset(&self) -> bool {
        self.position == LogPosition::START && self.state.is_null()
    }
}

/// Why and when a projection faulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultInfo {
    pub reason: String,
    pub state_at_fault: ManagedProjectionState,
    pub faulted_at: DateTime<Utc>,
}

/// A point-in-time view of a managed projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionStatus {
    pub name: ProjectionName,
    pub state: ManagedProjectionState,
    pub definition: ProjectionDefinition,
    pub enabled: bool,
    /// The last checkpoint known to be durable.
    pub checkpoint: Option<Checkpoint>,
    /// Next position the projection will read from.
    pub position: LogPosition,
    pub events_processed: u64,
    pub fault: Option<FaultInfo>,
}

/// One observed state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub name: ProjectionName,
    pub from: ManagedProjectionState,
    pub to: ManagedProjectionState,
    pub at: DateTime<Utc>,
}
