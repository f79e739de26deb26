//! Execution collaborator: compiles definitions and runs them over events.
//!
//! The management layer only sees [`ProjectionRuntime`] and
//! [`ProjectionExecution`]. [`BuiltinRuntime`] is a small runtime whose
//! queries are JSON documents:
//!
//! ```json
//! {"kind": "count_by_type", "stop_after": 100, "checkpoint_every": 10}
//! ```
//!
//! `kind` is one of `count`, `count_by_type`, `count_by_stream`.

use std::collections::BTreeMap;

use event_store::RecordedEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Checkpoint, ExecutionError, ProjectionDefinition};

/// A validated, ready-to-start form of a definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPlan {
    /// Runtime-specific compiled program.
    pub program: Value,
}

/// What happened when an event was handled.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    /// Projection state after the event.
    pub state: Value,
    /// The execution asks for a checkpoint now.
    pub checkpoint_requested: bool,
    /// The execution has no more work to do.
    pub completed: bool,
}

/// Compiles definitions and allocates executions.
pub trait ProjectionRuntime: Send + Sync {
    /// Validates and compiles a definition. Compile errors are never retried.
    fn validate(&self, definition: &ProjectionDefinition) -> Result<CompiledPlan, ExecutionError>;

    /// Allocates an execution for a compiled plan.
    fn start(&self, plan: &CompiledPlan) -> Result<Box<dyn ProjectionExecution>, ExecutionError>;
}

/// A running instance of a compiled projection.
pub trait ProjectionExecution: Send + Sync {
    /// Restores state from the latest checkpoint, or starts fresh on `None`.
    fn load_state(&mut self, checkpoint: Option<&Checkpoint>) -> Result<(), ExecutionError>;

    /// Handles one event.
    fn process_event(&mut self, event: &RecordedEvent) -> Result<ProcessOutcome, ExecutionError>;

    /// Stops the execution and returns its final state.
    fn stop(&mut self) -> Value;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CountKind {
    Count,
    CountByType,
    CountByStream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CountQuery {
    kind: CountKind,
    #[serde(default)]
    stop_after: Option<u64>,
    #[serde(default)]
    checkpoint_every: Option<u64>,
    /// Event type that makes the handler fail.
    #[serde(default)]
    fail_on: Option<String>,
}

/// Counting runtime shipped with the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRuntime;

impl ProjectionRuntime for BuiltinRuntime {
    fn validate(&self, definition: &ProjectionDefinition) -> Result<CompiledPlan, ExecutionError> {
        let query: CountQuery = serde_json::from_str(&definition.query)
            .map_err(|e| ExecutionError::Compile(e.to_string()))?;
        if query.checkpoint_every == Some(0) {
            return Err(ExecutionError::Compile(
                "checkpoint_every must be positive".to_string(),
            ));
        }
        let program =
            serde_json::to_value(&query).map_err(|e| ExecutionError::Compile(e.to_string()))?;
        Ok(CompiledPlan { program })
    }

    fn start(&self, plan: &CompiledPlan) -> Result<Box<dyn ProjectionExecution>, ExecutionError> {
        let query: CountQuery = serde_json::from_value(plan.program.clone())
            .map_err(|e| ExecutionError::Compile(e.to_string()))?;
        Ok(Box::new(CountExecution {
            query,
            total: 0,
            counts: BTreeMap::new(),
        }))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CountState {
    total: u64,
    #[serde(default)]
    counts: BTreeMap<String, u64>,
}

struct CountExecution {
    query: CountQuery,
    total: u64,
    counts: BTreeMap<String, u64>,
}

impl CountExecution {
    fn state(&self) -> Value {
        match self.query.kind {
            CountKind::Count => json!({ "total": self.total }),
            CountKind::CountByType | CountKind::CountByStream => {
                json!({ "total": self.total, "counts": self.counts })
            }
        }
    }
}

impl ProjectionExecution for CountExecution {
    fn load_state(&mut self, checkpoint: Option<&Checkpoint>) -> Result<(), ExecutionError> {
        let Some(checkpoint) = checkpoint.filter(|cp| !cp.state.is_null()) else {
            self.total = 0;
            self.counts.clear();
            return Ok(());
        };
        let state: CountState = serde_json::from_value(checkpoint.state.clone())
            .map_err(|e| ExecutionError::Fault(format!("corrupt checkpoint state: {e}")))?;
        self.total = state.total;
        self.counts = state.counts;
        Ok(())
    }

    fn process_event(&mut self, event: &RecordedEvent) -> Result<ProcessOutcome, ExecutionError> {
        if self.query.fail_on.as_deref() == Some(event.event_type.as_str()) {
            return Err(ExecutionError::Fault(format!(
                "handler failed on {} #{} in {}",
                event.event_type, event.event_number, event.stream_id
            )));
        }

        self.total += 1;
        let key = match self.query.kind {
            CountKind::Count => None,
            CountKind::CountByType => Some(event.event_type.clone()),
            CountKind::CountByStream => Some(event.stream_id.to_string()),
        };
        if let Some(key) = key {
            *self.counts.entry(key).or_default() += 1;
        }

        Ok(ProcessOutcome {
            state: self.state(),
            checkpoint_requested: self
                .query
                .checkpoint_every
                .is_some_and(|every| self.total % every == 0),
            completed: self.query.stop_after.is_some_and(|n| self.total >= n),
        })
    }

    fn stop(&mut self) -> Value {
        self.state()
    }
}
