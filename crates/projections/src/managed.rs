//! The per-projection lifecycle actor.
//!
//! Each managed projection is a tokio task that owns every write to its
//! definition, management stream and checkpoint stream. Commands arrive on a
//! bounded queue and are handled one at a time; the current status is
//! published on a `watch` channel and every transition on a `broadcast`
//! channel.

use std::sync::Arc;

use chrono::Utc;
use common::{LogPosition, ProjectionName, StreamId};
use event_store::{
    EventNumber, EventStore, EventStoreError, EventStoreExt, ExpectedVersion, ReadAllResult,
    ReadEventResult, ReadStreamResult,
};
use serde_json::Value;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::events::{
    ManagementEvent, PersistedEvent, PersistedMode, ProjectionDeletedData, RegistryEvent,
};
use crate::retry::retry_transient;
use crate::runtime::{CompiledPlan, ProjectionExecution, ProjectionRuntime};
use crate::{
    Checkpoint, ExecutionError, FaultInfo, ManagedProjectionState, ManagementSettings,
    ProjectionDefinition, ProjectionError, ProjectionStatus, Result, StateTransition,
};

use ManagedProjectionState::*;

const TRANSITION_BUFFER: usize = 256;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Enable(Reply<ProjectionStatus>),
    Disable(Reply<ProjectionStatus>),
    Abort(Reply<ProjectionStatus>),
    Reset(Reply<ProjectionStatus>),
    Delete(Reply<()>),
    Shutdown(oneshot::Sender<()>),
}

/// How a new actor begins its life.
#[derive(Debug, Clone, Copy)]
pub enum Startup {
    /// A new projection. Its definition is appended to the registry in `Creating`.
    Create { enabled: bool },
    /// A projection found in the registry at `event_number`. Starts in `Loading`.
    Recover { event_number: EventNumber },
}

/// Cloneable handle to a managed projection actor.
#[derive(Clone)]
pub struct ManagedProjectionHandle {
    name: ProjectionName,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ProjectionStatus>,
    transitions: broadcast::Sender<StateTransition>,
}

impl ManagedProjectionHandle {
    /// Spawns the actor for `definition` and returns its handle.
    pub fn spawn(
        definition: ProjectionDefinition,
        startup: Startup,
        store: Arc<dyn EventStore>,
        runtime: Arc<dyn ProjectionRuntime>,
        settings: Arc<ManagementSettings>,
    ) -> Self {
        let name = definition.name.clone();
        let (state, registry_event_number, pending) = match startup {
            Startup::Create { enabled } => (
                Creating,
                None,
                PendingWrites {
                    reset: false,
                    enable: enabled.then_some(true),
                },
            ),
            Startup::Recover { event_number } => {
                (Loading, Some(event_number), PendingWrites::default())
            }
        };

        let (commands_tx, commands_rx) = mpsc::channel(settings.command_queue);
        let (transitions_tx, _) = broadcast::channel(TRANSITION_BUFFER);
        let (status_tx, status_rx) = watch::channel(ProjectionStatus {
            name: name.clone(),
            state,
            definition: definition.clone(),
            enabled: false,
            checkpoint: None,
            position: LogPosition::START,
            events_processed: 0,
            fault: None,
        });

        let actor = ManagedProjection {
            definition,
            registry_event_number,
            store,
            runtime,
            settings,
            state,
            enabled: false,
            aborted: false,
            pending,
            plan: None,
            execution: None,
            checkpoint: None,
            checkpoint_stream_head: None,
            position: LogPosition::START,
            projection_state: Value::Null,
            events_processed: 0,
            events_since_checkpoint: 0,
            checkpoint_requested: false,
            fault: None,
            status_tx,
            transitions_tx: transitions_tx.clone(),
            exit: false,
        };
        let span = info_span!("projection", name = %name);
        tokio::spawn(actor.run(commands_rx).instrument(span));

        Self {
            name,
            commands: commands_tx,
            status: status_rx,
            transitions: transitions_tx,
        }
    }

    pub fn name(&self) -> &ProjectionName {
        &self.name
    }

    /// The latest published status. Never queues behind commands.
    pub fn status(&self) -> ProjectionStatus {
        self.status.borrow().clone()
    }

    /// Subscribes to state transitions from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }

    /// Waits until the published status satisfies `condition`.
    pub async fn wait_until(
        &self,
        mut condition: impl FnMut(&ProjectionStatus) -> bool,
    ) -> Result<ProjectionStatus> {
        let mut status = self.status.clone();
        let matched = status
            .wait_for(|s| condition(s))
            .await
            .map_err(|_| ProjectionError::ActorUnavailable(self.name.clone()))?;
        Ok(matched.clone())
    }

    pub async fn enable(&self) -> Result<ProjectionStatus> {
        self.request(Command::Enable).await
    }

    pub async fn disable(&self) -> Result<ProjectionStatus> {
        self.request(Command::Disable).await
    }

    pub async fn abort(&self) -> Result<ProjectionStatus> {
        self.request(Command::Abort).await
    }

    pub async fn reset(&self) -> Result<ProjectionStatus> {
        self.request(Command::Reset).await
    }

    /// Tombstones the projection. The actor exits once this succeeds.
    pub async fn delete(&self) -> Result<()> {
        self.request(Command::Delete).await
    }

    /// Stops any execution with a final checkpoint and ends the actor,
    /// leaving the persisted enabled flag untouched.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| ProjectionError::ActorUnavailable(self.name.clone()))?;
        rx.await
            .map_err(|_| ProjectionError::ActorUnavailable(self.name.clone()))?
    }
}

/// Management writes owed by the current pipeline, flushed in `Writing`.
#[derive(Debug, Default, Clone, Copy)]
struct PendingWrites {
    reset: bool,
    enable: Option<bool>,
}

impl PendingWrites {
    fn any(&self) -> bool {
        self.reset || self.enable.is_some()
    }
}

/// Why a working step faulted the projection.
#[derive(Debug)]
struct FaultReason(String);

impl From<EventStoreError> for FaultReason {
    fn from(err: EventStoreError) -> Self {
        FaultReason(err.to_string())
    }
}

impl From<ExecutionError> for FaultReason {
    fn from(err: ExecutionError) -> Self {
        FaultReason(err.to_string())
    }
}

impl From<serde_json::Error> for FaultReason {
    fn from(err: serde_json::Error) -> Self {
        FaultReason(format!("corrupt management event: {err}"))
    }
}

type StepResult = std::result::Result<(), FaultReason>;

struct ManagedProjection {
    definition: ProjectionDefinition,
    registry_event_number: Option<EventNumber>,
    store: Arc<dyn EventStore>,
    runtime: Arc<dyn ProjectionRuntime>,
    settings: Arc<ManagementSettings>,

    state: ManagedProjectionState,
    enabled: bool,
    aborted: bool,
    pending: PendingWrites,

    plan: Option<CompiledPlan>,
    execution: Option<Box<dyn ProjectionExecution>>,
    /// Last checkpoint known to be durable.
    checkpoint: Option<Checkpoint>,
    /// Last event number of the checkpoint stream, for exact-version appends.
    checkpoint_stream_head: Option<EventNumber>,
    position: LogPosition,
    /// Execution state as of `position`.
    projection_state: Value,
    events_processed: u64,
    events_since_checkpoint: u64,
    checkpoint_requested: bool,
    fault: Option<FaultInfo>,

    status_tx: watch::Sender<ProjectionStatus>,
    transitions_tx: broadcast::Sender<StateTransition>,
    exit: bool,
}

impl ManagedProjection {
    fn name(&self) -> &ProjectionName {
        &self.definition.name
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        debug!(state = %self.state, "projection actor started");
        while !self.exit {
            match self.state {
                Running => match commands.try_recv() {
                    Ok(command) => self.handle(command).await,
                    Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => match self.process_batch().await {
                        Ok(true) => {}
                        Ok(false) => {
                            tokio::select! {
                                command = commands.recv() => match command {
                                    Some(command) => self.handle(command).await,
                                    None => break,
                                },
                                _ = tokio::time::sleep(self.settings.idle_poll) => {}
                            }
                        }
                        Err(reason) => self.fault(reason),
                    },
                },
                // Starting and LoadingState accept commands between steps so a
                // queued disable or abort takes effect as soon as the step ends.
                Starting | LoadingState => match commands.try_recv() {
                    Ok(command) => self.handle(command).await,
                    Err(TryRecvError::Empty) => self.step().await,
                    Err(TryRecvError::Disconnected) => break,
                },
                state if state.is_resting() => match commands.recv().await {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ => self.step().await,
            }
        }
        debug!(state = %self.state, "projection actor stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Enable(reply) => {
                let _ = reply.send(self.enable());
            }
            Command::Disable(reply) => self.disable(reply).await,
            Command::Abort(reply) => {
                let result = self.abort().await;
                let _ = reply.send(result);
            }
            Command::Reset(reply) => {
                let _ = reply.send(self.reset());
            }
            Command::Delete(reply) => {
                let result = self.delete().await;
                let _ = reply.send(result);
            }
            Command::Shutdown(reply) => {
                self.shutdown().await;
                let _ = reply.send(());
            }
        }
    }

    // ----- commands -----

    fn enable(&mut self) -> Result<ProjectionStatus> {
        match self.state {
            state if state.is_enabled_phase() => {}
            Faulted => self.begin_reset(true),
            state if state.can_enable() => {
                self.enabled = true;
                self.pending.enable = Some(true);
                self.transition(Writing);
            }
            _ => return Err(self.invalid("enable")),
        }
        Ok(self.status())
    }

    async fn disable(&mut self, reply: Reply<ProjectionStatus>) {
        match self.state {
            Stopping | Stopped => {
                let _ = reply.send(Ok(self.status()));
            }
            state if state.can_disable() => {
                self.transition(Stopping);
                let _ = reply.send(Ok(self.status()));
                self.enabled = false;
                match self.drain().await {
                    Ok(drained) => {
                        if !drained {
                            warn!(
                                timeout = ?self.settings.stop_timeout,
                                "final checkpoint timed out, stopping without it"
                            );
                        }
                        self.pending.enable = Some(false);
                        self.transition(Writing);
                    }
                    Err(reason) => self.fault(reason),
                }
            }
            _ => {
                let _ = reply.send(Err(self.invalid("disable")));
            }
        }
    }

    async fn abort(&mut self) -> Result<ProjectionStatus> {
        if self.state == Aborted {
            return Ok(self.status());
        }
        if !self.state.can_abort() {
            return Err(self.invalid("abort"));
        }
        self.append_management(ManagementEvent::Aborted).await?;
        if let Some(mut execution) = self.execution.take() {
            execution.stop();
        }
        self.enabled = false;
        self.aborted = true;
        self.transition(Aborted);
        info!("projection aborted");
        Ok(self.status())
    }

    fn reset(&mut self) -> Result<ProjectionStatus> {
        if !self.state.can_reset() {
            return Err(self.invalid("reset"));
        }
        self.begin_reset(false);
        Ok(self.status())
    }

    async fn delete(&mut self) -> Result<()> {
        if !self.state.can_delete() {
            return Err(self.invalid("delete"));
        }
        let tombstone = RegistryEvent::ProjectionDeleted(ProjectionDeletedData {
            name: self.name().clone(),
            deleted_at: Utc::now(),
        })
        .to_new_event()?;
        let registry = StreamId::projection_registry();
        retry_transient(&self.settings, "write_tombstone", || {
            self.store
                .append(&registry, vec![tombstone.clone()], ExpectedVersion::Any)
        })
        .await?;

        for stream in [
            self.name().management_stream(),
            self.name().checkpoint_stream(),
        ] {
            if let Err(err) = self.store.delete_stream(&stream, ExpectedVersion::Any).await {
                warn!(%stream, error = %err, "could not delete projection stream");
            }
        }
        info!("projection deleted");
        self.exit = true;
        Ok(())
    }

    async fn shutdown(&mut self) {
        if self.state == Running {
            self.transition(Stopping);
            match self.drain().await {
                Ok(true) => {}
                Ok(false) => warn!("final checkpoint timed out during shutdown"),
                Err(reason) => warn!(reason = %reason.0, "final checkpoint failed during shutdown"),
            }
            self.transition(Stopped);
        }
        self.exit = true;
    }

    /// Moves to `Creating` with the definition kept and the checkpoint discarded.
    fn begin_reset(&mut self, enable: bool) {
        self.pending = PendingWrites {
            reset: true,
            enable: enable.then_some(true),
        };
        self.plan = None;
        self.execution = None;
        self.checkpoint = None;
        self.position = LogPosition::START;
        self.projection_state = Value::Null;
        self.events_processed = 0;
        self.events_since_checkpoint = 0;
        self.checkpoint_requested = false;
        self.transition(Creating);
    }

    // ----- pipeline steps -----

    async fn step(&mut self) {
        let result = match self.state {
            Creating => self.write_definition().await,
            Loading => self.load_definition().await,
            Loaded => {
                self.transition(Preparing);
                Ok(())
            }
            Preparing => self.prepare(),
            Prepared => {
                let next = self.after_prepared();
                self.transition(next);
                Ok(())
            }
            Writing => self.flush_pending().await,
            Starting => self.start_execution(),
            LoadingState => self.load_state().await,
            Stopping => {
                self.transition(Stopped);
                Ok(())
            }
            Running | Stopped | Completed | Aborted | Faulted => Ok(()),
        };
        if let Err(reason) = result {
            self.fault(reason);
        }
    }

    async fn write_definition(&mut self) -> StepResult {
        if self.registry_event_number.is_none() {
            let event =
                RegistryEvent::ProjectionCreated(self.definition.clone()).to_new_event()?;
            let registry = StreamId::projection_registry();
            let written = retry_transient(&self.settings, "write_definition", || {
                self.store
                    .append(&registry, vec![event.clone()], ExpectedVersion::Any)
            })
            .await?;
            self.registry_event_number = Some(written.first_event_number);
            info!(event_number = %written.first_event_number, "definition written");
        }
        self.transition(Loading);
        Ok(())
    }

    async fn load_definition(&mut self) -> StepResult {
        let number = self
            .registry_event_number
            .ok_or_else(|| FaultReason("definition was never written".to_string()))?;
        let registry = StreamId::projection_registry();
        let read = retry_transient(&self.settings, "read_definition", || {
            self.store.read_event(&registry, number)
        })
        .await?;
        let record = match (read.result, read.record) {
            (ReadEventResult::Success, Some(record)) => record,
            (result, _) => {
                return Err(FaultReason(format!(
                    "definition at {registry}#{number} unreadable: {result:?}"
                )));
            }
        };
        match RegistryEvent::from_recorded(&record)? {
            Some(RegistryEvent::ProjectionCreated(definition))
                if definition.name == self.definition.name =>
            {
                self.definition = definition;
            }
            _ => {
                return Err(FaultReason(format!(
                    "{registry}#{number} does not hold the definition of {}",
                    self.definition.name
                )));
            }
        }

        let management = self.name().management_stream();
        let events = retry_transient(&self.settings, "read_management", || {
            self.store.read_stream_to_end(&management)
        })
        .await?;
        let mode = PersistedMode::from_events(&events)?;

        self.enabled = match self.pending.enable {
            Some(flag) => flag,
            None => !self.pending.reset && mode.enabled,
        };
        self.aborted = !self.pending.reset && mode.aborted;
        self.transition(Loaded);
        Ok(())
    }

    fn prepare(&mut self) -> StepResult {
        self.plan = Some(self.runtime.validate(&self.definition)?);
        self.transition(Prepared);
        Ok(())
    }

    fn after_prepared(&self) -> ManagedProjectionState {
        if self.pending.any() {
            Writing
        } else if self.aborted {
            Aborted
        } else if self.enabled {
            Starting
        } else {
            Stopped
        }
    }

    async fn flush_pending(&mut self) -> StepResult {
        if self.pending.reset {
            self.append_management(ManagementEvent::Reset).await?;
            if self.definition.config.checkpoints_enabled {
                self.checkpoint_stream_head = self.read_checkpoint_head().await?;
                let version = self.next_checkpoint_version();
                let reset = Checkpoint::reset(version);
                self.append_checkpoint(reset).await?;
            }
            self.pending.reset = false;
        }
        if let Some(enable) = self.pending.enable.take() {
            let event = if enable {
                ManagementEvent::Enabled
            } else {
                ManagementEvent::Disabled
            };
            self.append_management(event).await?;
        }
        let next = if self.enabled { Starting } else { Stopped };
        self.transition(next);
        Ok(())
    }

    fn start_execution(&mut self) -> StepResult {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| FaultReason("no compiled plan to start".to_string()))?;
        self.execution = Some(self.runtime.start(plan)?);
        self.transition(LoadingState);
        Ok(())
    }

    async fn load_state(&mut self) -> StepResult {
        let checkpoint = if self.definition.config.checkpoints_enabled {
            self.read_latest_checkpoint().await?
        } else {
            None
        };
        let execution = self
            .execution
            .as_mut()
            .ok_or_else(|| FaultReason("no execution to load state into".to_string()))?;
        execution.load_state(checkpoint.as_ref())?;

        (self.position, self.projection_state) = match &checkpoint {
            Some(cp) => (cp.position, cp.state.clone()),
            None => (LogPosition::START, Value::Null),
        };
        self.checkpoint = checkpoint;
        self.events_since_checkpoint = 0;
        self.checkpoint_requested = false;
        info!(position = %self.position, "state loaded");
        self.transition(Running);
        Ok(())
    }

    /// Processes one batch of `$all`. Returns false when the log had nothing new.
    async fn process_batch(&mut self) -> std::result::Result<bool, FaultReason> {
        let from = self.position;
        let page = retry_transient(&self.settings, "read_all", || {
            self.store.read_all_forward(from, self.settings.batch_size)
        })
        .await?;
        if page.result != ReadAllResult::Success {
            return Err(FaultReason(format!(
                "reading $all failed: {:?} {}",
                page.result,
                page.error.unwrap_or_default()
            )));
        }
        if page.events.is_empty() {
            return Ok(false);
        }

        let name = self.name().to_string();
        for (i, event) in page.events.iter().enumerate() {
            let next = page
                .events
                .get(i + 1)
                .map(|e| e.position)
                .unwrap_or(page.next_pos);
            if event.is_system() {
                self.position = next;
                continue;
            }

            let execution = self
                .execution
                .as_mut()
                .ok_or_else(|| FaultReason("running without an execution".to_string()))?;
            let outcome = execution.process_event(event)?;
            self.position = next;
            self.projection_state = outcome.state;
            self.events_processed += 1;
            self.events_since_checkpoint += 1;
            self.checkpoint_requested |= outcome.checkpoint_requested;
            metrics::counter!("projection_events_processed_total", "projection" => name.clone())
                .increment(1);

            if outcome.completed {
                self.complete().await?;
                return Ok(true);
            }
        }

        if self.definition.config.checkpoints_enabled
            && (self.checkpoint_requested
                || self.events_since_checkpoint >= self.settings.checkpoint_after)
        {
            self.write_checkpoint(self.projection_state.clone()).await?;
        }
        self.publish();
        Ok(true)
    }

    async fn complete(&mut self) -> StepResult {
        if let Some(mut execution) = self.execution.take() {
            self.projection_state = execution.stop();
        }
        if self.definition.config.checkpoints_enabled {
            self.write_checkpoint(self.projection_state.clone()).await?;
        }
        info!(events_processed = self.events_processed, "projection completed");
        self.transition(Completed);
        Ok(())
    }

    /// Stops the execution and writes a final checkpoint within the drain
    /// deadline. Returns false if the deadline passed. The checkpoint may
    /// still have landed, so the cached stream head is stale until the next
    /// start or reset re-reads it.
    async fn drain(&mut self) -> std::result::Result<bool, FaultReason> {
        let Some(mut execution) = self.execution.take() else {
            return Ok(true);
        };
        self.projection_state = execution.stop();
        if !self.definition.config.checkpoints_enabled
            || (self.events_since_checkpoint == 0 && !self.checkpoint_requested)
        {
            return Ok(true);
        }
        let deadline = self.settings.stop_timeout;
        match tokio::time::timeout(deadline, self.write_checkpoint(self.projection_state.clone())).await {
            Ok(result) => result.map(|()| true),
            Err(_) => Ok(false),
        }
    }

    // ----- log access -----

    async fn append_management(
        &self,
        event: ManagementEvent,
    ) -> std::result::Result<(), EventStoreError> {
        let stream = self.name().management_stream();
        let new_event = event.to_new_event()?;
        retry_transient(&self.settings, "write_management", || {
            self.store
                .append(&stream, vec![new_event.clone()], ExpectedVersion::Any)
        })
        .await?;
        debug!(event = event.event_type(), "management event written");
        Ok(())
    }

    /// Reads the number of the latest checkpoint event, if any.
    async fn read_checkpoint_head(
        &self,
    ) -> std::result::Result<Option<EventNumber>, FaultReason> {
        let stream = self.name().checkpoint_stream();
        let read = retry_transient(&self.settings, "read_checkpoint", || {
            self.store
                .read_stream_backward(&stream, EventNumber::LAST, 1)
        })
        .await?;
        match read.result {
            ReadStreamResult::Success => Ok(read.events.first().map(|e| e.event_number)),
            ReadStreamResult::NoStream => Ok(None),
            other => Err(FaultReason(format!("{stream} unreadable: {other:?}"))),
        }
    }

    async fn read_latest_checkpoint(
        &mut self,
    ) -> std::result::Result<Option<Checkpoint>, FaultReason> {
        let stream = self.name().checkpoint_stream();
        let read = retry_transient(&self.settings, "read_checkpoint", || {
            self.store
                .read_stream_backward(&stream, EventNumber::LAST, 1)
        })
        .await?;
        let record = match read.result {
            ReadStreamResult::Success => read.events.into_iter().next(),
            ReadStreamResult::NoStream => None,
            other => return Err(FaultReason(format!("{stream} unreadable: {other:?}"))),
        };
        let Some(record) = record else {
            self.checkpoint_stream_head = None;
            return Ok(None);
        };
        self.checkpoint_stream_head = Some(record.event_number);
        let checkpoint = Checkpoint::from_recorded(&record)
            .map_err(|e| FaultReason(format!("corrupt checkpoint in {stream}: {e}")))?
            .ok_or_else(|| {
                FaultReason(format!(
                    "unexpected {} event in {stream}",
                    record.event_type
                ))
            })?;
        Ok(Some(checkpoint))
    }

    /// Checkpoint versions follow the checkpoint stream: version n lives at event n - 1.
    fn next_checkpoint_version(&self) -> u64 {
        self.checkpoint_stream_head
            .map(|n| n.as_i64() as u64 + 2)
            .unwrap_or(1)
    }

    async fn write_checkpoint(&mut self, state: Value) -> StepResult {
        let checkpoint = Checkpoint {
            position: self.position,
            state,
            version: self.next_checkpoint_version(),
        };
        self.append_checkpoint(checkpoint).await?;
        self.events_since_checkpoint = 0;
        self.checkpoint_requested = false;
        Ok(())
    }

    /// Appends a checkpoint at the exact expected version. A concurrent writer
    /// surfaces as `WrongExpectedVersion` and faults this instance.
    async fn append_checkpoint(&mut self, checkpoint: Checkpoint) -> StepResult {
        let stream = self.name().checkpoint_stream();
        let expected = match self.checkpoint_stream_head {
            Some(head) => ExpectedVersion::Exact(head),
            None => ExpectedVersion::NoStream,
        };
        let event = checkpoint.to_new_event()?;
        let written = retry_transient(&self.settings, "write_checkpoint", || {
            self.store.append(&stream, vec![event.clone()], expected)
        })
        .await?;

        self.checkpoint_stream_head = Some(written.last_event_number);
        metrics::counter!("projection_checkpoints_written_total", "projection" => self.name().to_string())
            .increment(1);
        debug!(version = checkpoint.version, position = %checkpoint.position, "checkpoint written");
        self.checkpoint = Some(checkpoint);
        self.publish();
        Ok(())
    }

    // ----- state bookkeeping -----

    fn transition(&mut self, next: ManagedProjectionState) {
        let from = self.state;
        debug_assert!(
            from.can_transition_to(next),
            "illegal projection transition {from} -> {next}"
        );
        if from == Faulted {
            self.fault = None;
        }
        self.state = next;

        metrics::counter!(
            "projection_state_transitions_total",
            "from" => from.as_str(),
            "to" => next.as_str()
        )
        .increment(1);
        debug!(%from, to = %next, "state transition");

        let _ = self.transitions_tx.send(StateTransition {
            name: self.name().clone(),
            from,
            to: next,
            at: Utc::now(),
        });
        self.publish();
    }

    fn fault(&mut self, reason: FaultReason) {
        let from = self.state;
        warn!(state = %from, reason = %reason.0, "projection faulted");
        self.execution = None;
        self.pending = PendingWrites::default();
        self.fault = Some(FaultInfo {
            reason: reason.0,
            state_at_fault: from,
            faulted_at: Utc::now(),
        });
        self.transition(Faulted);
    }

    fn invalid(&self, command: &'static str) -> ProjectionError {
        ProjectionError::InvalidState {
            name: self.name().clone(),
            state: self.state,
            command,
        }
    }

    fn status(&self) -> ProjectionStatus {
        ProjectionStatus {
            name: self.name().clone(),
            state: self.state,
            definition: self.definition.clone(),
            enabled: self.enabled,
            checkpoint: self.checkpoint.clone(),
            position: self.position,
            events_processed: self.events_processed,
            fault: self.fault.clone(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}
