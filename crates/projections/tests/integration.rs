//! Integration tests: coordinator commands → managed projection actors → the in-memory log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use async_trait::async_trait;
use common::{LogPosition, ProjectionName, StreamId};
use event_store::{
    AppendResult, EventNumber, EventStore, EventStoreError, EventStoreExt, ExpectedVersion,
    InMemoryEventStore, NewEvent, ReadAllCompleted, ReadEventCompleted, ReadStreamCompleted,
    RecordedEvent,
};
use projections::{
    BuiltinRuntime, Checkpoint, CompiledPlan, ExecutionError, ManagedProjectionHandle,
    ManagedProjectionState, ManagementSettings, ProjectionConfig, ProjectionCoordinator,
    ProjectionDefinition, ProjectionError, ProjectionExecution, ProjectionRuntime,
    ProjectionStatus,
};
use serde_json::json;

use ManagedProjectionState::*;

const COUNT: &str = r#"{"kind":"count"}"#;
const WAIT: Duration = Duration::from_secs(10);

fn fast_settings() -> ManagementSettings {
    ManagementSettings {
        write_attempts: 3,
        retry_min_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        write_timeout: Duration::from_secs(1),
        stop_timeout: Duration::from_secs(1),
        checkpoint_after: 5,
        batch_size: 10,
        idle_poll: Duration::from_millis(10),
        command_queue: 16,
    }
}

fn coordinator_with(
    store: &InMemoryEventStore,
    settings: ManagementSettings,
) -> ProjectionCoordinator {
    ProjectionCoordinator::new(Arc::new(store.clone()), Arc::new(BuiltinRuntime), settings)
}

fn new_coordinator(store: &InMemoryEventStore) -> ProjectionCoordinator {
    coordinator_with(store, fast_settings())
}

fn name(s: &str) -> ProjectionName {
    ProjectionName::new(s).unwrap()
}

fn definition(projection: &str, query: &str) -> ProjectionDefinition {
    ProjectionDefinition::new(name(projection), query, ProjectionConfig::default())
}

async fn seed(store: &InMemoryEventStore, stream: &str, event_type: &str, count: usize) {
    let stream = StreamId::new(stream).unwrap();
    for i in 0..count {
        let event = NewEvent::builder()
            .event_type(event_type)
            .data_raw(json!({ "i": i }))
            .build();
        store
            .append_event(&stream, event, ExpectedVersion::Any)
            .await
            .unwrap();
    }
}

async fn wait_until(
    handle: &ManagedProjectionHandle,
    condition: impl FnMut(&ProjectionStatus) -> bool,
) -> ProjectionStatus {
    tokio::time::timeout(WAIT, handle.wait_until(condition))
        .await
        .expect("timed out waiting for projection status")
        .unwrap()
}

async fn wait_for_state(
    handle: &ManagedProjectionHandle,
    state: ManagedProjectionState,
) -> ProjectionStatus {
    wait_until(handle, |s| s.state == state).await
}

async fn event_types(store: &InMemoryEventStore, stream: &StreamId) -> Vec<String> {
    store
        .read_stream_to_end(stream)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

async fn checkpoints(store: &InMemoryEventStore, projection: &str) -> Vec<Checkpoint> {
    store
        .read_stream_to_end(&name(projection).checkpoint_stream())
        .await
        .unwrap()
        .iter()
        .map(|e: &RecordedEvent| e.data_as::<Checkpoint>().unwrap())
        .collect()
}

#[tokio::test]
async fn test_create_disabled_settles_in_stopped() {
    let store = InMemoryEventStore::new();
    let coordinator = new_coordinator(&store);

    let created = coordinator
        .create(definition("totals", COUNT), false)
        .await
        .unwrap();
    assert_eq!(created.state, Creating);

    let handle = coordinator.get(&name("totals")).await.unwrap();
    let status = wait_for_state(&handle, Stopped).await;
    assert!(!status.enabled);
    assert!(status.fault.is_none());

    assert_eq!(
        event_types(&store, &StreamId::projection_registry()).await,
        vec!["$ProjectionCreated"]
    );
    assert!(
        event_types(&store, &name("totals").management_stream())
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn test_enable_runs_over_existing_events() {
    let store = InMemoryEventStore::new();
    seed(&store, "orders-1", "Added", 12).await;
    let coordinator = new_coordinator(&store);
    coordinator
        .create(definition("totals", COUNT), false)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    wait_for_state(&handle, Stopped).await;

    let status = coordinator.enable(&name("totals")).await.unwrap();
    assert_eq!(status.state, Writing);
    assert!(status.enabled);

    let status = wait_until(&handle, |s| s.state == Running && s.events_processed == 12).await;
    assert!(status.enabled);
    assert_eq!(
        event_types(&store, &name("totals").management_stream()).await,
        vec!["$ProjectionEnabled"]
    );
}

#[tokio::test]
async fn test_enable_twice_writes_one_enabled_event() {
    let store = InMemoryEventStore::new();
    let coordinator = new_coordinator(&store);
    coordinator
        .create(definition("totals", COUNT), true)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    wait_for_state(&handle, Running).await;

    let status = coordinator.enable(&name("totals")).await.unwrap();
    assert_eq!(status.state, Running);
    let status = coordinator.enable(&name("totals")).await.unwrap();
    assert_eq!(status.state, Running);

    assert_eq!(
        event_types(&store, &name("totals").management_stream()).await,
        vec!["$ProjectionEnabled"]
    );
}

#[tokio::test]
async fn test_create_is_idempotent_for_identical_definitions() {
    let store = InMemoryEventStore::new();
    let coordinator = new_coordinator(&store);
    coordinator
        .create(definition("totals", COUNT), false)
        .await
        .unwrap();
    let again = coordinator
        .create(definition("totals", COUNT), false)
        .await
        .unwrap();
    assert_eq!(again.name, name("totals"));

    let err = coordinator
        .create(definition("totals", r#"{"kind":"count_by_type"}"#), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ProjectionError::AlreadyExists(_)));

    let handle = coordinator.get(&name("totals")).await.unwrap();
    wait_for_state(&handle, Stopped).await;
    assert_eq!(
        event_types(&store, &StreamId::projection_registry()).await,
        vec!["$ProjectionCreated"]
    );
}

#[tokio::test]
async fn test_fault_then_reset_lands_in_stopped() {
    let store = InMemoryEventStore::new();
    seed(&store, "orders-1", "Fine", 3).await;
    seed(&store, "orders-1", "Boom", 1).await;
    let coordinator = new_coordinator(&store);
    coordinator
        .create(
            definition("fragile", r#"{"kind":"count","fail_on":"Boom"}"#),
            true,
        )
        .await
        .unwrap();
    let handle = coordinator.get(&name("fragile")).await.unwrap();

    let faulted = wait_for_state(&handle, Faulted).await;
    let fault = faulted.fault.expect("fault info");
    assert_eq!(fault.state_at_fault, Running);
    assert!(fault.reason.contains("Boom"), "reason: {}", fault.reason);

    let mut transitions = handle.subscribe();
    let status = coordinator.reset(&name("fragile")).await.unwrap();
    assert_eq!(status.state, Creating);
    assert!(status.fault.is_none());

    let status = wait_for_state(&handle, Stopped).await;
    assert!(!status.enabled);
    assert!(status.checkpoint.as_ref().is_some_and(Checkpoint::is_reset));

    let mut path = Vec::new();
    while let Ok(t) = transitions.try_recv() {
        path.push((t.from, t.to));
    }
    assert_eq!(
        path,
        vec![
            (Faulted, Creating),
            (Creating, Loading),
            (Loading, Loaded),
            (Loaded, Preparing),
            (Preparing, Prepared),
            (Prepared, Writing),
            (Writing, Stopped),
        ]
    );

    let management = event_types(&store, &name("fragile").management_stream()).await;
    assert_eq!(management.last().map(String::as_str), Some("$ProjectionReset"));
    // The definition is kept, not rewritten.
    assert_eq!(
        event_types(&store, &StreamId::projection_registry()).await,
        vec!["$ProjectionCreated"]
    );
}

#[tokio::test]
async fn test_invalid_commands_are_rejected() {
    let store = InMemoryEventStore::new();
    let coordinator = new_coordinator(&store);
    coordinator
        .create(definition("totals", COUNT), false)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    wait_for_state(&handle, Stopped).await;

    let err = coordinator.reset(&name("totals")).await.unwrap_err();
    assert!(matches!(
        err,
        ProjectionError::InvalidState {
            state: Stopped,
            command: "reset",
            ..
        }
    ));

    // Disabling a stopped projection is a no-op.
    let status = coordinator.disable(&name("totals")).await.unwrap();
    assert_eq!(status.state, Stopped);

    let status = coordinator.abort(&name("totals")).await.unwrap();
    assert_eq!(status.state, Aborted);
    let err = coordinator.enable(&name("totals")).await.unwrap_err();
    assert!(matches!(err, ProjectionError::InvalidState { state: Aborted, .. }));

    let err = coordinator.enable(&name("missing")).await.unwrap_err();
    assert!(matches!(err, ProjectionError::NotFound(_)));
}

#[tokio::test]
async fn test_every_observed_transition_is_legal() {
    let store = InMemoryEventStore::new();
    seed(&store, "orders-1", "Added", 7).await;
    let coordinator = new_coordinator(&store);
    coordinator
        .create(definition("totals", COUNT), false)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    let mut transitions = handle.subscribe();

    wait_for_state(&handle, Stopped).await;
    coordinator.enable(&name("totals")).await.unwrap();
    wait_until(&handle, |s| s.state == Running && s.events_processed == 7).await;
    coordinator.disable(&name("totals")).await.unwrap();
    wait_for_state(&handle, Stopped).await;
    coordinator.abort(&name("totals")).await.unwrap();
    coordinator.reset(&name("totals")).await.unwrap();
    wait_for_state(&handle, Stopped).await;

    let mut observed = Vec::new();
    while let Ok(t) = transitions.try_recv() {
        observed.push(t);
    }
    assert!(!observed.is_empty());
    for t in &observed {
        assert!(
            t.from.can_transition_to(t.to),
            "illegal transition {} -> {}",
            t.from,
            t.to
        );
    }
    for pair in observed.windows(2) {
        assert_eq!(pair[0].to, pair[1].from);
    }
}

#[tokio::test]
async fn test_disable_writes_final_checkpoint() {
    let store = InMemoryEventStore::new();
    seed(&store, "orders-1", "Added", 3).await;
    let coordinator = new_coordinator(&store);
    coordinator
        .create(definition("totals", COUNT), true)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    wait_until(&handle, |s| s.state == Running && s.events_processed == 3).await;
    assert!(checkpoints(&store, "totals").await.is_empty());

    let status = coordinator.disable(&name("totals")).await.unwrap();
    assert_eq!(status.state, Stopping);
    let status = wait_for_state(&handle, Stopped).await;
    assert!(!status.enabled);

    let written = checkpoints(&store, "totals").await;
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].state, json!({"total": 3}));
    assert_eq!(written[0].version, 1);
    assert_eq!(
        event_types(&store, &name("totals").management_stream()).await,
        vec!["$ProjectionEnabled", "$ProjectionDisabled"]
    );
}

#[tokio::test]
async fn test_stop_timeout_still_persists_disable() {
    let store = InMemoryEventStore::new();
    seed(&store, "orders-1", "Added", 3).await;
    let settings = ManagementSettings {
        write_attempts: 10,
        retry_min_delay: Duration::from_millis(200),
        retry_max_delay: Duration::from_millis(400),
        stop_timeout: Duration::from_millis(50),
        ..fast_settings()
    };
    let coordinator = coordinator_with(&store, settings);
    coordinator
        .create(definition("totals", COUNT), true)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    wait_until(&handle, |s| s.state == Running && s.events_processed == 3).await;

    // The final checkpoint's first attempt fails and its retry outlives the
    // stop timeout.
    store.fail_next_appends(1).await;
    coordinator.disable(&name("totals")).await.unwrap();
    let status = wait_for_state(&handle, Stopped).await;
    assert!(!status.enabled);
    assert!(status.fault.is_none());

    assert!(checkpoints(&store, "totals").await.is_empty());
    assert_eq!(
        event_types(&store, &name("totals").management_stream()).await,
        vec!["$ProjectionEnabled", "$ProjectionDisabled"]
    );

    let restarted = new_coordinator(&store);
    let recovered = restarted.recover().await.unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].state, Stopped);
    assert!(!recovered[0].enabled);
}

/// Delays appends to one stream after they land, while `stalled` is set.
struct SlowAppends {
    inner: InMemoryEventStore,
    stream: StreamId,
    delay: Duration,
    stalled: AtomicBool,
}

#[async_trait]
impl EventStore for SlowAppends {
    async fn append(
        &self,
        stream: &StreamId,
        events: Vec<NewEvent>,
        expected: ExpectedVersion,
    ) -> event_store::Result<AppendResult> {
        let written = self.inner.append(stream, events, expected).await?;
        if *stream == self.stream && self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        Ok(written)
    }

    async fn delete_stream(
        &self,
        stream: &StreamId,
        expected: ExpectedVersion,
    ) -> event_store::Result<()> {
        self.inner.delete_stream(stream, expected).await
    }

    async fn read_event(
        &self,
        stream: &StreamId,
        number: EventNumber,
    ) -> event_store::Result<ReadEventCompleted> {
        self.inner.read_event(stream, number).await
    }

    async fn read_stream_forward(
        &self,
        stream: &StreamId,
        from: EventNumber,
        max_count: usize,
    ) -> event_store::Result<ReadStreamCompleted> {
        self.inner.read_stream_forward(stream, from, max_count).await
    }

    async fn read_stream_backward(
        &self,
        stream: &StreamId,
        from: EventNumber,
        max_count: usize,
    ) -> event_store::Result<ReadStreamCompleted> {
        self.inner.read_stream_backward(stream, from, max_count).await
    }

    async fn read_all_forward(
        &self,
        from: LogPosition,
        max_count: usize,
    ) -> event_store::Result<ReadAllCompleted> {
        self.inner.read_all_forward(from, max_count).await
    }

    async fn read_all_backward(
        &self,
        from: LogPosition,
        max_count: usize,
    ) -> event_store::Result<ReadAllCompleted> {
        self.inner.read_all_backward(from, max_count).await
    }
}

#[tokio::test]
async fn test_checkpoint_landing_after_stop_timeout_does_not_fault_restart() {
    let store = InMemoryEventStore::new();
    seed(&store, "orders-1", "Added", 3).await;
    let slow = Arc::new(SlowAppends {
        inner: store.clone(),
        stream: name("totals").checkpoint_stream(),
        delay: Duration::from_millis(300),
        stalled: AtomicBool::new(true),
    });
    let settings = ManagementSettings {
        stop_timeout: Duration::from_millis(50),
        ..fast_settings()
    };
    let coordinator = ProjectionCoordinator::new(slow.clone(), Arc::new(BuiltinRuntime), settings);
    coordinator
        .create(definition("totals", COUNT), true)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    wait_until(&handle, |s| s.state == Running && s.events_processed == 3).await;

    // The checkpoint is written but its acknowledgement misses the deadline.
    coordinator.disable(&name("totals")).await.unwrap();
    wait_for_state(&handle, Stopped).await;
    slow.stalled.store(false, Ordering::SeqCst);
    assert_eq!(checkpoints(&store, "totals").await.len(), 1);

    seed(&store, "orders-1", "Added", 2).await;
    coordinator.enable(&name("totals")).await.unwrap();
    wait_until(&handle, |s| s.state == Running && s.events_processed == 5).await;
    coordinator.disable(&name("totals")).await.unwrap();
    let status = wait_for_state(&handle, Stopped).await;
    assert!(status.fault.is_none());

    let written = checkpoints(&store, "totals").await;
    let versions: Vec<u64> = written.iter().map(|c| c.version).collect();
    assert_eq!(versions, vec![1, 2]);
    assert_eq!(written[1].state, json!({"total": 5}));
}

/// Blocks `start` until the test releases it.
struct GatedRuntime {
    entered: mpsc::Sender<()>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl ProjectionRuntime for GatedRuntime {
    fn validate(&self, definition: &ProjectionDefinition) -> Result<CompiledPlan, ExecutionError> {
        BuiltinRuntime.validate(definition)
    }

    fn start(&self, plan: &CompiledPlan) -> Result<Box<dyn ProjectionExecution>, ExecutionError> {
        let _ = self.entered.send(());
        let _ = self.release.lock().unwrap().recv();
        BuiltinRuntime.start(plan)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disable_queued_while_starting_is_persisted() {
    let store = InMemoryEventStore::new();
    seed(&store, "orders-1", "Added", 3).await;
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let runtime = GatedRuntime {
        entered: entered_tx,
        release: Mutex::new(release_rx),
    };
    let coordinator = Arc::new(ProjectionCoordinator::new(
        Arc::new(store.clone()),
        Arc::new(runtime),
        fast_settings(),
    ));
    coordinator
        .create(definition("totals", COUNT), false)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    wait_for_state(&handle, Stopped).await;
    let mut transitions = handle.subscribe();

    coordinator.enable(&name("totals")).await.unwrap();
    tokio::task::spawn_blocking(move || entered_rx.recv_timeout(WAIT))
        .await
        .unwrap()
        .unwrap();

    let disable = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.disable(&name("totals")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    release_tx.send(()).unwrap();

    let status = wait_for_state(&handle, Stopped).await;
    disable.await.unwrap().unwrap();
    assert!(!status.enabled);
    assert!(status.fault.is_none());

    let mut observed = Vec::new();
    while let Ok(t) = transitions.try_recv() {
        observed.push((t.from, t.to));
    }
    assert_eq!(
        observed,
        vec![
            (Stopped, Writing),
            (Writing, Starting),
            (Starting, LoadingState),
            (LoadingState, Stopping),
            (Stopping, Writing),
            (Writing, Stopped),
        ]
    );
    assert_eq!(
        event_types(&store, &name("totals").management_stream()).await,
        vec!["$ProjectionEnabled", "$ProjectionDisabled"]
    );
}

#[tokio::test]
async fn test_completes_when_runtime_finishes() {
    let store = InMemoryEventStore::new();
    seed(&store, "orders-1", "Added", 10).await;
    let coordinator = new_coordinator(&store);
    coordinator
        .create(definition("first-four", r#"{"kind":"count","stop_after":4}"#), true)
        .await
        .unwrap();
    let handle = coordinator.get(&name("first-four")).await.unwrap();

    let status = wait_for_state(&handle, Completed).await;
    assert_eq!(status.events_processed, 4);
    let last = checkpoints(&store, "first-four").await.pop().unwrap();
    assert_eq!(last.state, json!({"total": 4}));
}

#[tokio::test]
async fn test_checkpoints_are_monotonic_and_survive_restart() {
    let store = InMemoryEventStore::new();
    seed(&store, "orders-1", "Added", 23).await;

    let first = new_coordinator(&store);
    first
        .create(definition("totals", COUNT), true)
        .await
        .unwrap();
    let handle = first.get(&name("totals")).await.unwrap();
    wait_until(&handle, |s| s.state == Running && s.events_processed == 23).await;
    first.shutdown().await;

    let written = checkpoints(&store, "totals").await;
    assert!(written.len() >= 2);
    for pair in written.windows(2) {
        assert!(pair[0].version < pair[1].version);
        assert!(pair[0].position <= pair[1].position);
    }
    let last = written.last().unwrap().clone();
    assert_eq!(last.state, json!({"total": 23}));

    let second = new_coordinator(&store);
    let recovered = second.recover().await.unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].state, Running);
    assert_eq!(recovered[0].checkpoint.as_ref(), Some(&last));

    seed(&store, "orders-2", "Added", 2).await;
    let handle = second.get(&name("totals")).await.unwrap();
    wait_until(&handle, |s| s.events_processed == 2).await;
    second.shutdown().await;

    let last = checkpoints(&store, "totals").await.pop().unwrap();
    assert_eq!(last.state, json!({"total": 25}));
}

#[tokio::test]
async fn test_recovery_restores_mode_per_projection() {
    let store = InMemoryEventStore::new();
    let first = new_coordinator(&store);
    for (projection, enabled) in [("on", true), ("off", false), ("dead", true)] {
        first
            .create(definition(projection, COUNT), enabled)
            .await
            .unwrap();
    }
    wait_for_state(&first.get(&name("on")).await.unwrap(), Running).await;
    wait_for_state(&first.get(&name("off")).await.unwrap(), Stopped).await;
    wait_for_state(&first.get(&name("dead")).await.unwrap(), Running).await;
    first.abort(&name("dead")).await.unwrap();
    first.shutdown().await;

    let second = new_coordinator(&store);
    let recovered = second.recover().await.unwrap();
    let states: Vec<_> = recovered.iter().map(|s| (s.name.to_string(), s.state)).collect();
    assert_eq!(
        states,
        vec![
            ("dead".to_string(), Aborted),
            ("off".to_string(), Stopped),
            ("on".to_string(), Running),
        ]
    );
    assert_eq!(second.list().await.len(), 3);
}

#[tokio::test]
async fn test_unacknowledged_definition_is_not_recovered() {
    let store = InMemoryEventStore::new();
    let first = new_coordinator(&store);

    store.fail_next_appends(100).await;
    first
        .create(definition("ghost", COUNT), true)
        .await
        .unwrap();
    let handle = first.get(&name("ghost")).await.unwrap();
    let status = wait_for_state(&handle, Faulted).await;
    assert_eq!(status.fault.unwrap().state_at_fault, Creating);
    store.fail_next_appends(0).await;

    let second = new_coordinator(&store);
    assert!(second.recover().await.unwrap().is_empty());
    assert!(second.list().await.is_empty());
}

#[tokio::test]
async fn test_transient_append_failures_are_retried() {
    let store = InMemoryEventStore::new();
    let coordinator = new_coordinator(&store);

    store.fail_next_appends(2).await;
    coordinator
        .create(definition("totals", COUNT), true)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    let status = wait_for_state(&handle, Running).await;
    assert!(status.fault.is_none());
}

#[tokio::test]
async fn test_read_failures_beyond_budget_fault_running_projection() {
    let store = InMemoryEventStore::new();
    let coordinator = new_coordinator(&store);
    coordinator
        .create(definition("totals", COUNT), true)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    wait_for_state(&handle, Running).await;

    store.fail_next_reads(100).await;
    let status = wait_for_state(&handle, Faulted).await;
    assert_eq!(status.fault.unwrap().state_at_fault, Running);
    store.fail_next_reads(0).await;
}

#[tokio::test]
async fn test_corrupt_checkpoint_faults_while_loading_state() {
    let store = InMemoryEventStore::new();
    let garbage = NewEvent::builder()
        .event_type("$ProjectionCheckpoint")
        .data_raw(json!({"not": "a checkpoint"}))
        .build();
    store
        .append_event(
            &name("totals").checkpoint_stream(),
            garbage,
            ExpectedVersion::Any,
        )
        .await
        .unwrap();

    let coordinator = new_coordinator(&store);
    coordinator
        .create(definition("totals", COUNT), true)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    let status = wait_for_state(&handle, Faulted).await;
    assert_eq!(status.fault.unwrap().state_at_fault, LoadingState);
}

#[tokio::test]
async fn test_foreign_checkpoint_writer_faults_projection() {
    let store = InMemoryEventStore::new();
    seed(&store, "orders-1", "Added", 3).await;
    let coordinator = new_coordinator(&store);
    coordinator
        .create(definition("totals", COUNT), true)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    wait_until(&handle, |s| s.state == Running && s.events_processed == 3).await;

    let foreign = NewEvent::builder()
        .event_type("$ProjectionCheckpoint")
        .data(&Checkpoint::reset(1))
        .unwrap()
        .build();
    store
        .append_event(
            &name("totals").checkpoint_stream(),
            foreign,
            ExpectedVersion::Any,
        )
        .await
        .unwrap();

    seed(&store, "orders-1", "Added", 5).await;
    let status = wait_for_state(&handle, Faulted).await;
    let fault = status.fault.unwrap();
    assert!(fault.reason.contains("Wrong expected version"), "{}", fault.reason);
}

#[tokio::test]
async fn test_delete_tombstones_the_name() {
    let store = InMemoryEventStore::new();
    let coordinator = new_coordinator(&store);
    coordinator
        .create(definition("totals", COUNT), true)
        .await
        .unwrap();
    let handle = coordinator.get(&name("totals")).await.unwrap();
    wait_for_state(&handle, Running).await;

    let err = coordinator.delete(&name("totals")).await.unwrap_err();
    assert!(matches!(err, ProjectionError::InvalidState { state: Running, .. }));

    coordinator.disable(&name("totals")).await.unwrap();
    wait_for_state(&handle, Stopped).await;
    coordinator.delete(&name("totals")).await.unwrap();
    // Deleting again is a no-op.
    coordinator.delete(&name("totals")).await.unwrap();

    assert!(matches!(
        coordinator.status(&name("totals")).await,
        Err(ProjectionError::NotFound(_))
    ));
    assert!(matches!(
        coordinator.create(definition("totals", COUNT), false).await,
        Err(ProjectionError::AlreadyExists(_))
    ));
    assert_eq!(
        event_types(&store, &StreamId::projection_registry()).await,
        vec!["$ProjectionCreated", "$ProjectionDeleted"]
    );
    assert!(matches!(
        store
            .read_stream_to_end(&name("totals").management_stream())
            .await,
        Err(EventStoreError::StreamDeleted(_))
    ));

    let restarted = new_coordinator(&store);
    assert!(restarted.recover().await.unwrap().is_empty());
    assert!(matches!(
        restarted.create(definition("totals", COUNT), false).await,
        Err(ProjectionError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_slow_delete_does_not_block_other_projections() {
    let store = InMemoryEventStore::new();
    let settings = ManagementSettings {
        write_attempts: 5,
        retry_min_delay: Duration::from_millis(200),
        retry_max_delay: Duration::from_millis(400),
        ..fast_settings()
    };
    let coordinator = Arc::new(coordinator_with(&store, settings));
    for projection in ["doomed", "survivor"] {
        coordinator
            .create(definition(projection, COUNT), false)
            .await
            .unwrap();
        let handle = coordinator.get(&name(projection)).await.unwrap();
        wait_for_state(&handle, Stopped).await;
    }

    // The tombstone append fails a few times, so the delete spends its
    // backoff waiting.
    store.fail_next_appends(3).await;
    let delete = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.delete(&name("doomed")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let survivor = tokio::time::timeout(
        Duration::from_millis(100),
        coordinator.status(&name("survivor")),
    )
    .await
    .expect("status blocked behind a delete")
    .unwrap();
    assert_eq!(survivor.state, Stopped);
    assert!(matches!(
        coordinator.create(definition("doomed", COUNT), false).await,
        Err(ProjectionError::AlreadyExists(_))
    ));

    delete.await.unwrap().unwrap();
    assert!(matches!(
        coordinator.status(&name("doomed")).await,
        Err(ProjectionError::NotFound(_))
    ));
    assert_eq!(coordinator.list().await.len(), 1);
}
