//! Projection lifecycle state machine.

use serde::{Deserialize, Serialize};

/// The lifecycle state of a managed projection.
///
/// State transitions:
/// ```text
/// Creating ─► Loading ─► Loaded ─► Preparing ─► Prepared ─┬─► Writing ─┬─► Starting
///    ▲                                                    ├─► Starting  └─► Stopped
///    │                                                    ├─► Stopped
///    │                                                    └─► Aborted
///    │
/// Starting ─► LoadingState ─► Running ─┬─► Completed
///                                      └─► Stopping ─┬─► Writing
///                                                    └─► Stopped
///
/// Completed/Aborted/Faulted ─► Creating (reset)
/// ```
///
/// Every non-terminal working state may also fault. The states are ordered
/// only by this graph; the enum order carries no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManagedProjectionState {
    Creating,
    Loading,
    Loaded,
    Preparing,
    Prepared,
    Writing,
    Starting,
    LoadingState,
    Running,
    Stopping,
    Stopped,
    Completed,
    Aborted,
    Faulted,
}

use ManagedProjectionState::*;

impl ManagedProjectionState {
    /// Every state, in declaration order.
    pub const ALL: [ManagedProjectionState; 14] = [
        Creating,
        Loading,
        Loaded,
        Preparing,
        Prepared,
        Writing,
        Starting,
        LoadingState,
        Running,
        Stopping,
        Stopped,
        Completed,
        Aborted,
        Faulted,
    ];

    /// States reachable in one step from this one.
    pub fn successors(&self) -> &'static [ManagedProjectionState] {
        match self {
            Creating => &[Loading, Faulted],
            Loading => &[Loaded, Faulted],
            Loaded => &[Preparing, Faulted],
            Preparing => &[Prepared, Faulted],
            Prepared => &[Writing, Starting, Stopped, Aborted, Faulted],
            Writing => &[Starting, Stopped, Faulted],
            Starting => &[LoadingState, Stopping, Aborted, Faulted],
            LoadingState => &[Running, Stopping, Aborted, Faulted],
            Running => &[Stopping, Completed, Aborted, Faulted],
            Stopping => &[Writing, Stopped, Aborted, Faulted],
            Stopped => &[Writing, Aborted],
            Completed => &[Writing, Creating],
            Aborted => &[Creating],
            Faulted => &[Creating],
        }
    }

    /// Returns true if `next` is a legal transition from this state.
    pub fn can_transition_to(&self, next: ManagedProjectionState) -> bool {
        self.successors().contains(&next)
    }

    /// Returns true if the projection can be enabled from this state.
    pub fn can_enable(&self) -> bool {
        matches!(self, Stopped | Prepared | Completed | Faulted)
    }

    /// Returns true if the projection is already on its way to running.
    pub fn is_enabled_phase(&self) -> bool {
        matches!(self, Starting | LoadingState | Running)
    }

    /// Returns true if the projection can be disabled from this state.
    pub fn can_disable(&self) -> bool {
        self.is_enabled_phase()
    }

    /// Returns true if the projection can be aborted from this state.
    pub fn can_abort(&self) -> bool {
        matches!(
            self,
            Prepared | Starting | LoadingState | Running | Stopping | Stopped
        )
    }

    /// Returns true if the projection can be reset from this state.
    pub fn can_reset(&self) -> bool {
        matches!(self, Faulted | Aborted | Completed)
    }

    /// Returns true if the projection can be deleted from this state.
    pub fn can_delete(&self) -> bool {
        matches!(self, Stopped | Completed | Aborted | Faulted)
    }

    /// Returns true for states in which the actor waits for commands.
    pub fn is_resting(&self) -> bool {
        matches!(self, Running | Stopped | Completed | Aborted | Faulted)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Creating => "Creating",
            Loading => "Loading",
            Loaded => "Loaded",
            Preparing => "Preparing",
            Prepared => "Prepared",
            Writing => "Writing",
            Starting => "Starting",
            LoadingState => "LoadingState",
            Running => "Running",
            Stopping => "Stopping",
            Stopped => "Stopped",
            Completed => "Completed",
            Aborted => "Aborted",
            Faulted => "Faulted",
        }
    }
}

impl std::fmt::Display for ManagedProjectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
