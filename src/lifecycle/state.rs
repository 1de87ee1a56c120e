//! Lifecycle state machine.
//!
//! # States
//! ```text
//! Init → Starting → Serving → ShuttingDown → Stopped
//!            │                                  ▲
//!            └──────── startup failure ─────────┘
//! ```
//!
//! # Design Decisions
//! - Transitions are checked: an illegal edge is an error, never a silent overwrite
//! - Current state is published on a watch channel for the request layer
//! - Every accepted transition is appended to a history for diagnostics

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;

/// Orchestrator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Init,
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    /// Whether `self → next` is a legal edge.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Init, Starting)
                | (Starting, Serving)
                | (Starting, Stopped)
                | (Serving, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }

    /// Only `Serving` accepts new work.
    pub fn is_accepting(self) -> bool {
        self == LifecycleState::Serving
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Init => "init",
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid lifecycle transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// Read-only view of the lifecycle state.
pub type StateWatch = watch::Receiver<LifecycleState>;

/// Owner of the lifecycle state.
#[derive(Debug, Clone)]
pub struct StateTracker {
    tx: Arc<watch::Sender<LifecycleState>>,
    history: Arc<Mutex<Vec<LifecycleState>>>,
}

impl StateTracker {
    /// Start in [`LifecycleState::Init`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Init);
        Self {
            tx: Arc::new(tx),
            history: Arc::new(Mutex::new(vec![LifecycleState::Init])),
        }
    }

    pub fn current(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> StateWatch {
        self.tx.subscribe()
    }

    /// Move to `next`, returning the previous state.
    pub fn transition(&self, next: LifecycleState) -> Result<LifecycleState, InvalidTransition> {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let mut previous = self.current();
        let accepted = self.tx.send_if_modified(|state| {
            previous = *state;
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });
        if !accepted {
            return Err(InvalidTransition {
                from: previous,
                to: next,
            });
        }
        history.push(next);
        tracing::info!(from = %previous, to = %next, "Lifecycle transition");
        Ok(previous)
    }

    /// Every state entered so far, starting with `Init`.
    pub fn history(&self) -> Vec<LifecycleState> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Handle that can observe this tracker but never move it.
    pub fn view(&self) -> StateView {
        StateView {
            tracker: self.clone(),
        }
    }
}

/// Read-only handle on a [`StateTracker`].
#[derive(Debug, Clone)]
pub struct StateView {
    tracker: StateTracker,
}

impl StateView {
    pub fn current(&self) -> LifecycleState {
        self.tracker.current()
    }

    pub fn subscribe(&self) -> StateWatch {
        self.tracker.subscribe()
    }

    pub fn history(&self) -> Vec<LifecycleState> {
        self.tracker.history()
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
