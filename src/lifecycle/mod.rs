//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (orchestrator.rs):
//!     Init → Starting: telemetry pipeline
//!     Starting → Serving: resource registry, then listener task
//!
//! Serving (signals.rs):
//!     select { listener terminal error, first ShutdownTrigger }
//!
//! Shutdown (shutdown.rs):
//!     ShuttingDown → Stopped: drain listener → telemetry → resources
//!     every step bounded by a deadline, failures joined
//! ```
//!
//! # Design Decisions
//! - Ordered startup: telemetry first, then resources, then listener
//! - Ordered shutdown: stop accepting, drain, flush telemetry, close resources
//! - Shutdown has timeouts: a late phase is an error, never a hang

pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod state;

pub use orchestrator::{DrainIncomplete, Orchestrator, OrchestratorError, ServerFactory};
pub use shutdown::{
    BoxError, DeadlineExceeded, Shutdown, ShutdownError, ShutdownOrder, ShutdownStack, StepFailure,
};
pub use signals::{first_trigger, ShutdownTrigger, SignalTrigger};
pub use state::{InvalidTransition, LifecycleState, StateTracker, StateView, StateWatch};
