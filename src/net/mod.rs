//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerSource (address or pre-bound socket)
//!     → listener.rs (bind, classify failures)
//!     → Hand off to HTTP layer
//!     → connection.rs (in-flight request tracking for drain)
//! ```
//!
//! # Design Decisions
//! - Request handling is unbounded; no admission control at this layer
//! - Every request is tracked so shutdown can drain or report leftovers

pub mod connection;
pub mod listener;

pub use connection::{InFlightGuard, InFlightTracker};
pub use listener::{ListenerError, ListenerSource};
