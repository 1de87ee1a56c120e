//! External resource subsystem.
//!
//! # Data Flow
//! ```text
//! ResourceSpec (config)
//!     → spec.rs (resolve address / DSN to host:port)
//!     → connector.rs (open connection)
//!     → handle.rs (liveness probe, is_open tracking)
//!     → registry.rs (register close step, expose handles by name)
//!
//! On failure of resource k:
//!     registry.rs closes k, then k-1 .. 1, and returns the error
//! ```
//!
//! # Design Decisions
//! - Acquisition is sequential; rollback order is deterministic
//! - Handles are owned by the registry and shared read-only via `Arc`
//! - Closing is idempotent at both the handle and the registry level

pub mod connector;
pub mod handle;
pub mod registry;
pub mod spec;

pub use connector::{Connection, Connector, ResourceError, TcpConnector};
pub use handle::ResourceHandle;
pub use registry::{AcquireError, AcquireStage, RegistryError, ResourceRegistry};
pub use spec::{ResourceKind, ResourceSpec};
