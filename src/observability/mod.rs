//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events and spans
//!     → logging.rs (EnvFilter → JSON or pretty stdout)
//!     → TraceBridge (spans → OpenTelemetry tracer, once telemetry is up)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing in production
//! - Request ID and trace context flow through every request span
//! - Metrics live in the telemetry pipeline, not here

pub mod logging;

pub use logging::{init, LoggingError, TraceBridge};
