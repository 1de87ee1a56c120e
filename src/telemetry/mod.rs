//! Telemetry Pipeline Subsystem
//!
//! # Data Flow
//! ```text
//! TelemetryConfig
//!     → resource.rs (service.name, host.name, SDK defaults)
//!     → exporter per mode (stdout in debug, OTLP/HTTP in production)
//!     → TracerProvider (batched spans) + SdkMeterProvider (periodic reader)
//!     → host_metrics.rs (process, system and runtime gauges)
//!     → globals: providers + propagation.rs (trace-context + baggage)
//!     → TelemetryHandle (owns the FIFO shutdown list)
//! ```
//!
//! # Design Decisions
//! - Each started stage registers its shutdown step immediately
//! - A failed stage runs the steps registered so far before reporting
//! - Global providers and the propagator are installed only after every stage succeeded
//! - Shutdown flushes pending spans and metrics; later calls are no-ops

pub mod host_metrics;
pub mod pipeline;
pub mod propagation;
pub mod resource;

pub use host_metrics::HostMetrics;
pub use pipeline::{PipelineStage, TelemetryError, TelemetryHandle, TelemetryPipeline};
pub use propagation::extract_context;
