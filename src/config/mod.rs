//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: PORT, OTEL_*, per-backend addresses)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → handed to the orchestrator by value
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup and never reloaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env, load_config, load_config_with_env, ConfigError};
pub use schema::{
    ExportMode, ListenerConfig, ObservabilityConfig, ServiceConfig, ShutdownConfig, TelemetryConfig,
};
pub use validation::{validate_config, ValidationError};
