//! Service Lifecycle Orchestrator Library

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resources;
pub mod telemetry;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{Orchestrator, OrchestratorError, Shutdown};
