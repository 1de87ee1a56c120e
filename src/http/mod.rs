//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, trace span, in-flight tracking, state gate)
//!     → handlers.rs (index, health, resource listing, one backend call per request)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod server;

pub use request::{RequestId, RequestMetrics, X_REQUEST_ID};
pub use server::{HttpServer, Server, ServiceContext};
