//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, in-flight tracking, state gate)
//! - Bind the listener and serve until told to drain
//!
//! # Design Decisions
//! - The orchestrator only sees the [`Server`] trait, so tests can swap in
//!   servers that fail or stall on demand
//! - Shared state is an explicit [`ServiceContext`], no globals

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::http::request::{self, RequestMetrics};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::state::StateWatch;
use crate::net::{InFlightTracker, ListenerError, ListenerSource};
use crate::resources::ResourceRegistry;

/// State shared with every request.
#[derive(Clone)]
pub struct ServiceContext {
    pub service_name: String,
    pub registry: Arc<ResourceRegistry>,
    pub state: StateWatch,
    pub in_flight: InFlightTracker,
    /// Fired when the drain deadline expires; running requests are cut off.
    pub cutoff: Shutdown,
    pub metrics: RequestMetrics,
    /// Inbound request timeout, also applied to backend calls.
    pub request_timeout: Duration,
}

/// Something the orchestrator can run as its listener.
#[async_trait]
pub trait Server: Send {
    /// Serve until `drain` becomes `true`, then finish in-flight work and return.
    ///
    /// Returning before a drain was requested is a terminal listener failure.
    async fn serve(self: Box<Self>, drain: watch::Receiver<bool>) -> Result<(), ListenerError>;
}

/// Axum server for the service endpoints.
pub struct HttpServer {
    source: ListenerSource,
    router: Router,
}

impl HttpServer {
    /// Create a server that will listen on `source`.
    pub fn new(source: ListenerSource, context: ServiceContext) -> Self {
        let router = Self::build_router(context);
        Self { source, router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(context: ServiceContext) -> Router {
        Router::new()
            .route("/", get(handlers::index))
            .route("/health", get(handlers::health))
            .route("/resources", get(handlers::list_resources))
            .route("/resources/{name}", get(handlers::ping_resource))
            .layer(from_fn_with_state(context.clone(), request::gate))
            .layer(from_fn_with_state(context.clone(), request::track))
            .layer(TimeoutLayer::new(context.request_timeout))
            .layer(TraceLayer::new_for_http().make_span_with(request::make_request_span))
            .layer(from_fn(request::request_id))
            .with_state(context)
    }
}

#[async_trait]
impl Server for HttpServer {
    async fn serve(self: Box<Self>, mut drain: watch::Receiver<bool>) -> Result<(), ListenerError> {
        let HttpServer { source, router } = *self;
        let listener = source.into_listener().await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // A dropped sender also means the orchestrator is gone.
                let _ = drain.wait_for(|draining| *draining).await;
                tracing::info!("Listener draining");
            })
            .await
            .map_err(ListenerError::Serve)?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
