//! Lifecycle orchestration.
//!
//! # Responsibilities
//! - Start telemetry, then resources, then the listener, strictly in sequence
//! - Race the listener against every shutdown trigger
//! - Drive the bounded shutdown cascade: drain → telemetry → resources
//!
//! # Design Decisions
//! - `run(self)` consumes the orchestrator, so it cannot be restarted
//! - Every teardown phase runs even if an earlier one failed; errors are joined
//! - A drain that misses its deadline cuts off running requests and is
//!   reported as incomplete

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ServiceConfig;
use crate::http::{HttpServer, RequestMetrics, Server, ServiceContext};
use crate::lifecycle::shutdown::{BoxError, Shutdown, ShutdownError};
use crate::lifecycle::signals::{first_trigger, ShutdownTrigger};
use crate::lifecycle::state::{InvalidTransition, LifecycleState, StateTracker, StateView, StateWatch};
use crate::net::{InFlightTracker, ListenerError, ListenerSource};
use crate::observability::TraceBridge;
use crate::resources::{Connector, RegistryError, ResourceRegistry, TcpConnector};
use crate::telemetry::{TelemetryError, TelemetryPipeline};

/// Builds the listener once resources are available.
pub type ServerFactory = Box<dyn FnOnce(ServiceContext) -> Box<dyn Server> + Send>;

/// Requests were still running when the drain deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("drain incomplete: {in_flight} request(s) still in flight after {timeout:?}")]
pub struct DrainIncomplete {
    pub in_flight: u64,
    pub timeout: Duration,
}

/// Error type for [`Orchestrator::run`].
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Telemetry could not start; nothing else was started.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// A resource could not be acquired; telemetry was shut down again.
    #[error("{source}{}", .telemetry.as_ref().map(|e| format!(" (telemetry shutdown: {e})")).unwrap_or_default())]
    Resources {
        #[source]
        source: RegistryError,
        telemetry: Option<ShutdownError>,
    },

    /// Serving ended and at least one shutdown step failed.
    #[error("shutdown finished with errors: {0}")]
    Shutdown(ShutdownError),

    #[error(transparent)]
    State(#[from] InvalidTransition),
}

/// Why serving ended.
enum ShutdownCause {
    Listener(ListenerError),
    Trigger(String),
    /// The state machine refused to enter `Serving`.
    Rejected,
}

/// Owns one run of the service lifecycle.
pub struct Orchestrator {
    config: ServiceConfig,
    connector: Arc<dyn Connector>,
    triggers: Vec<Box<dyn ShutdownTrigger>>,
    server: Option<ServerFactory>,
    bridge: Option<TraceBridge>,
    state: StateTracker,
}

impl Orchestrator {
    /// Orchestrator with a TCP connector, the HTTP server, and no triggers.
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            connector: Arc::new(TcpConnector::default()),
            triggers: Vec::new(),
            server: None,
            bridge: None,
            state: StateTracker::new(),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Add a shutdown trigger. The first one to fire wins.
    pub fn with_trigger(mut self, trigger: impl ShutdownTrigger + 'static) -> Self {
        self.triggers.push(Box::new(trigger));
        self
    }

    /// Replace the default HTTP server.
    pub fn with_server<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(ServiceContext) -> Box<dyn Server> + Send + 'static,
    {
        self.server = Some(Box::new(factory));
        self
    }

    /// Attach spans to the pipeline's tracer once telemetry is up.
    pub fn with_trace_bridge(mut self, bridge: TraceBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Read-only view of the lifecycle state and its history.
    pub fn state_view(&self) -> StateView {
        self.state.view()
    }

    pub fn subscribe(&self) -> StateWatch {
        self.state.subscribe()
    }

    /// Run the service until a trigger fires or the listener fails.
    pub async fn run(self) -> Result<(), OrchestratorError> {
        let Orchestrator {
            config,
            connector,
            triggers,
            server,
            bridge,
            state,
        } = self;
        let teardown = config.shutdown.teardown_timeout();

        // Init → Starting
        state.transition(LifecycleState::Starting)?;
        let telemetry = match TelemetryPipeline::start(&config.telemetry).await {
            Ok(telemetry) => telemetry,
            Err(e) => {
                tracing::error!(error = %e, "Telemetry startup failed");
                state.transition(LifecycleState::Stopped)?;
                return Err(e.into());
            }
        };
        if let Some(bridge) = &bridge {
            if let Err(e) = bridge.attach(telemetry.tracer()) {
                tracing::warn!(error = %e, "Could not attach span bridge");
            }
        }

        // Starting → Serving
        let registry =
            match ResourceRegistry::acquire_all(connector, &config.resources, teardown).await {
                Ok(registry) => Arc::new(registry),
                Err(source) => {
                    detach(bridge.as_ref());
                    let telemetry = telemetry.shutdown(Instant::now() + teardown).await.err();
                    state.transition(LifecycleState::Stopped)?;
                    return Err(OrchestratorError::Resources { source, telemetry });
                }
            };

        let in_flight = InFlightTracker::new();
        let cutoff = Shutdown::new();
        let context = ServiceContext {
            service_name: config.telemetry.service_name.clone(),
            registry: registry.clone(),
            state: state.subscribe(),
            in_flight: in_flight.clone(),
            cutoff: cutoff.clone(),
            metrics: RequestMetrics::new(&telemetry.meter()),
            request_timeout: config.listener.request_timeout(),
        };
        let server: Box<dyn Server> = match server {
            Some(factory) => factory(context),
            None => Box::new(HttpServer::new(
                ListenerSource::Address(config.listener.socket_address()),
                context,
            )),
        };

        let (drain_tx, drain_rx) = watch::channel(false);
        let mut server_task = tokio::spawn(server.serve(drain_rx));

        // From here on the server and resources are live: a rejected transition
        // is recorded and teardown still runs.
        let mut errors = ShutdownError::new();

        // Starting → Serving
        let cause = match state.transition(LifecycleState::Serving) {
            Ok(_) => {
                tracing::info!(
                    service = %config.telemetry.service_name,
                    resources = registry.handles().len(),
                    "Service ready"
                );
                tokio::select! {
                    result = &mut server_task => ShutdownCause::Listener(listener_failure(result)),
                    name = first_trigger(&triggers) => ShutdownCause::Trigger(name),
                }
            }
            Err(e) => {
                record_transition_failure(&mut errors, e);
                ShutdownCause::Rejected
            }
        };

        // Serving → ShuttingDown
        if let Err(e) = state.transition(LifecycleState::ShuttingDown) {
            record_transition_failure(&mut errors, e);
        }

        // ShuttingDown → Stopped
        let running = match cause {
            ShutdownCause::Listener(e) => {
                tracing::error!(error = %e, "Listener failed, shutting down");
                errors.push("listener", e);
                None
            }
            ShutdownCause::Trigger(name) => {
                tracing::info!(trigger = %name, "Shutdown requested");
                Some(server_task)
            }
            ShutdownCause::Rejected => Some(server_task),
        };
        if let Some(server_task) = running {
            drain_tx.send_replace(true);
            if let Err(e) = drain(
                server_task,
                &in_flight,
                &cutoff,
                config.shutdown.drain_timeout(),
            )
            .await
            {
                errors.push("listener", e);
            }
        }

        detach(bridge.as_ref());
        errors.absorb(telemetry.shutdown(Instant::now() + teardown).await);
        errors.absorb(registry.close_all(Instant::now() + teardown).await);

        if let Err(e) = state.transition(LifecycleState::Stopped) {
            record_transition_failure(&mut errors, e);
        }
        match errors.into_result() {
            Ok(()) => {
                tracing::info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                tracing::error!(failures = e.len(), error = %e, "Shutdown completed with errors");
                Err(OrchestratorError::Shutdown(e))
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state.current())
            .field("resources", &self.config.resources.len())
            .field("triggers", &self.triggers.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// The listener finished on its own: any outcome is terminal.
fn listener_failure(
    result: Result<Result<(), ListenerError>, tokio::task::JoinError>,
) -> ListenerError {
    match result {
        Ok(Ok(())) => ListenerError::Closed,
        Ok(Err(e)) => e,
        Err(join) => ListenerError::Task(join),
    }
}

/// Wait for the server to drain, cutting off whatever is left at the deadline.
async fn drain(
    mut server_task: JoinHandle<Result<(), ListenerError>>,
    in_flight: &InFlightTracker,
    cutoff: &Shutdown,
    timeout: Duration,
) -> Result<(), BoxError> {
    match tokio::time::timeout(timeout, &mut server_task).await {
        Ok(Ok(Ok(()))) => {
            tracing::info!("Listener drained");
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e.into()),
        Ok(Err(join)) => Err(ListenerError::Task(join).into()),
        Err(_) => {
            let left = in_flight.active_count();
            tracing::warn!(in_flight = left, timeout = ?timeout, "Drain deadline exceeded, cutting off requests");
            cutoff.trigger();
            server_task.abort();
            Err(DrainIncomplete {
                in_flight: left,
                timeout,
            }
            .into())
        }
    }
}

fn record_transition_failure(errors: &mut ShutdownError, e: InvalidTransition) {
    tracing::error!(error = %e, "Lifecycle transition rejected");
    errors.push("lifecycle", e);
}

fn detach(bridge: Option<&TraceBridge>) {
    if let Some(bridge) = bridge {
        if let Err(e) = bridge.detach() {
            tracing::warn!(error = %e, "Could not detach span bridge");
        }
    }
}
