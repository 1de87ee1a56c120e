//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Pick JSON output for production export, pretty output for debug
//! - Bridge spans into OpenTelemetry once the telemetry pipeline is up
//!
//! # Design Decisions
//! - Logging starts before telemetry, so the OpenTelemetry layer is a reload
//!   slot that begins empty and is filled by [`TraceBridge::attach`]
//! - `RUST_LOG` wins over the configured level

use opentelemetry_sdk::trace::Tracer;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::config::{ExportMode, ObservabilityConfig};

type OtelLayer = OpenTelemetryLayer<Registry, Tracer>;

/// Reload slot holding the span bridge, if any.
pub type BridgeLayer = reload::Layer<Option<OtelLayer>, Registry>;

/// Error type for logging setup.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to install subscriber: {0}")]
    Init(#[from] TryInitError),

    #[error("failed to swap span bridge: {0}")]
    Reload(#[from] reload::Error),
}

/// Handle for connecting `tracing` spans to an OpenTelemetry tracer.
#[derive(Clone)]
pub struct TraceBridge {
    handle: reload::Handle<Option<OtelLayer>, Registry>,
}

impl TraceBridge {
    /// Empty bridge layer and its handle.
    pub fn layer() -> (BridgeLayer, Self) {
        let (layer, handle) = reload::Layer::new(None);
        (layer, Self { handle })
    }

    /// Start exporting spans through `tracer`.
    pub fn attach(&self, tracer: Tracer) -> Result<(), LoggingError> {
        self.handle
            .reload(Some(tracing_opentelemetry::layer().with_tracer(tracer)))?;
        tracing::debug!("Span bridge attached");
        Ok(())
    }

    /// Stop exporting spans. Used before the tracer provider shuts down.
    pub fn detach(&self) -> Result<(), LoggingError> {
        self.handle.reload(None)?;
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.handle
            .with_current(|layer| layer.is_some())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for TraceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceBridge")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Install the global subscriber.
pub fn init(config: &ObservabilityConfig, mode: ExportMode) -> Result<TraceBridge, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)?,
    };
    let (bridge_layer, bridge) = TraceBridge::layer();

    let (json, pretty) = match mode {
        ExportMode::Production => (Some(tracing_subscriber::fmt::layer().json()), None),
        ExportMode::Debug => (None, Some(tracing_subscriber::fmt::layer().pretty())),
    };

    tracing_subscriber::registry()
        .with(bridge_layer)
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()?;

    Ok(bridge)
}
