//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resources::ResourceSpec;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    pub listener: ListenerConfig,

    /// Trace and metric export settings.
    pub telemetry: TelemetryConfig,

    /// Backends acquired at startup, in declaration order.
    pub resources: Vec<ResourceSpec>,

    /// Graceful shutdown deadlines.
    pub shutdown: ShutdownConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub bind_address: String,

    /// Listening port.
    pub port: u16,

    /// Per-request timeout in seconds; backend calls inherit it.
    pub request_timeout_secs: u64,
}

impl ListenerConfig {
    /// `bind_address:port`, bracketing IPv6 literals.
    pub fn socket_address(&self) -> String {
        if self.bind_address.contains(':') {
            format!("[{}]:{}", self.bind_address, self.port)
        } else {
            format!("{}:{}", self.bind_address, self.port)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: 10,
        }
    }
}

/// Where telemetry goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Human-readable output on stdout, fast metric interval.
    Debug,
    /// OTLP/HTTP export to a collector.
    #[default]
    Production,
}

impl ExportMode {
    /// Metric reader interval used when none is configured.
    pub fn default_metric_interval(self) -> Duration {
        match self {
            ExportMode::Debug => Duration::from_secs(10),
            ExportMode::Production => Duration::from_secs(60),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportMode::Debug => "debug",
            ExportMode::Production => "production",
        }
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(ExportMode::Debug),
            "production" | "prod" => Ok(ExportMode::Production),
            other => Err(format!("unknown export mode `{other}` (expected debug or production)")),
        }
    }
}

/// Telemetry pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `service.name` resource attribute.
    pub service_name: String,

    pub mode: ExportMode,

    /// Collector base URL (production only). Signal paths are appended.
    pub endpoint: String,

    /// Full metrics URL, overriding `endpoint` for metrics.
    pub metrics_endpoint: Option<String>,

    /// Metric reader interval in milliseconds. Defaults by mode.
    pub metric_interval_ms: Option<u64>,

    /// Sample process and runtime counters.
    pub host_metrics: bool,

    /// Host metric sampling interval in seconds.
    pub host_metrics_interval_secs: u64,
}

impl TelemetryConfig {
    pub fn metric_interval(&self) -> Duration {
        self.metric_interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.mode.default_metric_interval())
    }

    pub fn host_metrics_interval(&self) -> Duration {
        Duration::from_secs(self.host_metrics_interval_secs)
    }

    /// OTLP/HTTP traces URL.
    pub fn traces_url(&self) -> String {
        format!("{}/v1/traces", self.endpoint.trim_end_matches('/'))
    }

    /// OTLP/HTTP metrics URL.
    pub fn metrics_url(&self) -> String {
        match &self.metrics_endpoint {
            Some(url) => url.clone(),
            None => format!("{}/v1/metrics", self.endpoint.trim_end_matches('/')),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "service-orchestrator".to_string(),
            mode: ExportMode::default(),
            endpoint: "http://localhost:4318".to_string(),
            metrics_endpoint: None,
            metric_interval_ms: None,
            host_metrics: true,
            host_metrics_interval_secs: 15,
        }
    }
}

/// Shutdown deadlines.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time allowed for in-flight requests to finish, in seconds.
    pub drain_timeout_secs: u64,

    /// Deadline for each teardown phase (telemetry, resources), in seconds.
    pub teardown_timeout_secs: u64,
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 5,
            teardown_timeout_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
