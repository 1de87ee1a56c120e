//! Telemetry pipeline startup and teardown.

use std::fmt;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use tokio::time::Instant;

use crate::config::validation::check_http_url;
use crate::config::{ExportMode, TelemetryConfig};
use crate::lifecycle::shutdown::{BoxError, ShutdownError, ShutdownOrder, ShutdownStack};
use crate::telemetry::host_metrics::HostMetrics;
use crate::telemetry::{propagation, resource};

/// Time allowed to undo a partially started pipeline.
const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Instrumentation scope for meters handed out by the pipeline.
const METER_SCOPE: &str = "service-orchestrator";

/// Setup stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Traces,
    Metrics,
    HostMetrics,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineStage::Traces => "trace exporter",
            PipelineStage::Metrics => "metric exporter",
            PipelineStage::HostMetrics => "host metrics",
        })
    }
}

/// Pipeline setup failed; stages that had started were shut down again.
#[derive(Debug, thiserror::Error)]
#[error("telemetry {stage} setup failed: {source}{}", rollback_suffix(.rollback))]
pub struct TelemetryError {
    pub stage: PipelineStage,
    #[source]
    pub source: BoxError,
    /// Failures while undoing earlier stages, if any.
    pub rollback: Option<ShutdownError>,
}

fn rollback_suffix(rollback: &Option<ShutdownError>) -> String {
    match rollback {
        Some(e) => format!(" (rollback: {e})"),
        None => String::new(),
    }
}

/// Entry point for building the trace and metric pipeline.
pub struct TelemetryPipeline;

impl TelemetryPipeline {
    /// Build exporters, providers and collectors for `config`.
    ///
    /// On success the tracer and meter providers are installed globally and
    /// the returned handle owns their shutdown. On failure every stage that
    /// already started is shut down before the error is returned.
    pub async fn start(config: &TelemetryConfig) -> Result<TelemetryHandle, TelemetryError> {
        let resource = resource::build_resource(&config.service_name);
        let mut stack = ShutdownStack::new("telemetry", ShutdownOrder::Fifo);

        let tracer_provider = match build_tracer_provider(config, resource.clone()) {
            Ok(provider) => provider,
            Err(source) => return Err(abort(stack, PipelineStage::Traces, source).await),
        };
        let provider = tracer_provider.clone();
        stack.register("tracer-provider", move |_| {
            shutdown_blocking(move || provider.shutdown())
        });

        let meter_provider = match build_meter_provider(config, resource) {
            Ok(provider) => provider,
            Err(source) => return Err(abort(stack, PipelineStage::Metrics, source).await),
        };
        let provider = meter_provider.clone();
        stack.register("meter-provider", move |_| {
            shutdown_blocking(move || provider.shutdown())
        });

        if config.host_metrics {
            let meter = meter_provider.meter(METER_SCOPE);
            match HostMetrics::start(&meter, config.host_metrics_interval()) {
                // Recording into a shut-down meter is a no-op, so stopping last is fine.
                Ok(collector) => stack.register("host-metrics", move |_| collector.stop()),
                Err(source) => return Err(abort(stack, PipelineStage::HostMetrics, source).await),
            }
        }

        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());
        propagation::install();

        tracing::info!(
            service = %config.service_name,
            mode = %config.mode,
            metric_interval = ?config.metric_interval(),
            host_metrics = config.host_metrics,
            "Telemetry pipeline started"
        );

        Ok(TelemetryHandle {
            service_name: config.service_name.clone(),
            mode: config.mode,
            metric_interval: config.metric_interval(),
            tracer_provider,
            meter_provider,
            shutdown: stack,
        })
    }
}

/// Running pipeline.
pub struct TelemetryHandle {
    service_name: String,
    mode: ExportMode,
    metric_interval: Duration,
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    shutdown: ShutdownStack,
}

impl TelemetryHandle {
    /// Tracer bound to the service name, for the logging bridge.
    pub fn tracer(&self) -> Tracer {
        self.tracer_provider.tracer(self.service_name.clone())
    }

    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(METER_SCOPE)
    }

    pub fn mode(&self) -> ExportMode {
        self.mode
    }

    /// Interval of the periodic metric reader.
    pub fn metric_interval(&self) -> Duration {
        self.metric_interval
    }

    /// Names of shutdown steps not yet run.
    pub fn pending_shutdowns(&self) -> Vec<String> {
        self.shutdown.step_names()
    }

    /// Flush and stop every stage. Later calls return `Ok(())` without doing anything.
    pub async fn shutdown(&self, deadline: Instant) -> Result<(), ShutdownError> {
        self.shutdown.run(deadline).await
    }
}

impl fmt::Debug for TelemetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryHandle")
            .field("service_name", &self.service_name)
            .field("mode", &self.mode)
            .field("metric_interval", &self.metric_interval)
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

fn build_tracer_provider(
    config: &TelemetryConfig,
    resource: Resource,
) -> Result<TracerProvider, BoxError> {
    let builder = TracerProvider::builder().with_resource(resource);
    let provider = match config.mode {
        ExportMode::Debug => builder
            .with_batch_exporter(opentelemetry_stdout::SpanExporter::default(), runtime::Tokio)
            .build(),
        ExportMode::Production => {
            let url = config.traces_url();
            check_http_url(&url)?;
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .with_endpoint(url)
                .build()?;
            builder.with_batch_exporter(exporter, runtime::Tokio).build()
        }
    };
    Ok(provider)
}

fn build_meter_provider(
    config: &TelemetryConfig,
    resource: Resource,
) -> Result<SdkMeterProvider, BoxError> {
    let interval = config.metric_interval();
    let provider = match config.mode {
        ExportMode::Debug => periodic_meter_provider(
            opentelemetry_stdout::MetricExporter::default(),
            interval,
            resource,
        ),
        ExportMode::Production => {
            let url = config.metrics_url();
            check_http_url(&url)?;
            let exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_http()
                .with_endpoint(url)
                .build()?;
            periodic_meter_provider(exporter, interval, resource)
        }
    };
    Ok(provider)
}

/// Meter provider that pushes to `exporter` every `interval`.
fn periodic_meter_provider<E>(exporter: E, interval: Duration, resource: Resource) -> SdkMeterProvider
where
    E: PushMetricExporter,
{
    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(interval)
        .build();
    SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build()
}

/// Provider shutdown blocks on the final flush, so it runs off the async workers.
async fn shutdown_blocking<F, E>(shutdown: F) -> Result<(), BoxError>
where
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    tokio::task::spawn_blocking(shutdown)
        .await
        .map_err(BoxError::from)?
        .map_err(Into::into)
}

async fn abort(stack: ShutdownStack, stage: PipelineStage, source: BoxError) -> TelemetryError {
    tracing::error!(%stage, error = %source, "Telemetry setup failed; rolling back");
    let rollback = stack.run(Instant::now() + ROLLBACK_TIMEOUT).await.err();
    TelemetryError {
        stage,
        source,
        rollback,
    }
}
