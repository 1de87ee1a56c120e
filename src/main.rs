//! Service Lifecycle Orchestrator
//!
//! Brings the service from cold start to serving with full telemetry, and
//! tears it back down on a signal or a fatal listener error.
//!
//! # Architecture Overview
//!
//! ```text
//!   config (TOML + env)
//!        │
//!        ▼
//!   ┌──────────────────────────── Orchestrator ────────────────────────────┐
//!   │                                                                      │
//!   │  Init ──▶ Starting ──────────────▶ Serving ───────▶ ShuttingDown ──▶ Stopped
//!   │              │                        │                  │           │
//!   │              ▼                        ▼                  ▼           │
//!   │     ┌─────────────────┐      ┌────────────────┐   drain listener     │
//!   │     │   telemetry     │      │  http server   │   flush telemetry    │
//!   │     │ traces, metrics │      │ (background)   │   close resources    │
//!   │     │ propagation     │      └───────┬────────┘                      │
//!   │     └─────────────────┘              │ select!                       │
//!   │     ┌─────────────────┐              ▼                               │
//!   │     │   resources     │      listener error | SIGINT/SIGTERM         │
//!   │     │ acquire + probe │                                              │
//!   │     └─────────────────┘                                              │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use service_orchestrator::config::load_config;
use service_orchestrator::lifecycle::{Orchestrator, SignalTrigger};
use service_orchestrator::observability;

#[derive(Parser)]
#[command(name = "service-orchestrator", version)]
#[command(about = "Start a service with telemetry and backends, stop it cleanly", long_about = None)]
struct Cli {
    /// TOML configuration file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port, overriding config and PORT.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("service-orchestrator: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = cli.port {
        config.listener.port = port;
    }

    let bridge = match observability::init(&config.observability, config.telemetry.mode) {
        Ok(bridge) => bridge,
        Err(e) => {
            eprintln!("service-orchestrator: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        service = %config.telemetry.service_name,
        mode = %config.telemetry.mode,
        address = %config.listener.socket_address(),
        resources = config.resources.len(),
        "service-orchestrator starting"
    );

    let orchestrator = Orchestrator::new(config)
        .with_trigger(SignalTrigger)
        .with_trace_bridge(bridge);

    match orchestrator.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Service exited with error");
            ExitCode::FAILURE
        }
    }
}
