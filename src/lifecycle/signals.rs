//! External shutdown triggers.
//!
//! # Responsibilities
//! - Abstract "something asked us to stop" behind [`ShutdownTrigger`]
//! - Translate SIGINT/SIGTERM into a trigger
//! - Race any number of triggers and report which one fired
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that cannot be installed never fires; it does not abort startup

use async_trait::async_trait;
use futures_util::future::select_all;

use crate::lifecycle::shutdown::Shutdown;

/// An event source that can request the `Serving → ShuttingDown` transition.
#[async_trait]
pub trait ShutdownTrigger: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Resolve once shutdown has been requested.
    async fn wait(&self);
}

/// Fires on Ctrl+C, and on SIGTERM where available.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTrigger;

#[async_trait]
impl ShutdownTrigger for SignalTrigger {
    fn name(&self) -> &str {
        "signal"
    }

    async fn wait(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!(signal = "SIGINT", "Shutdown signal received"),
            _ = terminate => tracing::info!(signal = "SIGTERM", "Shutdown signal received"),
        }
    }
}

#[async_trait]
impl ShutdownTrigger for Shutdown {
    fn name(&self) -> &str {
        "manual"
    }

    async fn wait(&self) {
        self.triggered().await;
    }
}

/// Wait for the first trigger to fire and return its name.
///
/// With no triggers this never resolves.
pub async fn first_trigger(triggers: &[Box<dyn ShutdownTrigger>]) -> String {
    if triggers.is_empty() {
        std::future::pending::<()>().await;
    }
    let waits = triggers.iter().map(|t| {
        Box::pin(async move {
            t.wait().await;
            t.name().to_string()
        })
    });
    let (name, _, _) = select_all(waits).await;
    name
}
