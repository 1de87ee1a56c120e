//! TCP listener setup.
//!
//! # Responsibilities
//! - Bind to the configured address, or adopt a listener bound elsewhere
//! - Classify listener failures (bind, serve, unexpected exit)
//!
//! # Design Decisions
//! - Binding happens on the server task, so a bind failure surfaces through
//!   the same path as any other terminal listener error

use std::io;
use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The serve loop failed.
    #[error("listener failed: {0}")]
    Serve(#[source] io::Error),

    /// The serve loop returned without being asked to drain.
    #[error("listener closed unexpectedly")]
    Closed,

    /// The server task panicked or was cancelled.
    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Where the server gets its socket from.
#[derive(Debug)]
pub enum ListenerSource {
    /// Bind this `host:port` when serving starts.
    Address(String),
    /// Use an already-bound listener.
    Bound(TcpListener),
}

impl ListenerSource {
    /// Resolve to a bound listener.
    pub async fn into_listener(self) -> Result<TcpListener, ListenerError> {
        let listener = match self {
            ListenerSource::Address(address) => TcpListener::bind(&address)
                .await
                .map_err(|source| ListenerError::Bind { address, source })?,
            ListenerSource::Bound(listener) => listener,
        };

        let local_addr = local_addr(&listener)?;
        tracing::info!(address = %local_addr, "Listener bound");
        Ok(listener)
    }
}

fn local_addr(listener: &TcpListener) -> Result<SocketAddr, ListenerError> {
    listener.local_addr().map_err(ListenerError::Serve)
}
