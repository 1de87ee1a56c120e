//! Connection contract and the built-in TCP connector.
//!
//! # Responsibilities
//! - Define the open/ping/close contract every backend client satisfies
//! - Provide a driver-free connector that reaches the backend over TCP
//!
//! # Design Decisions
//! - Vendor drivers plug in by implementing [`Connector`]; nothing else changes
//! - Cache backends are probed with RESP `PING` over the held connection
//! - Other kinds are probed with a fresh TCP round trip to the same endpoint
//! - Every network step has its own timeout

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::resources::spec::{ResourceKind, ResourceSpec, Target};

/// Errors raised by a connection or connector.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("liveness probe failed: {0}")]
    Probe(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection is closed")]
    Closed,

    #[error("resource `{0}` is already registered")]
    DuplicateName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A live client for one backend.
///
/// Implementations must be safe for concurrent `ping` calls and must
/// tolerate `close` being called on an already-closed connection.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Lightweight round trip proving the connection is usable.
    async fn ping(&self) -> Result<(), ResourceError>;

    /// Release the underlying connection.
    async fn close(&self) -> Result<(), ResourceError>;
}

/// Opens connections for resource specs.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, spec: &ResourceSpec) -> Result<Box<dyn Connection>, ResourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// RESP `PING` on the held stream.
    Resp,
    /// Fresh TCP connect to the same endpoint.
    Dial,
}

impl From<ResourceKind> for Probe {
    fn from(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Cache => Probe::Resp,
            _ => Probe::Dial,
        }
    }
}

/// Driver-free connector that holds one TCP stream per resource.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    probe_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            probe_timeout,
        }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(2))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, spec: &ResourceSpec) -> Result<Box<dyn Connection>, ResourceError> {
        let target = spec.target()?;
        let stream = dial(&target, self.connect_timeout).await?;
        tracing::debug!(
            resource = %spec.name,
            kind = %spec.kind,
            target = %target,
            "TCP connection established"
        );
        Ok(Box::new(TcpConnection {
            target,
            probe: Probe::from(spec.kind),
            probe_timeout: self.probe_timeout,
            stream: Mutex::new(Some(stream)),
        }))
    }
}

async fn dial(target: &Target, timeout: Duration) -> Result<TcpStream, ResourceError> {
    let addr = (target.host.as_str(), target.port);
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ResourceError::Connect {
            target: target.to_string(),
            source,
        }),
        Err(_) => Err(ResourceError::Timeout(timeout)),
    }
}

/// A connection held open by [`TcpConnector`].
#[derive(Debug)]
pub struct TcpConnection {
    target: Target,
    probe: Probe,
    probe_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

const RESP_PING: &[u8] = b"*1\r\n$4\r\nPING\r\n";

impl TcpConnection {
    async fn resp_ping(&self) -> Result<(), ResourceError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(ResourceError::Closed)?;
        stream.write_all(RESP_PING).await?;

        let mut reply = Vec::with_capacity(16);
        let mut buf = [0u8; 64];
        while !reply.windows(2).any(|w| w == b"\r\n") {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(ResourceError::Probe("connection closed by peer".into()));
            }
            reply.extend_from_slice(&buf[..n]);
        }

        if reply.starts_with(b"+PONG") {
            Ok(())
        } else {
            Err(ResourceError::Probe(format!(
                "unexpected reply {:?}",
                String::from_utf8_lossy(&reply).trim_end()
            )))
        }
    }

    async fn dial_ping(&self) -> Result<(), ResourceError> {
        if self.stream.lock().await.is_none() {
            return Err(ResourceError::Closed);
        }
        let probe = dial(&self.target, self.probe_timeout).await?;
        drop(probe);
        Ok(())
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn ping(&self) -> Result<(), ResourceError> {
        let probe = async {
            match self.probe {
                Probe::Resp => self.resp_ping().await,
                Probe::Dial => self.dial_ping().await,
            }
        };
        tokio::time::timeout(self.probe_timeout, probe)
            .await
            .map_err(|_| ResourceError::Timeout(self.probe_timeout))?
    }

    async fn close(&self) -> Result<(), ResourceError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        match stream.shutdown().await {
            Ok(()) => Ok(()),
            // Peer already went away; the socket is released either way.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
