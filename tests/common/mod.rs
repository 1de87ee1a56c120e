//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

use service_orchestrator::config::{ExportMode, ServiceConfig};
use service_orchestrator::http::Server;
use service_orchestrator::lifecycle::{LifecycleState, StateWatch};
use service_orchestrator::net::ListenerError;
use service_orchestrator::resources::{
    Connection, Connector, ResourceError, ResourceKind, ResourceSpec,
};

/// Config with stdout telemetry, no host sampling and short deadlines.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.telemetry.service_name = "orchestrator-test".into();
    config.telemetry.mode = ExportMode::Debug;
    config.telemetry.host_metrics = false;
    config.listener.bind_address = "127.0.0.1".into();
    config.shutdown.drain_timeout_secs = 1;
    config.shutdown.teardown_timeout_secs = 2;
    config
}

pub fn spec(name: &str, kind: ResourceKind) -> ResourceSpec {
    ResourceSpec::new(name, format!("{name}.internal:1"), kind)
}

/// Wait until the orchestrator reaches `target`.
pub async fn wait_for_state(watch: &mut StateWatch, target: LifecycleState) {
    tokio::time::timeout(Duration::from_secs(5), watch.wait_for(|s| *s == target))
        .await
        .expect("timed out waiting for lifecycle state")
        .expect("state channel closed");
}

/// Start a backend that accepts connections and holds them open.
pub async fn start_tcp_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 64];
                        while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Start a backend that answers every RESP `PING` with `+PONG`.
pub async fn start_resp_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 64];
                        loop {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => break,
                                Ok(_) => {
                                    if socket.write_all(b"+PONG\r\n").await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

#[derive(Default)]
struct Script {
    refuse: Mutex<HashSet<String>>,
    unhealthy: Mutex<HashSet<String>>,
    failing_close: Mutex<HashSet<String>>,
    ping_delay: Mutex<Option<Duration>>,
    connects: Mutex<Vec<String>>,
    closes: Mutex<Vec<String>>,
}

/// Connector whose connections succeed, fail or stall on demand.
#[derive(Clone, Default)]
pub struct MockConnector {
    script: Arc<Script>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `connect` fails for `name`.
    pub fn refuse(self, name: &str) -> Self {
        self.script.refuse.lock().unwrap().insert(name.to_string());
        self
    }

    /// `ping` fails for `name`.
    pub fn unhealthy(self, name: &str) -> Self {
        self.set_unhealthy(name);
        self
    }

    /// `close` fails for `name`.
    pub fn failing_close(self, name: &str) -> Self {
        self.script
            .failing_close
            .lock()
            .unwrap()
            .insert(name.to_string());
        self
    }

    pub fn set_unhealthy(&self, name: &str) {
        self.script.unhealthy.lock().unwrap().insert(name.to_string());
    }

    /// Every later `ping` sleeps for `delay` first.
    pub fn set_ping_delay(&self, delay: Duration) {
        *self.script.ping_delay.lock().unwrap() = Some(delay);
    }

    /// Names passed to `connect`, in order.
    pub fn connects(&self) -> Vec<String> {
        self.script.connects.lock().unwrap().clone()
    }

    /// Names whose connection was closed, in order.
    pub fn closes(&self) -> Vec<String> {
        self.script.closes.lock().unwrap().clone()
    }

    pub fn as_connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

struct MockConnection {
    name: String,
    script: Arc<Script>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn ping(&self) -> Result<(), ResourceError> {
        let delay = *self.script.ping_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.unhealthy.lock().unwrap().contains(&self.name) {
            return Err(ResourceError::Probe(format!("{} did not answer", self.name)));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ResourceError> {
        self.script.closes.lock().unwrap().push(self.name.clone());
        if self.script.failing_close.lock().unwrap().contains(&self.name) {
            return Err(ResourceError::Probe(format!("{} refused to close", self.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, spec: &ResourceSpec) -> Result<Box<dyn Connection>, ResourceError> {
        self.script.connects.lock().unwrap().push(spec.name.clone());
        if self.script.refuse.lock().unwrap().contains(&spec.name) {
            return Err(ResourceError::Probe(format!("{} refused", spec.name)));
        }
        Ok(Box::new(MockConnection {
            name: spec.name.clone(),
            script: self.script.clone(),
        }))
    }
}

/// Server that idles until drained.
pub struct IdleServer;

#[async_trait]
impl Server for IdleServer {
    async fn serve(self: Box<Self>, mut drain: watch::Receiver<bool>) -> Result<(), ListenerError> {
        let _ = drain.wait_for(|d| *d).await;
        Ok(())
    }
}

/// Server that fails after `after`.
pub struct FailingServer {
    pub after: Duration,
}

#[async_trait]
impl Server for FailingServer {
    async fn serve(self: Box<Self>, _drain: watch::Receiver<bool>) -> Result<(), ListenerError> {
        tokio::time::sleep(self.after).await;
        Err(ListenerError::Serve(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "accept loop died",
        )))
    }
}
