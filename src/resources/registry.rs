//! Ordered acquisition and aggregate release of resources.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::lifecycle::shutdown::{BoxError, ShutdownError, ShutdownOrder, ShutdownStack};
use crate::resources::connector::{Connector, ResourceError};
use crate::resources::handle::ResourceHandle;
use crate::resources::spec::{ResourceKind, ResourceSpec};

/// Step at which an acquisition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStage {
    Connect,
    Probe,
}

impl fmt::Display for AcquireStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireStage::Connect => f.write_str("connect"),
            AcquireStage::Probe => f.write_str("liveness probe"),
        }
    }
}

/// A single resource could not be acquired.
#[derive(Debug, thiserror::Error)]
#[error("failed to acquire {kind} resource `{name}` ({stage}): {source}")]
pub struct AcquireError {
    pub name: String,
    pub kind: ResourceKind,
    pub stage: AcquireStage,
    #[source]
    pub source: ResourceError,
}

/// `acquire_all` failed; everything acquired before the failure was released.
#[derive(Debug, thiserror::Error)]
#[error("{source}{}", .rollback.as_ref().map(|e| format!(" (rollback: {e})")).unwrap_or_default())]
pub struct RegistryError {
    #[source]
    pub source: AcquireError,
    /// Failures while releasing earlier resources, if any.
    pub rollback: Option<ShutdownError>,
}

/// Owner of every live [`ResourceHandle`].
pub struct ResourceRegistry {
    connector: Arc<dyn Connector>,
    handles: Vec<Arc<ResourceHandle>>,
    shutdown: ShutdownStack,
}

impl ResourceRegistry {
    /// Create an empty registry that opens connections through `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            handles: Vec::new(),
            shutdown: ShutdownStack::new("resources", ShutdownOrder::Lifo),
        }
    }

    /// Acquire every spec in order.
    ///
    /// On the first failure, resources acquired so far are closed in reverse
    /// order (bounded by `rollback_timeout`) before the error is returned.
    pub async fn acquire_all(
        connector: Arc<dyn Connector>,
        specs: &[ResourceSpec],
        rollback_timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new(connector);
        for spec in specs {
            if let Err(source) = registry.acquire(spec).await {
                tracing::error!(
                    resource = %spec.name,
                    acquired = registry.handles.len(),
                    error = %source,
                    "Resource acquisition failed, rolling back"
                );
                let rollback = registry
                    .close_all(Instant::now() + rollback_timeout)
                    .await
                    .err();
                return Err(RegistryError { source, rollback });
            }
        }
        tracing::info!(resources = registry.handles.len(), "All resources acquired");
        Ok(registry)
    }

    /// Open, probe and register one resource.
    ///
    /// A connection that fails its probe is closed again and no shutdown
    /// step is registered for it.
    pub async fn acquire(&mut self, spec: &ResourceSpec) -> Result<Arc<ResourceHandle>, AcquireError> {
        let fail = |stage, source| AcquireError {
            name: spec.name.clone(),
            kind: spec.kind,
            stage,
            source,
        };

        if self.get(&spec.name).is_some() {
            return Err(fail(
                AcquireStage::Connect,
                ResourceError::DuplicateName(spec.name.clone()),
            ));
        }

        let conn = self
            .connector
            .connect(spec)
            .await
            .map_err(|e| fail(AcquireStage::Connect, e))?;
        let handle = Arc::new(ResourceHandle::new(spec.clone(), conn));

        if let Err(e) = handle.ping().await {
            if let Err(close_err) = handle.close().await {
                tracing::warn!(resource = %spec.name, error = %close_err, "Failed to close unhealthy connection");
            }
            return Err(fail(AcquireStage::Probe, e));
        }

        let closing = handle.clone();
        self.shutdown.register(format!("resource:{}", spec.name), move |_| async move {
            closing.close().await.map_err(BoxError::from)
        });
        self.handles.push(handle.clone());

        tracing::info!(resource = %spec.name, kind = %spec.kind, "Resource acquired");
        Ok(handle)
    }

    /// Look up a handle by name.
    pub fn get(&self, name: &str) -> Option<Arc<ResourceHandle>> {
        self.handles.iter().find(|h| h.name() == name).cloned()
    }

    /// Handles in acquisition order.
    pub fn handles(&self) -> &[Arc<ResourceHandle>] {
        &self.handles
    }

    /// Shutdown steps not yet run.
    pub fn pending_shutdowns(&self) -> usize {
        self.shutdown.len()
    }

    /// Close every handle in reverse acquisition order, joining failures.
    ///
    /// Idempotent: later calls return `Ok(())`.
    pub async fn close_all(&self, deadline: Instant) -> Result<(), ShutdownError> {
        self.shutdown.run(deadline).await
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("handles", &self.handles)
            .field("shutdown", &self.shutdown)
            .finish()
    }
}
