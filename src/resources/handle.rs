//! Live handle to one backend.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::resources::connector::{Connection, ResourceError};
use crate::resources::spec::{ResourceKind, ResourceSpec};

/// A named, open connection owned by the registry.
///
/// Request handlers receive handles through `Arc` and may ping them
/// concurrently; only the registry closes them.
pub struct ResourceHandle {
    spec: ResourceSpec,
    conn: Box<dyn Connection>,
    open: AtomicBool,
}

impl ResourceHandle {
    pub(crate) fn new(spec: ResourceSpec, conn: Box<dyn Connection>) -> Self {
        Self {
            spec,
            conn,
            open: AtomicBool::new(true),
        }
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Run the liveness probe.
    pub async fn ping(&self) -> Result<(), ResourceError> {
        if !self.is_open() {
            return Err(ResourceError::Closed);
        }
        self.conn.ping().await
    }

    /// Close the connection. Closing twice is a no-op.
    pub(crate) async fn close(&self) -> Result<(), ResourceError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(resource = %self.spec.name, kind = %self.spec.kind, "Closing resource");
        self.conn.close().await
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("name", &self.spec.name)
            .field("kind", &self.spec.kind)
            .field("open", &self.is_open())
            .finish()
    }
}
