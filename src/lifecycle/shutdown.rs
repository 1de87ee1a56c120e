//! Shutdown coordination.
//!
//! # Responsibilities
//! - Hold the ordered list of cleanup steps registered during startup
//! - Drain that list exactly once, each step bounded by a deadline
//! - Join every step failure into one [`ShutdownError`]
//! - Provide a manual trigger ([`Shutdown`]) for tests and admin paths
//!
//! # Design Decisions
//! - Registration takes `&mut self`: steps are only added while startup is single-threaded
//! - Draining takes `&self`: of two racing callers only one runs the list, the other
//!   returns once it has finished
//! - A failing or timed-out step never prevents the next one from running

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;

/// Boxed error produced by an individual cleanup step.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Future returned by a registered cleanup step.
pub type ShutdownFuture = BoxFuture<'static, Result<(), BoxError>>;

type ShutdownFn = Box<dyn FnOnce(Instant) -> ShutdownFuture + Send>;

/// Returned for a step that did not finish before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline exceeded")]
pub struct DeadlineExceeded;

/// One failed cleanup step.
#[derive(Debug)]
pub struct StepFailure {
    /// Name the step was registered under.
    pub step: String,
    /// Why it failed.
    pub source: BoxError,
}

/// Aggregate of zero or more independent cleanup failures.
///
/// An empty `ShutdownError` is never returned as an error: use
/// [`ShutdownError::into_result`] to collapse it.
#[derive(Debug, Default)]
pub struct ShutdownError {
    failures: Vec<StepFailure>,
}

impl ShutdownError {
    /// Create an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `step`.
    pub fn push(&mut self, step: impl Into<String>, source: impl Into<BoxError>) {
        self.failures.push(StepFailure {
            step: step.into(),
            source: source.into(),
        });
    }

    /// Fold another step's outcome into this aggregate.
    pub fn absorb(&mut self, outcome: Result<(), ShutdownError>) {
        if let Err(other) = outcome {
            self.failures.extend(other.failures);
        }
    }

    /// Failed steps in the order they ran.
    pub fn failures(&self) -> &[StepFailure] {
        &self.failures
    }

    /// Names of the failed steps.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.step.as_str())
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// `Ok(())` when nothing failed, `Err(self)` otherwise.
    pub fn into_result(self) -> Result<(), ShutdownError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failures.as_slice() {
            [] => write!(f, "no shutdown step failed"),
            [only] => write!(f, "shutdown step `{}` failed: {}", only.step, only.source),
            many => {
                write!(f, "{} shutdown steps failed: ", many.len())?;
                for (i, failure) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "`{}`: {}", failure.step, failure.source)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ShutdownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| f.source.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Order in which registered steps are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOrder {
    /// Registration order.
    Fifo,
    /// Reverse registration order (last acquired, first released).
    Lifo,
}

struct ShutdownStep {
    name: String,
    func: ShutdownFn,
}

/// Ordered list of cleanup steps, drained exactly once.
pub struct ShutdownStack {
    label: &'static str,
    order: ShutdownOrder,
    steps: Mutex<Vec<ShutdownStep>>,
    /// Held for the whole of a drain.
    running: tokio::sync::Mutex<()>,
}

impl ShutdownStack {
    /// Create an empty stack. `label` prefixes log lines.
    pub fn new(label: &'static str, order: ShutdownOrder) -> Self {
        Self {
            label,
            order,
            steps: Mutex::new(Vec::new()),
            running: tokio::sync::Mutex::new(()),
        }
    }

    /// Register a cleanup step. It receives the deadline it runs under.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, func: F)
    where
        F: FnOnce(Instant) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let name = name.into();
        tracing::trace!(stack = self.label, step = %name, "Shutdown step registered");
        self.steps
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ShutdownStep {
                name,
                func: Box::new(move |deadline| func(deadline).boxed()),
            });
    }

    /// Number of steps still pending.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Names of pending steps in registration order.
    pub fn step_names(&self) -> Vec<String> {
        self.lock().iter().map(|s| s.name.clone()).collect()
    }

    /// Run every pending step once, joining their failures.
    ///
    /// A later call finds the list empty and returns `Ok(())`. A concurrent
    /// caller waits, up to its own deadline, for the running drain to finish.
    pub async fn run(&self, deadline: Instant) -> Result<(), ShutdownError> {
        let Ok(_running) = tokio::time::timeout_at(deadline, self.running.lock()).await else {
            tracing::warn!(stack = self.label, "Deadline exceeded waiting for running shutdown");
            let mut errors = ShutdownError::new();
            errors.push(self.label, DeadlineExceeded);
            return Err(errors);
        };
        let mut steps = std::mem::take(&mut *self.lock());
        if steps.is_empty() {
            return Ok(());
        }
        if self.order == ShutdownOrder::Lifo {
            steps.reverse();
        }

        tracing::debug!(stack = self.label, steps = steps.len(), "Running shutdown steps");

        let mut errors = ShutdownError::new();
        for step in steps {
            match tokio::time::timeout_at(deadline, (step.func)(deadline)).await {
                Ok(Ok(())) => {
                    tracing::debug!(stack = self.label, step = %step.name, "Shutdown step complete");
                }
                Ok(Err(e)) => {
                    tracing::warn!(stack = self.label, step = %step.name, error = %e, "Shutdown step failed");
                    errors.push(step.name, e);
                }
                Err(_) => {
                    tracing::warn!(stack = self.label, step = %step.name, "Shutdown step exceeded deadline");
                    errors.push(step.name, DeadlineExceeded);
                }
            }
        }
        errors.into_result()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ShutdownStep>> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ShutdownStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownStack")
            .field("label", &self.label)
            .field("order", &self.order)
            .field("steps", &self.step_names())
            .finish()
    }
}

/// Manual shutdown trigger.
///
/// Cloning shares the same trigger; firing it once releases every waiter,
/// including ones that subscribe afterwards.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    /// Create a new, untriggered shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the shutdown flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`trigger`](Self::trigger) has been called.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the trigger fires.
    pub async fn triggered(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Get the number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
