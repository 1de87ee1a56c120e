//! In-flight request tracking.
//!
//! # Responsibilities
//! - Count requests currently being handled
//! - Let the shutdown path wait for the count to reach zero
//! - Report what was left behind when a drain deadline expires

use std::sync::Arc;

use tokio::sync::watch;

/// Tracks in-flight requests for graceful shutdown.
///
/// Cloning shares the same counter.
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    count: Arc<watch::Sender<u64>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            count: Arc::new(tx),
        }
    }

    /// Record a new request. The returned guard decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.count.send_modify(|n| *n += 1);
        InFlightGuard {
            count: Arc::clone(&self.count),
        }
    }

    /// Requests currently in flight.
    pub fn active_count(&self) -> u64 {
        *self.count.borrow()
    }

    /// Wait until no request is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a request's lifetime.
#[derive(Debug)]
pub struct InFlightGuard {
    count: Arc<watch::Sender<u64>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn tracker_counts() {
        let tracker = InFlightTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        let guard2 = tracker.clone().track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);
        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_when_last_guard_drops() {
        let tracker = InFlightTracker::new();
        let guard = tracker.track();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish once idle")
            .unwrap();
    }
}
