//! Process-wide "busy" indicator with scoped acquisition.
//!
//! Every asynchronous operation holds a [`BusyGuard`] for its whole
//! lifetime. The indicator is a count, not a flag: overlapping operations
//! cannot clear each other, and a guard dropped on an error path or by a
//! panicking task still releases its share.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct BusyTracker {
    outstanding: Arc<watch::Sender<usize>>,
}

impl BusyTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            outstanding: Arc::new(tx),
        }
    }

    /// Mark one operation as running until the returned guard is dropped.
    #[must_use = "the tracker is released as soon as the guard is dropped"]
    pub fn acquire(&self, operation: &'static str) -> BusyGuard {
        self.outstanding.send_modify(|n| *n += 1);
        trace!(operation, outstanding = self.outstanding(), "busy acquired");
        BusyGuard {
            outstanding: Arc::clone(&self.outstanding),
            operation,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.outstanding() > 0
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Receiver for rendering a spinner; yields the outstanding count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.outstanding.subscribe()
    }

    /// Resolve once no operation holds a guard.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for BusyTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BusyGuard {
    outstanding: Arc<watch::Sender<usize>>,
    operation: &'static str,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
        trace!(operation = self.operation, "busy released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_guards_keep_tracker_busy() {
        let busy = BusyTracker::new();
        let first = busy.acquire("teachers");
        let second = busy.acquire("classes");
        assert_eq!(busy.outstanding(), 2);

        drop(first);
        assert!(busy.is_busy());
        drop(second);
        assert!(!busy.is_busy());
    }

    #[test]
    fn guard_released_on_error_path() {
        let busy = BusyTracker::new();
        let failing = || -> Result<(), String> {
            let _guard = busy.acquire("students");
            Err("connection refused".into())
        };
        assert!(failing().is_err());
        assert_eq!(busy.outstanding(), 0);
    }

    #[tokio::test]
    async fn guard_released_when_task_panics() {
        let busy = BusyTracker::new();
        let tracker = busy.clone();
        let handle = tokio::spawn(async move {
            let _guard = tracker.acquire("submit");
            panic!("boom");
        });
        assert!(handle.await.is_err());
        assert!(!busy.is_busy());
    }

    #[tokio::test]
    async fn wait_idle_resolves_after_last_release() {
        let busy = BusyTracker::new();
        let guard = busy.acquire("classes");
        let waiter = {
            let busy = busy.clone();
            tokio::spawn(async move { busy.wait_idle().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }
}
