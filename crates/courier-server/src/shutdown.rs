//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Cancelling the token stops the listener from accepting and tells every
//! live `WebSocket` session to leave its read loop, which runs the normal
//! close path (unregister, counters, logs).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often [`ShutdownCoordinator::wait_for_idle`] re-checks the counter.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Coordinates shutdown across the listener and connection tasks.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with an uncancelled token.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and wait up to `timeout` for `handles` to finish.
    ///
    /// Returns `false` if the timeout elapsed first; stragglers are aborted.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "waiting for tasks to complete"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let drain = futures::future::join_all(handles);

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(?timeout, "shutdown timed out, aborting remaining tasks");
            for abort in aborts {
                abort.abort();
            }
            return false;
        }
        true
    }

    /// Wait until `live` drops to zero or `timeout` elapses.
    ///
    /// Returns whether the counter reached zero.
    pub async fn wait_for_idle(&self, live: &AtomicUsize, timeout: Duration) -> bool {
        let idle = async {
            while live.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(IDLE_POLL).await;
            }
        };
        if tokio::time::timeout(timeout, idle).await.is_err() {
            warn!(
                remaining = live.load(Ordering::SeqCst),
                "connections still open after shutdown timeout"
            );
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::default();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn shutdown_is_idempotent_and_reaches_every_token() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_awaits_cooperative_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });

        assert!(coord.graceful_shutdown(vec![handle], Duration::from_secs(5)).await);
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn graceful_shutdown_times_out_and_aborts() {
        let coord = ShutdownCoordinator::new();
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let abort = handle.abort_handle();

        let drained = coord
            .graceful_shutdown(vec![handle], Duration::from_millis(50))
            .await;
        assert!(!drained);

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(abort.is_finished());
    }

    #[tokio::test]
    async fn wait_for_idle_returns_once_counter_hits_zero() {
        let coord = ShutdownCoordinator::new();
        let live = Arc::new(AtomicUsize::new(2));
        let worker = live.clone();
        let _ = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = worker.fetch_sub(2, Ordering::SeqCst);
        });

        assert!(coord.wait_for_idle(&live, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn wait_for_idle_times_out() {
        let coord = ShutdownCoordinator::new();
        let live = AtomicUsize::new(1);
        assert!(!coord.wait_for_idle(&live, Duration::from_millis(30)).await);
    }
}
