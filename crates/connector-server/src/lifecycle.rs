//! Process lifetime management (C11): a per-request watchdog deadline,
//! and a drain-on-shutdown waiter that rejects new work once shutdown
//! has started and waits for in-flight work to finish (bounded by a
//! grace period).
//!
//! Grounded in the same mpsc-backed activity-counting idiom used to
//! track in-flight work during a graceful stop, generalized from a
//! single process-wide instance into an explicit, constructible value
//! so tests can create independent waiters.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("request exceeded its processing deadline")]
    DeadlineExceeded,
}

/// Runs `fut` to completion unless `timeout` elapses first, in which
/// case the future is dropped and a `DeadlineExceeded` error is
/// returned instead.
pub async fn with_watchdog<F: Future>(timeout: Duration, fut: F) -> Result<F::Output, WatchdogError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| WatchdogError::DeadlineExceeded)
}

/// Held for the duration of one in-flight request. While any `Activity`
/// handle is alive, `ShutdownWaiter::shutdown` cannot observe a drained
/// state.
#[derive(Clone)]
pub struct Activity {
    _tx: mpsc::Sender<()>,
}

/// Tracks in-flight request activity and coordinates a graceful stop.
pub struct ShutdownWaiter {
    active: Mutex<Option<mpsc::Sender<()>>>,
    drain_rx: Mutex<Option<mpsc::Receiver<()>>>,
    stopping_tx: watch::Sender<bool>,
    stopping_rx: watch::Receiver<bool>,
}

impl ShutdownWaiter {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel(1);
        let (stopping_tx, stopping_rx) = watch::channel(false);
        Arc::new(Self {
            active: Mutex::new(Some(tx)),
            drain_rx: Mutex::new(Some(rx)),
            stopping_tx,
            stopping_rx,
        })
    }

    /// Registers one unit of in-flight work. Returns `None` once
    /// shutdown has begun; callers should reject the request rather
    /// than starting new work.
    pub fn processing_starting(&self) -> Option<Activity> {
        self.active
            .lock()
            .as_ref()
            .map(|tx| Activity { _tx: tx.clone() })
    }

    pub fn is_stopping(&self) -> bool {
        *self.stopping_rx.borrow()
    }

    /// Signals shutdown, rejecting any further `processing_starting`
    /// calls, then waits up to `grace` for all outstanding `Activity`
    /// handles to drop. Returns `true` on a clean drain, `false` if
    /// `grace` elapsed with activity still outstanding.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.active.lock().take();
        let _ = self.stopping_tx.send(true);

        let mut rx = match self.drain_rx.lock().take() {
            Some(rx) => rx,
            None => return true,
        };
        tokio::time::timeout(grace, rx.recv()).await.is_ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn watchdog_passes_through_fast_futures() {
        let result = with_watchdog(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn watchdog_times_out_slow_futures() {
        tokio::time::pause();
        let fut = with_watchdog(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            1
        });
        tokio::time::advance(Duration::from_millis(11)).await;
        assert!(matches!(fut.await, Err(WatchdogError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn shutdown_drains_after_activity_completes() {
        let waiter = ShutdownWaiter::new();
        let activity = waiter.processing_starting().unwrap();
        let waiter2 = waiter.clone();
        let handle = tokio::spawn(async move { waiter2.shutdown(Duration::from_secs(5)).await });
        tokio::task::yield_now().await;
        drop(activity);
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn shutdown_times_out_with_activity_still_outstanding() {
        tokio::time::pause();
        let waiter = ShutdownWaiter::new();
        let _activity = waiter.processing_starting().unwrap();
        let result = waiter.shutdown(Duration::from_millis(10)).await;
        assert!(!result);
    }

    #[tokio::test]
    async fn new_work_rejected_after_shutdown_starts() {
        let waiter = ShutdownWaiter::new();
        assert!(waiter.processing_starting().is_some());
        let _ = tokio::time::timeout(Duration::from_millis(1), waiter.shutdown(Duration::from_millis(1))).await;
        assert!(waiter.is_stopping());
        assert!(waiter.processing_starting().is_none());
    }
}
