//! Bookkeeping for live pagination sessions and graceful shutdown.
//!
//! Every `QueryUsers` call registers with the [`SessionTracker`] and holds a
//! [`SessionGuard`] for as long as its session task runs. Shutdown refuses new
//! sessions, waits for the live ones to drain, and then cancels the rest
//! through a shared [`CancellationToken`].

use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use userhub_core::Error;

pub struct SessionTracker {
    inflight: AtomicUsize,
    draining: AtomicBool,
    shutdown_token: CancellationToken,
    drain_timeout: Duration,
}

impl SessionTracker {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            inflight: AtomicUsize::new(0),
            draining: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
            drain_timeout,
        }
    }

    /// Registers a new session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has begun.
    pub fn begin(self: &Arc<Self>) -> Result<SessionGuard, Error> {
        if self.draining.load(Ordering::Acquire) || self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        self.inflight.fetch_add(1, Ordering::AcqRel);
        Ok(SessionGuard {
            tracker: Arc::clone(self),
        })
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Token that is cancelled once the drain period is over.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Gracefully stops all sessions.
    ///
    /// - Refuses new sessions.
    /// - Waits up to the drain timeout for live sessions to finish.
    /// - Cancels the shared [`CancellationToken`], which ends any session that
    ///   is still running with [`Error::ServiceShutdown`].
    pub async fn shutdown(&self) -> Result<(), Error> {
        // === Phase 0: Stop accepting new sessions ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new sessions");
        self.draining.store(true, Ordering::Release);

        // === Phase 1: Wait for in-flight sessions to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight sessions ({} active)", self.inflight());
        let drain_result = timeout(self.drain_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight sessions drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} sessions still active)",
                    self.inflight()
                );
            }
        }

        // === Phase 2: Cancel any remaining work ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining sessions via shutdown token");
        self.shutdown_token.cancel();

        Ok(())
    }
}

/// Keeps a session counted as in flight until dropped.
pub struct SessionGuard {
    tracker: Arc<SessionTracker>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.tracker.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}
