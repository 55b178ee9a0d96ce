use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{signal, time::timeout};
use tokio_util::sync::CancellationToken;

use crate::core::Gate;

/// Represents different shutdown reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Graceful shutdown requested (SIGTERM, SIGINT)
    Graceful,
    /// Triggered from code
    Manual,
    /// Force shutdown (drain timeout exceeded)
    Force,
}

/// Turns OS signals into cancellation of a root [`CancellationToken`].
///
/// Jobs submitted with a child of [`token`](GracefulShutdown::token) observe the
/// cancellation; [`drain`](GracefulShutdown::drain) then joins a gate within the
/// configured timeout.
#[derive(Clone)]
pub struct GracefulShutdown {
    token: CancellationToken,
    shutdown_initiated: Arc<AtomicBool>,
    shutdown_timeout: Duration,
}

impl GracefulShutdown {
    /// Create a new GracefulShutdown manager with default 30-second timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new GracefulShutdown manager with custom timeout
    pub fn with_timeout(shutdown_timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            shutdown_timeout,
        }
    }

    /// Root cancellation token; cancelled once shutdown is initiated.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Check if shutdown has been initiated
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Relaxed)
    }

    /// Manually trigger shutdown. Returns `false` if it was already initiated.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) -> bool {
        self.initiate_shutdown(reason)
    }

    /// Wait for SIGINT or SIGTERM, then cancel the root token.
    pub async fn run_signal_handler(&self) -> ShutdownReason {
        tracing::debug!("Signal handler started, listening for SIGTERM and SIGINT");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                self.initiate_shutdown(ShutdownReason::Graceful);
                ShutdownReason::Graceful
            }
            _ = wait_for_sigterm() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                self.initiate_shutdown(ShutdownReason::Graceful);
                ShutdownReason::Graceful
            }
            _ = self.token.cancelled() => ShutdownReason::Manual,
        }
    }

    fn initiate_shutdown(&self, reason: ShutdownReason) -> bool {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            tracing::info!("Processing shutdown: {:?}", reason);
            self.token.cancel();
            true
        } else {
            tracing::warn!("Shutdown already initiated, ignoring {:?}", reason);
            false
        }
    }

    /// Close `gate` and wait for it to drain, bounded by the shutdown timeout.
    ///
    /// Returns [`ShutdownReason::Force`] when the timeout elapsed first. Only the
    /// wait is abandoned at that point: the gate stays closed to new work and
    /// its error stream still closes once the remaining jobs finish.
    pub async fn drain(&self, gate: &Gate) -> ShutdownReason {
        match timeout(self.shutdown_timeout, gate.close_and_wait()).await {
            Ok(()) => ShutdownReason::Graceful,
            Err(_) => {
                tracing::error!(
                    gate = gate.label(),
                    in_use = gate.in_use(),
                    "Shutdown timeout exceeded ({:?}), giving up on drain",
                    self.shutdown_timeout
                );
                ShutdownReason::Force
            }
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    // On non-Unix systems, we only have Ctrl+C
    std::future::pending::<()>().await;
}
