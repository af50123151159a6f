//! Cooperative shutdown for the worker loop.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::QueueError;

/// Shutdown request shared between a worker loop and whoever stops it.
///
/// Requesting shutdown never interrupts a running handler; it stops the loop
/// before its next claim and cuts any idle or backoff wait short.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Create a new signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn request_shutdown(&self) {
        if !self.token.is_cancelled() {
            debug!("Shutdown requested");
        }
        self.token.cancel();
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Underlying token, for callers composing their own cancellation.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Sleep for `duration` unless shutdown arrives first.
    ///
    /// Returns `true` if the wait was cut short by shutdown.
    pub async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    /// Route SIGTERM and SIGINT into this signal.
    #[cfg(unix)]
    pub fn install_os_handlers(&self) -> Result<(), QueueError> {
        use tokio::signal::unix::{SignalKind, signal};

        for (kind, name) in [
            (SignalKind::terminate(), "SIGTERM"),
            (SignalKind::interrupt(), "SIGINT"),
        ] {
            let mut stream = signal(kind).map_err(|e| QueueError::SignalSetup(e.to_string()))?;
            let handler = self.clone();
            tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    info!("Received {}, finishing current job before exit", name);
                    handler.request_shutdown();
                }
            });
        }

        info!("OS signal handlers installed (SIGTERM, SIGINT)");
        Ok(())
    }

    /// Route Ctrl+C into this signal (non-Unix fallback).
    #[cfg(not(unix))]
    pub fn install_os_handlers(&self) -> Result<(), QueueError> {
        let handler = self.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received Ctrl+C, finishing current job before exit");
                handler.request_shutdown();
            }
        });

        info!("OS signal handlers installed (Ctrl+C only)");
        Ok(())
    }
}
