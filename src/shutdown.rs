//! Coordinated graceful shutdown: one `CancellationToken` handed to every
//! long-running loop (the HTTP listener, the media cleanup scheduler, the
//! transcode worker), plus a broadcast channel components can subscribe to
//! if they need to react to the phase change itself rather than just the
//! token.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Coordinates shutdown across the HTTP listener and background loops.
pub struct ShutdownController {
    cancel_token: CancellationToken,
    phase_tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Arc<Self> {
        let (phase_tx, _) = broadcast::channel(8);
        Arc::new(Self {
            cancel_token: CancellationToken::new(),
            phase_tx,
        })
    }

    /// A child token for a component to select against. Cancelling it does
    /// not cancel the parent.
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Subscribe to the shutdown signal without holding a `CancellationToken`.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.phase_tx.subscribe()
    }

    /// Cancel every outstanding token and notify subscribers. Idempotent.
    pub fn shutdown(&self) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        info!("shutdown requested, cancelling background work");
        self.cancel_token.cancel();
        let _ = self.phase_tx.send(());
    }
}

/// Waits for Ctrl+C or SIGTERM, then trips the controller. Passed directly
/// to `axum::serve(..).with_graceful_shutdown(..)`.
pub async fn shutdown_signal(controller: Arc<ShutdownController>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }

    controller.shutdown();
}
