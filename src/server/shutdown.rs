/// Graceful shutdown handling for the gateway servers
use std::time::Duration;

use futures::future::join_all;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shutdown signal broadcaster
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Subscribe to shutdown notifications
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Trigger shutdown
    pub fn shutdown(&self) {
        let _ = self.sender.send(());
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

/// Wait for server tasks to finish, giving up after `timeout`.
///
/// Returns `true` if every task finished in time.
pub async fn drain_with_timeout(handles: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
    info!(
        "Waiting up to {:?} for {} server(s) to shut down gracefully",
        timeout,
        handles.len()
    );

    match tokio::time::timeout(timeout, join_all(handles)).await {
        Ok(_) => {
            info!("Shutdown complete");
            true
        }
        Err(_) => {
            warn!("Servers did not shut down within {:?}", timeout);
            false
        }
    }
}

/// Create a shutdown receiver that completes when shutdown is triggered
pub async fn shutdown_receiver(mut rx: broadcast::Receiver<()>) {
    let _ = rx.recv().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal() {
        let signal = ShutdownSignal::new();
        let mut rx = signal.subscribe();

        signal.shutdown();

        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let signal = ShutdownSignal::new();
        let mut rx1 = signal.subscribe();
        let mut rx2 = signal.subscribe();

        signal.shutdown();

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_drain_waits_for_servers() {
        let signal = ShutdownSignal::new();
        let rx = signal.subscribe();
        let handle = tokio::spawn(shutdown_receiver(rx));

        signal.shutdown();

        assert!(drain_with_timeout(vec![handle], Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_drain_gives_up() {
        let handle = tokio::spawn(std::future::pending::<()>());
        assert!(!drain_with_timeout(vec![handle], Duration::from_millis(50)).await);
    }
}
