//! Shutdown coordination for the replica.

use tokio::sync::broadcast;

use super::signals::wait_for_termination;

/// Coordinator for graceful shutdown.
///
/// The HTTP server and any other long-running task subscribe; one trigger
/// reaches all of them. Triggering more than once is harmless.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for SIGTERM/SIGINT, then notify every subscriber.
    pub async fn trigger_on_signal(&self) {
        wait_for_termination().await;
        self.trigger();
    }

    /// Subscribers still holding a receiver.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
