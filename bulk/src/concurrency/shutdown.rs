//! Shutdown signalling for background workers.
//!
//! A single [`ShutdownTx`] fans out to any number of [`ShutdownRx`] clones. Once shutdown
//! is requested it stays requested, so receivers created afterwards observe it too.

use tokio::sync::watch;

/// Sending side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Requests shutdown of every worker holding a receiver.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiving side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Completes once shutdown has been requested.
    ///
    /// Also completes when the sender is dropped, which is treated as a shutdown request.
    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.0.wait_for(|shutdown| *shutdown).await;
    }
}

/// Creates a new shutdown channel in the running state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn receivers_observe_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        let late = tx.subscribe();
        assert!(!rx.is_shutdown());

        tx.shutdown();

        tokio::time::timeout(Duration::from_secs(1), rx.wait_for_shutdown())
            .await
            .unwrap();
        assert!(rx.is_shutdown());
        assert!(late.is_shutdown());
    }

    #[tokio::test]
    async fn dropped_sender_releases_waiters() {
        let (tx, mut rx) = create_shutdown_channel();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), rx.wait_for_shutdown())
            .await
            .unwrap();
    }
}
