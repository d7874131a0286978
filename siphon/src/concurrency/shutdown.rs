use std::future;

use tokio::sync::watch;

/// Receiving side of a shutdown channel.
pub type ShutdownRx = watch::Receiver<()>;

/// Sending side of a shutdown channel.
///
/// Cloning it is cheap, every clone triggers the same receivers.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Notifies every receiver that shutdown was requested.
    ///
    /// Receivers subscribed later do not observe a request sent before they subscribed.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}

/// Resolves once shutdown is requested on `shutdown_rx`.
///
/// Never resolves when every sender is gone, since no request can arrive anymore.
pub async fn wait_for_shutdown(shutdown_rx: &mut ShutdownRx) {
    if shutdown_rx.changed().await.is_err() {
        future::pending::<()>().await;
    }
}

/// Returns `true` when a shutdown request arrived and was not yet observed.
pub fn is_shutdown_requested(shutdown_rx: &ShutdownRx) -> bool {
    shutdown_rx.has_changed().unwrap_or(false)
}
