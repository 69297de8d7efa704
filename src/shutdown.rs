use tokio::sync::watch;
use tracing::info;

/// Resolves on SIGTERM/SIGINT (ctrl-c elsewhere).
pub async fn wait_for_os_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
            _ = tokio::signal::ctrl_c() => {},
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}

/// Broadcasts `true` on `tx` once an OS signal arrives.
pub fn spawn_signal_listener(tx: watch::Sender<bool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = wait_for_os_signal().await {
            tracing::warn!(?err, "signal listener failed; shutting down");
        } else {
            info!("shutdown signal received");
        }
        let _ = tx.send(true);
    })
}

/// Resolves once shutdown was requested or every sender is gone.
pub async fn requested(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
