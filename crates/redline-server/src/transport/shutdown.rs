//! OS termination signals.

use redline_core::error::{RedlineError, Result};

/// Resolves on SIGINT or SIGTERM (Ctrl+C off Unix). Errors if the handlers
/// cannot be installed.
pub async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| RedlineError::Internal(format!("install SIGTERM handler: {e}")))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| RedlineError::Internal(format!("install SIGINT handler: {e}")))?;

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| RedlineError::Internal(format!("wait for Ctrl+C: {e}")))?;
        tracing::info!("received Ctrl+C");
    }

    Ok(())
}
