//! Process Lifecycle Helpers
//!
//! `.env` loading and signal handling shared by the binaries.

use std::path::PathBuf;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Time allowed for subscribers and servers to wind down.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a `.env` file from the current directory or the nearest ancestor.
///
/// Returns the file that was loaded, if any.
pub fn load_dotenv() -> Option<PathBuf> {
    if let Ok(path) = dotenvy::dotenv() {
        return Some(path);
    }

    let cwd = std::env::current_dir().ok()?;
    let path = cwd
        .ancestors()
        .skip(1)
        .map(|dir| dir.join(".env"))
        .find(|candidate| candidate.is_file())?;
    dotenvy::from_path(&path).ok()?;
    Some(path)
}

/// Wait for SIGTERM or SIGINT, then cancel `shutdown_token`.
///
/// Returns early without cancelling if the token is cancelled elsewhere.
pub async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
