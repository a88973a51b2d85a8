//! Ctrl+C / SIGTERM handling for the ranking binary.
//!
//! The first signal cancels the run so workers stop at the next pair and
//! nothing is materialized. A second signal exits immediately.

use nearmatch_core::CancelToken;
use std::io;
use std::thread;
use tokio::signal;

/// Exit status used when a second signal forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

/// Starts a background thread that cancels `cancel` on the first signal.
pub fn install(cancel: CancelToken) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name(String::from("signal-watch"))
        .spawn(move || {
            runtime.block_on(async {
                shutdown_signal().await;
                tracing::warn!("cancelling run; interrupt again to exit immediately");
                cancel.cancel();
                shutdown_signal().await;
                tracing::error!("second interrupt, exiting without cleanup");
                std::process::exit(FORCED_EXIT_CODE);
            });
        })?;
    Ok(())
}

/// Resolves once Ctrl+C or SIGTERM arrives. A handler that cannot be
/// installed never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C");
        },
        _ = terminate => {
            tracing::info!("received terminate signal");
        },
    }
}
