//! Installs interrupt/terminate handlers that trigger a graceful
//! supervisor shutdown (`SPEC_FULL.md` §5: "the supervisor installs
//! handlers for interrupt and terminate … that trigger `Supervisor::stop()`").

// Layer 2: Third-party crate imports
use tracing::info;
use visor_core::Supervisor;

/// Wait for either Ctrl-C or, on Unix, `SIGTERM`, then call
/// `supervisor.stop()` and return. Intended to be raced against the rest
/// of the program's lifetime in the caller's `select!`.
pub async fn wait_for_shutdown(supervisor: &Supervisor) {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                    _ = term.recv() => info!("received SIGTERM"),
                }
            }
            Err(err) => {
                tracing::error!(%err, "failed to install SIGTERM handler, watching SIGINT only");
                let _ = tokio::signal::ctrl_c().await;
                info!("received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl-C");
    }

    info!("shutting down supervisor");
    if let Err(err) = supervisor.stop().await {
        tracing::error!(%err, "error while stopping supervisor");
    }
}
