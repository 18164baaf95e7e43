//! Periodic autosave of the locked, dirty active document.

use std::sync::Arc;
use std::time::Duration;

use shotline_core::collaboration::AUTOSAVE_INTERVAL_SECS;
use tokio_util::sync::CancellationToken;

use crate::host::DocumentHost;
use crate::session::LockSession;

/// How often a dirty document is autosaved.
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(AUTOSAVE_INTERVAL_SECS);

/// Run the autosave loop until `cancel` is triggered.
pub async fn run(
    session: Arc<LockSession>,
    host: Arc<dyn DocumentHost>,
    cancel: CancellationToken,
) {
    run_every(AUTOSAVE_INTERVAL, session, host, cancel).await;
}

/// [`run`] with a custom period.
pub async fn run_every(
    period: Duration,
    session: Arc<LockSession>,
    host: Arc<dyn DocumentHost>,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = period.as_secs(), "Autosave started");

    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately; nothing is dirty yet.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Autosave stopping");
                break;
            }
            _ = interval.tick() => {
                let session = Arc::clone(&session);
                let host = Arc::clone(&host);
                let result =
                    tokio::task::spawn_blocking(move || session.autosave_if_dirty(host.as_ref()))
                        .await;
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "Autosave failed"),
                    Err(e) => tracing::error!(error = %e, "Autosave panicked"),
                }
            }
        }
    }
}
