//! Inactivity auto-release.
//!
//! Wakes on a fixed interval and releases the session's active document
//! once the user has been idle longer than the session timeout, saving
//! unsaved changes first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use shotline_core::collaboration::INACTIVITY_CHECK_INTERVAL_SECS;
use tokio_util::sync::CancellationToken;

use crate::host::DocumentHost;
use crate::session::LockSession;

/// How often the monitor checks for inactivity.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(INACTIVITY_CHECK_INTERVAL_SECS);

/// Run the inactivity monitor until `cancel` is triggered.
pub async fn run(
    session: Arc<LockSession>,
    host: Arc<dyn DocumentHost>,
    cancel: CancellationToken,
) {
    run_every(CHECK_INTERVAL, session, host, cancel).await;
}

/// [`run`] with a custom check period.
pub async fn run_every(
    period: Duration,
    session: Arc<LockSession>,
    host: Arc<dyn DocumentHost>,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = period.as_secs(),
        timeout_secs = session.timeout().as_secs(),
        user = %session.user(),
        "Inactivity monitor started"
    );

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Inactivity monitor stopping");
                break;
            }
            _ = interval.tick() => {
                let session = Arc::clone(&session);
                let host = Arc::clone(&host);
                // Lock-file I/O blocks on flock; keep it off the async workers.
                let check = tokio::task::spawn_blocking(move || {
                    session.release_if_inactive(host.as_ref(), Instant::now())
                })
                .await;
                match check {
                    Ok(Ok(Some(path))) => {
                        tracing::debug!(path = %path.display(), "Inactivity monitor released lock");
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Inactivity check failed"),
                    Err(e) => tracing::error!(error = %e, "Inactivity check panicked"),
                }
            }
        }
    }
}
