//! Background monitors of a lock session.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned via `tokio::spawn`. All tasks accept a [`CancellationToken`]
//! for graceful shutdown. [`Monitors`] spawns both and stops them together.

pub mod autosave;
pub mod inactivity;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::host::DocumentHost;
use crate::session::LockSession;

/// Running inactivity and autosave monitors of one session.
pub struct Monitors {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Monitors {
    /// Spawn both monitors on the current tokio runtime.
    pub fn spawn(session: Arc<LockSession>, host: Arc<dyn DocumentHost>) -> Self {
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(inactivity::run(
            Arc::clone(&session),
            Arc::clone(&host),
            cancel.child_token(),
        ));
        tracker.spawn(autosave::run(session, host, cancel.child_token()));
        tracker.close();
        Self { cancel, tracker }
    }

    /// Cancel both monitors and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.tracker.wait().await;
    }
}
