//! Per-project lock session: the host lifecycle hooks around [`LockStore`].
//!
//! One [`LockSession`] exists per opened project. It remembers the active
//! document and the last user activity, locks documents as they are opened,
//! refreshes locks on save, and releases them on switch, close, or
//! inactivity. Background monitors share it through an `Arc`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use shotline_core::collaboration::{
    normalize_path, LockOutcome, LockRecord, LockStore, DEFAULT_INACTIVITY_TIMEOUT_SECS,
};
use shotline_core::error::CoreError;
use shotline_events::{EventKind, Notifier, PipelineEvent};

use crate::error::PipelineResult;
use crate::host::DocumentHost;

/// What happened to the lock when a document was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The document was unlocked and is now ours.
    Locked,
    /// We already held it.
    AlreadyOurs,
    /// Someone else holds it. The document is open but not locked by us.
    ReadOnly { owner: String },
}

#[derive(Debug)]
struct SessionState {
    current: Option<PathBuf>,
    last_activity: Instant,
}

/// Lock lifecycle of one user in one project.
pub struct LockSession {
    store: LockStore,
    user: String,
    project: String,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    state: Mutex<SessionState>,
}

impl LockSession {
    pub fn new(
        store: LockStore,
        user: impl Into<String>,
        project: impl Into<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            user: user.into(),
            project: project.into(),
            notifier,
            timeout: Duration::from_secs(DEFAULT_INACTIVITY_TIMEOUT_SECS),
            state: Mutex::new(SessionState {
                current: None,
                last_activity: Instant::now(),
            }),
        }
    }

    /// Override the inactivity timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn store(&self) -> &LockStore {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The document the user currently has open.
    pub fn current_document(&self) -> Option<PathBuf> {
        self.state().current.clone()
    }

    // A poisoned mutex only means a panicking thread held it; the state is
    // two plain fields and stays usable.
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn event(&self, kind: EventKind, path: &Path) -> PipelineEvent {
        PipelineEvent::new(kind)
            .with_file(path)
            .with_user(&self.user)
            .with_project(&self.project)
    }

    /// Whether `path` is locked by this session's user.
    pub fn owns(&self, path: &Path) -> bool {
        self.store
            .get(path)
            .is_some_and(|record| record.user == self.user)
    }

    /// Note that the user did something.
    pub fn record_activity(&self) {
        self.state().last_activity = Instant::now();
    }

    /// Time since the last recorded activity, measured at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state().last_activity)
    }

    // -----------------------------------------------------------------------
    // Explicit lock operations
    // -----------------------------------------------------------------------

    /// Lock `path` for the session user.
    pub fn lock(&self, path: &Path, note: &str) -> PipelineResult<LockOutcome> {
        self.record_activity();
        let outcome = self.store.lock(path, &self.user, note)?;
        if outcome == LockOutcome::Acquired {
            let mut event = self.event(EventKind::FileLocked, path);
            if !note.is_empty() {
                event = event.with_note(note);
            }
            self.notifier.notify(event);
        }
        Ok(outcome)
    }

    /// Release `path` if the session user holds it.
    pub fn unlock(&self, path: &Path) -> PipelineResult<bool> {
        self.record_activity();
        let released = self.store.unlock(path, &self.user)?;
        if released {
            self.notifier.notify(self.event(EventKind::FileUnlocked, path));
        }
        Ok(released)
    }

    /// Replace the note on a lock held by the session user.
    pub fn update_note(&self, path: &Path, note: &str) -> PipelineResult<bool> {
        self.record_activity();
        let updated = self.store.update_note(path, &self.user, note)?;
        if updated {
            self.notifier
                .notify(self.event(EventKind::NoteAdded, path).with_note(note));
        }
        Ok(updated)
    }

    /// Administrative override. Removes whatever lock `path` carries.
    pub fn force_unlock(&self, path: &Path) -> PipelineResult<Option<LockRecord>> {
        let removed = self.store.force_unlock(path, &self.user)?;
        if let Some(record) = &removed {
            self.notifier.notify(
                self.event(EventKind::FileUnlocked, path)
                    .with_payload(serde_json::json!({
                        "forced": true,
                        "previous_owner": record.user,
                    })),
            );
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Host lifecycle hooks
    // -----------------------------------------------------------------------

    /// Host hook: a document was opened.
    ///
    /// Releases the previously active document if it differs, then tries to
    /// lock the new one. A document held by another user still opens, just
    /// without the lock.
    pub fn on_document_opened(&self, path: &Path) -> PipelineResult<OpenOutcome> {
        self.record_activity();
        let previous = self.state().current.replace(path.to_path_buf());
        let key = normalize_path(path);
        if let Some(previous) = previous.filter(|p| normalize_path(p) != key) {
            self.unlock(&previous)?;
        }
        self.notifier.notify(self.event(EventKind::FileOpened, path));

        let outcome = match self.lock(path, "")? {
            LockOutcome::Acquired => OpenOutcome::Locked,
            LockOutcome::Refreshed => OpenOutcome::AlreadyOurs,
            LockOutcome::HeldBy(record) => {
                tracing::warn!(
                    path = %path.display(),
                    owner = %record.user,
                    user = %self.user,
                    "Opened a document locked by another user"
                );
                OpenOutcome::ReadOnly { owner: record.user }
            }
        };
        Ok(outcome)
    }

    /// Host hook: `path` is about to be saved. Refreshes our lock, or
    /// acquires it when the document is unlocked.
    pub fn on_pre_save(&self, path: &Path) -> PipelineResult<LockOutcome> {
        let outcome = self.lock(path, "")?;
        if let LockOutcome::HeldBy(record) = &outcome {
            tracing::warn!(
                path = %path.display(),
                owner = %record.user,
                user = %self.user,
                "Saving a document locked by another user"
            );
        }
        Ok(outcome)
    }

    /// Host hook: `path` was saved.
    pub fn on_saved(&self, path: &Path) -> PipelineResult<()> {
        self.record_activity();
        self.store.touch(path, &self.user)?;
        self.notifier.notify(self.event(EventKind::FileSaved, path));
        Ok(())
    }

    /// Release the active document and forget it.
    pub fn close(&self) -> PipelineResult<()> {
        let current = self.state().current.take();
        if let Some(path) = current {
            self.unlock(&path)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Monitors
    // -----------------------------------------------------------------------

    /// The active document, if it is locked by us.
    fn owned_current(&self) -> Option<PathBuf> {
        self.current_document().filter(|path| self.owns(path))
    }

    /// Save through the host, logging instead of failing.
    fn save_quietly(&self, host: &dyn DocumentHost, path: &Path) -> bool {
        match host.save(path) {
            Ok(()) => {
                if let Err(e) = self.store.touch(path, &self.user) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Lock refresh after save failed"
                    );
                }
                self.notifier.notify(self.event(EventKind::FileSaved, path));
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Saving document failed");
                false
            }
        }
    }

    /// Release the active document when the user has been idle longer than
    /// the timeout. Unsaved changes are saved first; a failed save does
    /// not keep the lock.
    ///
    /// Returns the released path.
    pub fn release_if_inactive(
        &self,
        host: &dyn DocumentHost,
        now: Instant,
    ) -> PipelineResult<Option<PathBuf>> {
        if self.idle_for(now) <= self.timeout {
            return Ok(None);
        }
        let Some(path) = self.owned_current() else {
            return Ok(None);
        };

        if host.is_dirty(&path) {
            self.save_quietly(host, &path);
        }
        let released = self.store.unlock(&path, &self.user)?;
        if !released {
            return Ok(None);
        }
        tracing::info!(
            path = %path.display(),
            user = %self.user,
            idle_secs = self.idle_for(now).as_secs(),
            "Released lock after inactivity"
        );
        self.notifier.notify(
            self.event(EventKind::FileUnlocked, &path)
                .with_payload(serde_json::json!({ "reason": "inactivity" })),
        );
        Ok(Some(path))
    }

    /// Save the active document if it is locked by us and dirty.
    ///
    /// Returns whether a save happened.
    pub fn autosave_if_dirty(&self, host: &dyn DocumentHost) -> PipelineResult<bool> {
        let Some(path) = self.owned_current() else {
            return Ok(false);
        };
        if !host.is_dirty(&path) {
            return Ok(false);
        }
        let saved = self.save_quietly(host, &path);
        if saved {
            tracing::debug!(path = %path.display(), "Autosaved document");
        }
        Ok(saved)
    }
}

impl std::fmt::Debug for LockSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockSession")
            .field("store", &self.store)
            .field("user", &self.user)
            .field("project", &self.project)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Lock failure as a typed error, for workflows that must not proceed.
pub(crate) fn held_by(path: &Path, record: LockRecord) -> CoreError {
    CoreError::LockHeld {
        path: path.to_path_buf(),
        owner: record.user,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use shotline_events::NullNotifier;

    use super::*;
    use crate::error::PipelineError;

    struct DirtyHost {
        saves: AtomicUsize,
        fail: bool,
    }

    impl DocumentHost for DirtyHost {
        fn is_dirty(&self, _path: &Path) -> bool {
            true
        }
        fn save(&self, _path: &Path) -> PipelineResult<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PipelineError::Host("read-only share".into()))
            } else {
                Ok(())
            }
        }
    }

    fn session(dir: &Path, user: &str) -> LockSession {
        LockSession::new(LockStore::new(dir), user, "ABC", Arc::new(NullNotifier))
            .with_timeout(Duration::from_secs(300))
    }

    #[test]
    fn switching_documents_releases_previous() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path(), "alice");
        let a = tmp.path().join("a.blend");
        let b = tmp.path().join("b.blend");

        assert_eq!(s.on_document_opened(&a).unwrap(), OpenOutcome::Locked);
        assert_eq!(s.on_document_opened(&a).unwrap(), OpenOutcome::AlreadyOurs);
        assert_eq!(s.on_document_opened(&b).unwrap(), OpenOutcome::Locked);
        assert!(s.store().get(&a).is_none());
        assert!(s.owns(&b));
    }

    #[test]
    fn reopening_by_another_spelling_keeps_the_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path(), "alice");
        let dotted = tmp.path().join("sub").join("..").join("a.blend");
        let plain = tmp.path().join("a.blend");

        assert_eq!(s.on_document_opened(&dotted).unwrap(), OpenOutcome::Locked);
        assert_eq!(s.on_document_opened(&plain).unwrap(), OpenOutcome::AlreadyOurs);
        assert!(s.owns(&dotted));
    }

    #[test]
    fn inactivity_respects_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path(), "alice");
        let a = tmp.path().join("a.blend");
        s.on_document_opened(&a).unwrap();
        let host = DirtyHost { saves: AtomicUsize::new(0), fail: false };

        let soon = Instant::now() + Duration::from_secs(10);
        assert_eq!(s.release_if_inactive(&host, soon).unwrap(), None);
        assert!(s.owns(&a));

        let later = Instant::now() + Duration::from_secs(301);
        assert_eq!(s.release_if_inactive(&host, later).unwrap(), Some(a.clone()));
        assert_eq!(host.saves.load(Ordering::SeqCst), 1);
        assert!(s.store().get(&a).is_none());
        assert_eq!(s.current_document(), Some(a));
    }

    #[test]
    fn failed_save_still_releases() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path(), "alice");
        let a = tmp.path().join("a.blend");
        s.on_document_opened(&a).unwrap();
        let host = DirtyHost { saves: AtomicUsize::new(0), fail: true };

        let later = Instant::now() + Duration::from_secs(400);
        assert!(s.release_if_inactive(&host, later).unwrap().is_some());
        assert!(s.store().get(&a).is_none());
    }

    #[test]
    fn autosave_skips_documents_held_by_others() {
        let tmp = tempfile::tempdir().unwrap();
        let alice = session(tmp.path(), "alice");
        let bob = session(tmp.path(), "bob");
        let a = tmp.path().join("a.blend");
        alice.on_document_opened(&a).unwrap();
        assert_eq!(
            bob.on_document_opened(&a).unwrap(),
            OpenOutcome::ReadOnly { owner: "alice".into() }
        );

        let host = DirtyHost { saves: AtomicUsize::new(0), fail: false };
        assert!(!bob.autosave_if_dirty(&host).unwrap());
        assert!(alice.autosave_if_dirty(&host).unwrap());
        assert_eq!(host.saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_releases_current() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path(), "alice");
        let a = tmp.path().join("a.blend");
        s.on_document_opened(&a).unwrap();
        s.close().unwrap();
        assert!(s.current_document().is_none());
        assert!(s.store().list().is_empty());
    }
}
