//! Collaborative file locks: constants, record types, and the shared
//! JSON-backed lock store.
//!
//! One lock file per project maps a normalized absolute document path to
//! the [`LockRecord`] of its owner. Per path the state machine is
//! `UNLOCKED -> LOCKED(owner) -> UNLOCKED`; only the owner may unlock or
//! edit the note. This module lives in `core` so the pipeline session, the
//! CLI, and any future tooling share one implementation.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fsutil::{write_atomic, ExclusiveFileLock};

// ---------------------------------------------------------------------------
// Timing constants
// ---------------------------------------------------------------------------

/// Default inactivity period after which a held lock is auto-released (5 minutes).
pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 300;

/// How often the inactivity monitor wakes up.
pub const INACTIVITY_CHECK_INTERVAL_SECS: u64 = 10;

/// How often a locked, dirty document is autosaved.
pub const AUTOSAVE_INTERVAL_SECS: u64 = 120;

/// Name of the shared lock file inside the project's locks directory.
pub const LOCK_FILE_NAME: &str = "file_locks.json";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

mod lock_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::types::LOCK_TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(LOCK_TIMESTAMP_FORMAT).to_string())
    }

    /// Accepts the persisted format plus ISO 8601 forms written by other tools.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, LOCK_TIMESTAMP_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .or_else(|e| {
                chrono::DateTime::parse_from_rfc3339(&raw)
                    .map(|ts| ts.with_timezone(&chrono::Local).naive_local())
                    .map_err(|_| e)
            })
            .map_err(serde::de::Error::custom)
    }
}

/// Who holds a file, since when, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub user: String,
    /// Local wall-clock time of acquisition or last refresh.
    #[serde(with = "lock_timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub note: String,
}

impl LockRecord {
    pub fn new(user: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            timestamp: now_local(),
            note: note.into(),
        }
    }
}

/// Lock table keyed by normalized path.
pub type LockTable = BTreeMap<String, LockRecord>;

/// Result of a [`LockStore::lock`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The path was unlocked and is now ours.
    Acquired,
    /// We already held the path; its timestamp was refreshed.
    Refreshed,
    /// Someone else holds the path; nothing changed.
    HeldBy(LockRecord),
}

impl LockOutcome {
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Acquired | Self::Refreshed)
    }
}

fn now_local() -> NaiveDateTime {
    // Second precision, matching the persisted format.
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

// ---------------------------------------------------------------------------
// Path normalization
// ---------------------------------------------------------------------------

/// Normalize a document path into its lock-table key.
///
/// Relative paths are joined to the current directory, `.` and `..` are
/// collapsed lexically (symlinks are not resolved), and separators become
/// `/`.
pub fn normalize_path(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out.to_string_lossy().replace('\\', "/")
}

// ---------------------------------------------------------------------------
// LockStore
// ---------------------------------------------------------------------------

/// The shared lock file of one project.
///
/// Every mutation holds an exclusive advisory lock on a sidecar
/// `<file>.lock` for its whole read-modify-write, re-reads the table from
/// disk under that lock, and replaces the file atomically. Concurrent
/// writers from different processes therefore serialize instead of
/// clobbering each other.
///
/// A mutation never writes a table it could not read: an unreadable or
/// malformed file fails the operation. Individual records that do not
/// parse are written back untouched and keep their path locked.
#[derive(Debug, Clone)]
pub struct LockStore {
    path: PathBuf,
    guard_path: PathBuf,
}

/// The decoded lock file: valid records plus raw entries that did not parse.
#[derive(Debug, Default)]
struct LockFile {
    table: LockTable,
    unreadable: BTreeMap<String, serde_json::Value>,
}

impl LockFile {
    fn decode(path: &Path, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_slice(bytes)?;
        let mut file = Self::default();
        for (key, value) in raw {
            match serde_json::from_value::<LockRecord>(value.clone()) {
                Ok(record) => {
                    file.table.insert(key, record);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        key = %key,
                        error = %e,
                        "Unreadable lock record, keeping it as is"
                    );
                    file.unreadable.insert(key, value);
                }
            }
        }
        Ok(file)
    }

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut raw: BTreeMap<&str, serde_json::Value> = self
            .unreadable
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        for (key, record) in &self.table {
            raw.insert(key.as_str(), serde_json::to_value(record)?);
        }
        serde_json::to_vec_pretty(&raw)
    }

    fn unreadable_error(key: &str) -> CoreError {
        CoreError::Conflict(format!(
            "The lock record of {key} is unreadable; an admin can force-release it"
        ))
    }
}

impl LockStore {
    /// Store backed by `<locks_dir>/file_locks.json`.
    pub fn new(locks_dir: impl AsRef<Path>) -> Self {
        let path = locks_dir.as_ref().join(LOCK_FILE_NAME);
        let guard_path = locks_dir.as_ref().join(format!("{LOCK_FILE_NAME}.lock"));
        Self { path, guard_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<LockFile, CoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(LockFile::decode(&self.path, &bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LockFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the valid records. A missing file is an empty table; an
    /// unreadable one is logged and also reads as empty.
    pub fn read(&self) -> LockTable {
        match self.load() {
            Ok(file) => file.table,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Lock file unreadable, treating as empty"
                );
                LockTable::new()
            }
        }
    }

    /// Run `f` on the current file under the sidecar lock. The file is
    /// written back only when `f` reports a change, and never when it
    /// could not be read.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut LockFile) -> Result<(T, bool), CoreError>,
    ) -> Result<T, CoreError> {
        let _guard = ExclusiveFileLock::acquire(&self.guard_path)?;
        let mut file = self.load().inspect_err(|e| {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Lock file unreadable, not modifying it"
            );
        })?;
        let (out, changed) = f(&mut file)?;
        if changed {
            write_atomic(&self.path, &file.encode()?)?;
        }
        Ok(out)
    }

    /// Current record of `path`, if locked.
    pub fn get(&self, path: &Path) -> Option<LockRecord> {
        self.read().remove(&normalize_path(path))
    }

    /// All current locks.
    pub fn list(&self) -> LockTable {
        self.read()
    }

    /// Acquire `path` for `user`.
    ///
    /// Succeeds when unlocked or already held by `user` (the timestamp is
    /// refreshed and a non-empty `note` replaces the old one). Fails without
    /// any change when another user holds it.
    pub fn lock(&self, path: &Path, user: &str, note: &str) -> Result<LockOutcome, CoreError> {
        let key = normalize_path(path);
        let outcome = self.mutate(|file| {
            if file.unreadable.contains_key(&key) {
                return Err(LockFile::unreadable_error(&key));
            }
            Ok(match file.table.get_mut(&key) {
                Some(record) if record.user == user => {
                    record.timestamp = now_local();
                    if !note.is_empty() {
                        record.note = note.to_string();
                    }
                    (LockOutcome::Refreshed, true)
                }
                Some(record) => (LockOutcome::HeldBy(record.clone()), false),
                None => {
                    file.table.insert(key.clone(), LockRecord::new(user, note));
                    (LockOutcome::Acquired, true)
                }
            })
        })?;

        match &outcome {
            LockOutcome::Acquired => tracing::info!(path = %key, user, "File locked"),
            LockOutcome::Refreshed => tracing::debug!(path = %key, user, "File lock refreshed"),
            LockOutcome::HeldBy(record) => {
                tracing::info!(path = %key, user, owner = %record.user, "Lock denied")
            }
        }
        Ok(outcome)
    }

    /// Release `path` if `user` holds it. Returns whether a lock was removed.
    pub fn unlock(&self, path: &Path, user: &str) -> Result<bool, CoreError> {
        let key = normalize_path(path);
        let released = self.mutate(|file| {
            Ok(match file.table.get(&key) {
                Some(record) if record.user == user => {
                    file.table.remove(&key);
                    (true, true)
                }
                _ => (false, false),
            })
        })?;
        if released {
            tracing::info!(path = %key, user, "File unlocked");
        }
        Ok(released)
    }

    /// Replace the note of a lock held by `user`.
    pub fn update_note(&self, path: &Path, user: &str, note: &str) -> Result<bool, CoreError> {
        let key = normalize_path(path);
        self.mutate(|file| {
            Ok(match file.table.get_mut(&key) {
                Some(record) if record.user == user => {
                    record.note = note.to_string();
                    (true, true)
                }
                _ => (false, false),
            })
        })
    }

    /// Refresh the timestamp of a lock held by `user`.
    pub fn touch(&self, path: &Path, user: &str) -> Result<bool, CoreError> {
        let key = normalize_path(path);
        self.mutate(|file| {
            Ok(match file.table.get_mut(&key) {
                Some(record) if record.user == user => {
                    record.timestamp = now_local();
                    (true, true)
                }
                _ => (false, false),
            })
        })
    }

    /// Administrative override: remove any lock on `path` regardless of owner.
    ///
    /// Returns the removed record. An unreadable record is removed too,
    /// with `None` returned.
    pub fn force_unlock(&self, path: &Path, admin: &str) -> Result<Option<LockRecord>, CoreError> {
        let key = normalize_path(path);
        let removed = self.mutate(|file| {
            let dropped_raw = file.unreadable.remove(&key).is_some();
            if dropped_raw {
                tracing::warn!(path = %key, admin, "Unreadable lock record force-released");
            }
            let removed = file.table.remove(&key);
            let changed = removed.is_some() || dropped_raw;
            Ok((removed, changed))
        })?;
        if let Some(record) = &removed {
            tracing::warn!(path = %key, admin, owner = %record.user, "Lock force-released");
        }
        Ok(removed)
    }

    /// Release every lock held by `user`. Returns the released keys.
    pub fn release_all(&self, user: &str) -> Result<Vec<String>, CoreError> {
        self.mutate(|file| {
            let keys: Vec<String> = file
                .table
                .iter()
                .filter(|(_, r)| r.user == user)
                .map(|(k, _)| k.clone())
                .collect();
            for key in &keys {
                file.table.remove(key);
            }
            let changed = !keys.is_empty();
            Ok((keys, changed))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
