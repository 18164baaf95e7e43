//! Shot registry: which shots and assets exist, and when each of their
//! roles was last published.
//!
//! Persisted as `<root>/.shotline/shots.json`. Every update holds an
//! exclusive advisory lock on a sidecar file for the read-modify-write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fsutil::{write_atomic, ExclusiveFileLock};
use crate::project::CONFIG_DIR;
use crate::types::{RoleId, Timestamp};

/// Registry filename inside the project config directory.
pub const SHOTS_FILE: &str = "shots.json";

/// Whether a registry entry is a shot or a library asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    #[default]
    Shot,
    Asset,
}

/// Publish bookkeeping for one role of one shot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RolePublish {
    pub last_published_at: Option<Timestamp>,
    pub published_from_version: Option<u32>,
    pub published_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotRecord {
    #[serde(default)]
    pub kind: EntryKind,
    pub created_at: Timestamp,
    #[serde(default)]
    pub roles: BTreeMap<RoleId, RolePublish>,
}

/// On-disk shot registry of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ShotRegistry {
    #[serde(default)]
    pub shots: BTreeMap<String, ShotRecord>,
}

impl ShotRegistry {
    pub fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(SHOTS_FILE)
    }

    fn lock_path(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(format!("{SHOTS_FILE}.lock"))
    }

    /// Read the registry; a missing file is an empty registry.
    pub fn load(root: &Path) -> Result<Self, CoreError> {
        match std::fs::read(Self::path(root)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply `f` to the freshly read registry and write it back, all under
    /// the sidecar lock.
    pub fn update<T>(
        root: &Path,
        f: impl FnOnce(&mut Self) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let _guard = ExclusiveFileLock::acquire(&Self::lock_path(root))?;
        let mut registry = Self::load(root)?;
        let out = f(&mut registry)?;
        write_atomic(&Self::path(root), &serde_json::to_vec_pretty(&registry)?)?;
        Ok(out)
    }

    pub fn get(&self, name: &str) -> Option<&ShotRecord> {
        self.shots.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shots.contains_key(name)
    }

    /// Register a new entry. Fails with [`CoreError::Conflict`] if it exists.
    pub fn register(&mut self, name: &str, kind: EntryKind) -> Result<(), CoreError> {
        if self.shots.contains_key(name) {
            return Err(CoreError::Conflict(format!("'{name}' already exists")));
        }
        self.shots.insert(
            name.to_string(),
            ShotRecord {
                kind,
                created_at: Utc::now(),
                roles: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Record a publish of `role` on `shot`, creating the entry if needed.
    pub fn record_publish(
        &mut self,
        shot: &str,
        role: &str,
        version: Option<u32>,
        user: Option<&str>,
        at: Timestamp,
    ) {
        let record = self.shots.entry(shot.to_string()).or_insert_with(|| ShotRecord {
            kind: EntryKind::Shot,
            created_at: at,
            roles: BTreeMap::new(),
        });
        record.roles.insert(
            role.to_string(),
            RolePublish {
                last_published_at: Some(at),
                published_from_version: version,
                published_by: user.map(str::to_string),
            },
        );
    }

    /// Next free `SHOT_###` number (multiples of ten, matching editorial numbering).
    pub fn next_shot_number(&self) -> u32 {
        let max = self
            .shots
            .keys()
            .filter_map(|k| k.strip_prefix("SHOT_"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        (max / 10 + 1) * 10
    }
}
