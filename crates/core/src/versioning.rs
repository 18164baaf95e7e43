//! Versioning engine: WIP history and the canonical publish artifact of
//! each (entity, role).
//!
//! WIP snapshots are append-only and numbered `001, 002, ...` per role;
//! numbers are never reused. The publish artifact is a single file per
//! (entity, role) holding the content of the most recently promoted WIP.
//! Publishing is last-writer-wins; mutual exclusion between editors is the
//! lock manager's job.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use serde::Serialize;

use crate::error::CoreError;
use crate::fsutil::write_atomic;
use crate::naming::{self, validate_entity_name};
use crate::paths::{self, Entity, RoleLocation};
use crate::project::ProjectConfig;
use crate::roles::RoleConfig;
use crate::shots::ShotRegistry;
use crate::types::{RoleId, Timestamp};

/// Upper bound on exclusive-create attempts while reserving a WIP number.
pub const MAX_RESERVE_ATTEMPTS: u32 = 64;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One numbered WIP snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WipEntry {
    pub version: u32,
    pub path: PathBuf,
}

/// Result of [`VersioningEngine::redirect_to_latest_wip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub should_redirect: bool,
    pub wip: Option<WipEntry>,
}

/// An artifact identified from its filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactId {
    pub entity: String,
    pub role: RoleId,
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishRecord {
    pub wip_path: PathBuf,
    pub publish_path: PathBuf,
    pub version: u32,
    pub published_at: Timestamp,
    pub artifact: Option<ArtifactId>,
}

/// Freshness of a WIP snapshot relative to its publish artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    /// The document has never been saved to disk.
    NotSaved,
    /// The document is not a WIP snapshot.
    NotWip,
    /// No publish artifact exists yet.
    NeverPublished,
    /// The WIP changed after the last publish.
    NeedsUpdate,
    /// The publish matches this, the newest, WIP.
    UpToDate,
    /// A newer WIP exists and the publish is newer than this one.
    OlderThanPublish,
    /// A filesystem error prevented the comparison.
    Unknown,
}

impl VersionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotSaved => "Not saved",
            Self::NotWip => "Not a WIP file",
            Self::NeverPublished => "Never published",
            Self::NeedsUpdate => "Publish needs update",
            Self::UpToDate => "Up to date",
            Self::OlderThanPublish => "Older than publish",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Directory scanning
// ---------------------------------------------------------------------------

/// All WIP snapshots of `stem` with extension `ext` in `wip_dir`, sorted
/// by version.
///
/// A missing directory yields an empty list. Files with another extension
/// (such as host backup files) are ignored.
pub fn scan_wips(wip_dir: &Path, stem: &str, ext: &str) -> std::io::Result<Vec<WipEntry>> {
    let entries = match std::fs::read_dir(wip_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut wips = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if extension_of(Path::new(name)) != ext {
            continue;
        }
        if let Some(version) = naming::wip_version_for_stem(name, stem) {
            wips.push(WipEntry {
                version,
                path: entry.path(),
            });
        }
    }
    wips.sort_by_key(|w| w.version);
    Ok(wips)
}

fn latest_in(wip_dir: &Path, stem: &str, ext: &str) -> std::io::Result<Option<WipEntry>> {
    Ok(scan_wips(wip_dir, stem, ext)?.pop())
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

/// Copy `src` over `dst` via a temp file + rename so `dst` is never partial.
fn copy_replace(src: &Path, dst: &Path) -> Result<(), CoreError> {
    let content = std::fs::read(src)?;
    write_atomic(dst, &content)?;
    Ok(())
}

fn stem_of(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(paths::file_stem)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// VersioningEngine
// ---------------------------------------------------------------------------

/// Versioning operations over one project.
#[derive(Debug, Clone, Copy)]
pub struct VersioningEngine<'a> {
    project: &'a ProjectConfig,
}

impl<'a> VersioningEngine<'a> {
    pub fn new(project: &'a ProjectConfig) -> Self {
        Self { project }
    }

    fn role(&self, role: &str) -> Result<&'a RoleConfig, CoreError> {
        self.project.roles.get(role)
    }

    /// Resolve (and create) the directories of `role` on `entity`.
    pub fn location(&self, entity: Entity<'_>, role: &str) -> Result<RoleLocation, CoreError> {
        validate_entity_name("Shot", entity.name())?;
        let role = self.role(role)?;
        self.project.workspace().resolve(role, entity)
    }

    /// All WIP snapshots of (entity, role), oldest first.
    pub fn list_wips(&self, entity: Entity<'_>, role: &str) -> Result<Vec<WipEntry>, CoreError> {
        let loc = self.location(entity, role)?;
        Ok(scan_wips(&loc.wip_dir, &loc.stem, &self.project.extension)?)
    }

    /// The highest-numbered WIP snapshot, or `None` when there is none.
    pub fn latest_wip(
        &self,
        entity: Entity<'_>,
        role: &str,
    ) -> Result<Option<WipEntry>, CoreError> {
        let loc = self.location(entity, role)?;
        Ok(latest_in(&loc.wip_dir, &loc.stem, &self.project.extension)?)
    }

    /// Path the next WIP snapshot would take: highest existing version + 1.
    ///
    /// This only reads the directory. Two callers racing between the
    /// listing and the write compute the same number; use
    /// [`reserve_next_wip`](Self::reserve_next_wip) to claim a number.
    pub fn next_wip_path(&self, entity: Entity<'_>, role: &str) -> Result<WipEntry, CoreError> {
        let loc = self.location(entity, role)?;
        let latest = latest_in(&loc.wip_dir, &loc.stem, &self.project.extension)?;
        let next = latest.map_or(0, |w| w.version) + 1;
        Ok(WipEntry {
            version: next,
            path: loc.wip_path(next, &self.project.extension),
        })
    }

    /// Atomically claim the next WIP number by exclusive-creating its file.
    ///
    /// On `AlreadyExists` the next number is tried, up to
    /// [`MAX_RESERVE_ATTEMPTS`] times. The reserved file is empty.
    pub fn reserve_next_wip(&self, entity: Entity<'_>, role: &str) -> Result<WipEntry, CoreError> {
        self.reserve_file(entity, role).map(|(entry, _)| entry)
    }

    fn reserve_file(&self, entity: Entity<'_>, role: &str) -> Result<(WipEntry, File), CoreError> {
        let loc = self.location(entity, role)?;
        let mut version = latest_in(&loc.wip_dir, &loc.stem, &self.project.extension)?
            .map_or(0, |w| w.version) + 1;

        for _ in 0..MAX_RESERVE_ATTEMPTS {
            let path = loc.wip_path(version, &self.project.extension);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    tracing::debug!(path = %path.display(), version, "Reserved WIP version");
                    return Ok((WipEntry { version, path }, file));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!(version, "WIP version taken concurrently, trying next");
                    version += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::Conflict(format!(
            "Could not reserve a WIP version for {} after {MAX_RESERVE_ATTEMPTS} attempts",
            loc.stem
        )))
    }

    /// Reserve the next WIP number and write `content` into it.
    pub fn save_new_version(
        &self,
        entity: Entity<'_>,
        role: &str,
        content: &[u8],
    ) -> Result<WipEntry, CoreError> {
        self.save_with(entity, role, |file| {
            file.write_all(content)?;
            file.sync_all()
        })
    }

    /// Reserve the next WIP number and fill it with `write`. A reservation
    /// that could not be written is removed again, so an empty file never
    /// becomes the latest WIP.
    fn save_with(
        &self,
        entity: Entity<'_>,
        role: &str,
        write: impl FnOnce(&mut File) -> std::io::Result<()>,
    ) -> Result<WipEntry, CoreError> {
        let (entry, mut file) = self.reserve_file(entity, role)?;
        if let Err(e) = write(&mut file) {
            drop(file);
            if let Err(cleanup) = std::fs::remove_file(&entry.path) {
                tracing::warn!(
                    path = %entry.path.display(),
                    error = %cleanup,
                    "Removing unwritten WIP reservation failed"
                );
            }
            return Err(e.into());
        }
        tracing::info!(
            path = %entry.path.display(),
            version = entry.version,
            "Saved new WIP version"
        );
        Ok(entry)
    }

    /// Where opening `publish_path` should land: its newest WIP, if any.
    pub fn redirect_to_latest_wip(&self, publish_path: &Path) -> Result<Redirect, CoreError> {
        let (Some(wip_dir), Some(stem)) =
            (paths::sibling_wip_dir(publish_path), stem_of(publish_path))
        else {
            return Ok(Redirect {
                should_redirect: false,
                wip: None,
            });
        };
        let wip = latest_in(&wip_dir, &stem, &extension_of(publish_path))?;
        Ok(Redirect {
            should_redirect: wip.is_some(),
            wip,
        })
    }

    /// Bootstrap version history by copying the publish artifact into
    /// `_WIP_001`.
    pub fn create_first_wip(&self, publish_path: &Path) -> Result<PathBuf, CoreError> {
        if !publish_path.is_file() {
            return Err(CoreError::MissingArtifact(publish_path.to_path_buf()));
        }
        let (Some(wip_dir), Some(stem)) =
            (paths::sibling_wip_dir(publish_path), stem_of(publish_path))
        else {
            return Err(CoreError::Validation(format!(
                "{} is not inside a PUBLISH folder",
                publish_path.display()
            )));
        };
        std::fs::create_dir_all(&wip_dir)?;

        let file_name = naming::wip_filename_for_stem(&stem, 1, &extension_of(publish_path));
        let wip_path = wip_dir.join(file_name);
        let content = std::fs::read(publish_path)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&wip_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(CoreError::Conflict(format!(
                    "{} already exists",
                    wip_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&content)?;
        file.sync_all()?;

        tracing::info!(wip = %wip_path.display(), "Created first WIP from publish");
        Ok(wip_path)
    }

    /// Promote a WIP snapshot to the canonical publish artifact.
    ///
    /// Records the publish on the owning shot/role in the shot registry
    /// when the artifact can be identified from its filename.
    pub fn publish(&self, wip_path: &Path, user: Option<&str>) -> Result<PublishRecord, CoreError> {
        let file_name = wip_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let (Some(publish_path), Some(version)) = (
            paths::publish_path_for_wip(wip_path),
            naming::parse_wip_version(file_name),
        ) else {
            return Err(CoreError::Validation(format!(
                "{} is not a WIP file",
                wip_path.display()
            )));
        };
        if !wip_path.is_file() {
            return Err(CoreError::MissingArtifact(wip_path.to_path_buf()));
        }

        copy_replace(wip_path, &publish_path)?;
        let published_at = Utc::now();
        let artifact = self.identify(&publish_path);

        match &artifact {
            Some(id) => {
                ShotRegistry::update(self.project.root(), |registry| {
                    registry.record_publish(
                        &id.entity,
                        &id.role,
                        Some(version),
                        user,
                        published_at,
                    );
                    Ok(())
                })?;
            }
            None => tracing::warn!(
                path = %publish_path.display(),
                "Published file does not follow project naming; publish time not recorded"
            ),
        }

        tracing::info!(
            wip = %wip_path.display(),
            publish = %publish_path.display(),
            version,
            "Published WIP"
        );

        Ok(PublishRecord {
            wip_path: wip_path.to_path_buf(),
            publish_path,
            version,
            published_at,
            artifact,
        })
    }

    /// Freshness of `wip_path` relative to its publish artifact.
    ///
    /// Never fails: filesystem errors collapse to [`VersionStatus::Unknown`].
    pub fn version_status(&self, wip_path: &Path) -> VersionStatus {
        version_status(wip_path)
    }

    /// Recover (entity, role) from a publish or WIP filename using the
    /// project prefix and the configured role ids.
    pub fn identify(&self, path: &Path) -> Option<ArtifactId> {
        let publish = if naming::parse_wip_version(path.file_name()?.to_str()?).is_some() {
            paths::publish_path_for_wip(path)?
        } else {
            path.to_path_buf()
        };
        let stem = stem_of(&publish)?;
        let rest = stem.strip_prefix(&self.project.prefix)?.strip_prefix('_')?;

        self.project
            .roles
            .iter()
            .filter_map(|role| {
                let entity = rest.strip_suffix(role.id.as_str())?.strip_suffix('_')?;
                (!entity.is_empty()).then(|| ArtifactId {
                    entity: entity.to_string(),
                    role: role.id.clone(),
                })
            })
            .max_by_key(|id| id.role.len())
    }
}

/// See [`VersioningEngine::version_status`].
pub fn version_status(wip_path: &Path) -> VersionStatus {
    if wip_path.as_os_str().is_empty() {
        return VersionStatus::NotSaved;
    }
    let Some(publish_path) = paths::publish_path_for_wip(wip_path) else {
        return VersionStatus::NotWip;
    };

    let compare = || -> std::io::Result<VersionStatus> {
        let wip_mtime = modified(wip_path)?;
        let publish_mtime = match modified(&publish_path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(VersionStatus::NeverPublished),
            Err(e) => return Err(e),
        };
        if wip_mtime > publish_mtime {
            return Ok(VersionStatus::NeedsUpdate);
        }

        let this_version = wip_path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(naming::parse_wip_version)
            .unwrap_or(0);
        let stem = stem_of(&publish_path).unwrap_or_default();
        let wip_dir = wip_path.parent().unwrap_or_else(|| Path::new("."));
        let newest = latest_in(wip_dir, &stem, &extension_of(wip_path))?.map_or(0, |w| w.version);

        Ok(if newest > this_version {
            VersionStatus::OlderThanPublish
        } else {
            VersionStatus::UpToDate
        })
    };

    compare().unwrap_or_else(|e| {
        tracing::warn!(path = %wip_path.display(), error = %e, "Version status check failed");
        VersionStatus::Unknown
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;

    const SHOT: Entity<'static> = Entity::Shot("SHOT_010");

    fn project(root: &Path) -> ProjectConfig {
        ProjectConfig::create(root, "Another Big Cartoon").unwrap()
    }

    fn set_mtime(path: &Path, t: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(t)
            .unwrap();
    }

    // -----------------------------------------------------------------------
    // Numbering
    // -----------------------------------------------------------------------

    #[test]
    fn nth_next_wip_path_is_n() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        for n in 1..=5 {
            let next = engine.next_wip_path(SHOT, "ANIM").unwrap();
            assert_eq!(next.version, n);
            std::fs::write(&next.path, b"x").unwrap();
        }
    }

    #[test]
    fn next_wip_path_is_read_only() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let a = engine.next_wip_path(SHOT, "ANIM").unwrap();
        let b = engine.next_wip_path(SHOT, "ANIM").unwrap();
        assert_eq!(a, b);
        assert!(!a.path.exists());
    }

    #[test]
    fn reserve_never_hands_out_the_same_number() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let a = engine.reserve_next_wip(SHOT, "ANIM").unwrap();
        let b = engine.reserve_next_wip(SHOT, "ANIM").unwrap();
        assert_eq!((a.version, b.version), (1, 2));
        assert!(a.path.exists() && b.path.exists());
    }

    #[test]
    fn reserve_continues_after_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let loc = engine.location(SHOT, "ANIM").unwrap();
        std::fs::write(loc.wip_path(1, "blend"), b"a").unwrap();
        let reserved = engine.reserve_next_wip(SHOT, "ANIM").unwrap();
        assert_eq!(reserved.version, 2);
    }

    #[test]
    fn concurrent_reservations_are_distinct() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let versions: Vec<u32> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        VersioningEngine::new(&config)
                            .reserve_next_wip(SHOT, "ANIM")
                            .unwrap()
                            .version
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), versions.len());
    }

    #[test]
    fn failed_write_releases_the_reservation() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        engine.save_new_version(SHOT, "ANIM", b"good").unwrap();

        let result = engine.save_with(SHOT, "ANIM", |_| Err(std::io::Error::other("disk full")));
        assert_matches!(result, Err(CoreError::Io(_)));

        let latest = engine.latest_wip(SHOT, "ANIM").unwrap().unwrap();
        assert_eq!(latest.version, 1);
        assert_eq!(std::fs::read(&latest.path).unwrap(), b"good");
        assert_eq!(engine.next_wip_path(SHOT, "ANIM").unwrap().version, 2);
    }

    #[test]
    fn unknown_role_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        assert_matches!(
            engine.next_wip_path(SHOT, "SOUND"),
            Err(CoreError::NotFound { entity: "role", .. })
        );
    }

    #[test]
    fn latest_ignores_other_roles_and_junk() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let loc = engine.location(SHOT, "ANIM").unwrap();
        std::fs::write(loc.wip_path(2, "blend"), b"a").unwrap();
        std::fs::write(loc.wip_dir.join("ABC_SHOT_010_ANIM_WIP_009.blend1"), b"b").unwrap();
        std::fs::write(loc.wip_dir.join("notes.txt"), b"c").unwrap();
        std::fs::write(loc.wip_dir.join("ABC_SHOT_010_ANIMX_WIP_050.blend"), b"d").unwrap();

        let latest = engine.latest_wip(SHOT, "ANIM").unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(engine.list_wips(SHOT, "ANIM").unwrap().len(), 1);
    }

    #[test]
    fn latest_on_empty_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        assert_eq!(engine.latest_wip(SHOT, "ANIM").unwrap(), None);
    }

    // -----------------------------------------------------------------------
    // Bootstrap, redirect, publish
    // -----------------------------------------------------------------------

    #[test]
    fn first_wip_copies_publish() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let loc = engine.location(SHOT, "ANIM").unwrap();
        std::fs::write(&loc.publish_path, b"scene-bytes").unwrap();

        let wip = engine.create_first_wip(&loc.publish_path).unwrap();
        assert!(wip.ends_with("ANIM/_WIP/ABC_SHOT_010_ANIM_WIP_001.blend"));
        assert_eq!(std::fs::read(&wip).unwrap(), b"scene-bytes");

        let latest = engine.latest_wip(SHOT, "ANIM").unwrap().unwrap();
        assert_eq!(latest, WipEntry { version: 1, path: wip });
    }

    #[test]
    fn first_wip_requires_publish() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let loc = engine.location(SHOT, "ANIM").unwrap();
        assert_matches!(
            engine.create_first_wip(&loc.publish_path),
            Err(CoreError::MissingArtifact(_))
        );
    }

    #[test]
    fn first_wip_refuses_to_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let loc = engine.location(SHOT, "ANIM").unwrap();
        std::fs::write(&loc.publish_path, b"p").unwrap();
        engine.create_first_wip(&loc.publish_path).unwrap();
        assert_matches!(
            engine.create_first_wip(&loc.publish_path),
            Err(CoreError::Conflict(_))
        );
    }

    #[test]
    fn redirect_picks_highest_version() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let loc = engine.location(SHOT, "ANIM").unwrap();

        let none = engine.redirect_to_latest_wip(&loc.publish_path).unwrap();
        assert!(!none.should_redirect);

        engine.save_new_version(SHOT, "ANIM", b"1").unwrap();
        let second = engine.save_new_version(SHOT, "ANIM", b"2").unwrap();
        let redirect = engine.redirect_to_latest_wip(&loc.publish_path).unwrap();
        assert!(redirect.should_redirect);
        assert_eq!(redirect.wip, Some(second));
    }

    #[test]
    fn publish_copies_and_records() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let wip = engine.save_new_version(SHOT, "ANIM", b"v1").unwrap();

        let record = engine.publish(&wip.path, Some("alice")).unwrap();
        assert_eq!(std::fs::read(&record.publish_path).unwrap(), b"v1");
        assert_eq!(record.version, 1);
        assert_eq!(
            record.artifact,
            Some(ArtifactId {
                entity: "SHOT_010".into(),
                role: "ANIM".into()
            })
        );

        let registry = ShotRegistry::load(tmp.path()).unwrap();
        let role = &registry.get("SHOT_010").unwrap().roles["ANIM"];
        assert_eq!(role.published_from_version, Some(1));
        assert_eq!(role.published_by.as_deref(), Some("alice"));
    }

    #[test]
    fn publish_rejects_non_wip() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let loc = engine.location(SHOT, "ANIM").unwrap();
        std::fs::write(&loc.publish_path, b"p").unwrap();
        assert_matches!(
            engine.publish(&loc.publish_path, None),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn publish_missing_wip() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let next = engine.next_wip_path(SHOT, "ANIM").unwrap();
        assert_matches!(
            engine.publish(&next.path, None),
            Err(CoreError::MissingArtifact(_))
        );
    }

    #[test]
    fn identify_prefers_longest_role_match() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = project(tmp.path());
        config.roles.insert(RoleConfig::new("X_FX")).unwrap();
        let engine = VersioningEngine::new(&config);
        let id = engine
            .identify(Path::new("/p/SHOTS/S/X_FX/PUBLISH/ABC_S_X_FX.blend"))
            .unwrap();
        assert_eq!(id.role, "X_FX");
        assert_eq!(id.entity, "S");
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    #[test]
    fn status_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);

        assert_eq!(engine.version_status(Path::new("")), VersionStatus::NotSaved);

        let wip = engine.save_new_version(SHOT, "ANIM", b"v1").unwrap();
        assert_eq!(engine.version_status(&wip.path), VersionStatus::NeverPublished);

        let record = engine.publish(&wip.path, None).unwrap();
        assert_eq!(engine.version_status(&wip.path), VersionStatus::UpToDate);
        assert_eq!(engine.version_status(&record.publish_path), VersionStatus::NotWip);

        set_mtime(&wip.path, SystemTime::now() + Duration::from_secs(5));
        assert_eq!(engine.version_status(&wip.path), VersionStatus::NeedsUpdate);
    }

    #[test]
    fn status_older_than_publish() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let old = engine.save_new_version(SHOT, "ANIM", b"v1").unwrap();
        let new = engine.save_new_version(SHOT, "ANIM", b"v2").unwrap();
        let past = SystemTime::now() - Duration::from_secs(60);
        set_mtime(&old.path, past);
        set_mtime(&new.path, past);
        engine.publish(&new.path, None).unwrap();

        assert_eq!(engine.version_status(&old.path), VersionStatus::OlderThanPublish);
        assert_eq!(engine.version_status(&new.path), VersionStatus::UpToDate);
    }

    #[test]
    fn status_of_vanished_wip_is_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let engine = VersioningEngine::new(&config);
        let next = engine.next_wip_path(SHOT, "ANIM").unwrap();
        assert_eq!(engine.version_status(&next.path), VersionStatus::Unknown);
    }
}
