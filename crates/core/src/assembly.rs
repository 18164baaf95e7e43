//! Shot assembly: compose every role's publish artifact into one document.
//!
//! The host application's document API sits behind [`AssemblyDocument`];
//! [`ManifestDocument`] is a JSON-backed implementation used when no host
//! is attached. Rebuilds tolerate missing artifacts: the assembly is always
//! saved with whatever could be linked.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fsutil::write_atomic;
use crate::paths::{AssemblyLayout, Entity};
use crate::project::ProjectConfig;
use crate::roles::LinkMode;
use crate::types::{RoleId, Timestamp};

// ---------------------------------------------------------------------------
// Document seam
// ---------------------------------------------------------------------------

/// A library reference (or embedded copy) of one role's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryLink {
    pub role: RoleId,
    pub source: PathBuf,
    /// Named group of scene content brought in from `source`.
    pub group: String,
    pub mode: LinkMode,
}

/// Shared environment data imported from the world-owning role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldImport {
    pub role: RoleId,
    pub source: PathBuf,
}

/// The operations a rebuild needs from an assembly document.
pub trait AssemblyDocument {
    /// Where the document is stored.
    fn path(&self) -> &Path;

    /// The existing reference for `role`, if any.
    fn reference(&self, role: &str) -> Option<&LibraryLink>;

    /// All existing references.
    fn references(&self) -> Vec<&LibraryLink>;

    /// Create or replace the reference for `link.role`.
    fn link(&mut self, link: LibraryLink) -> Result<(), CoreError>;

    /// Drop the reference of `role`. Returns whether one existed.
    fn unlink(&mut self, role: &str) -> Result<bool, CoreError>;

    /// The current world import, if any.
    fn world(&self) -> Option<&WorldImport>;

    /// Import `source`'s shared environment on behalf of `role`.
    fn import_world(&mut self, world: WorldImport) -> Result<(), CoreError>;

    /// Drop the world import. Returns whether one existed.
    fn clear_world(&mut self) -> Result<bool, CoreError>;

    /// Persist the document.
    fn save(&mut self) -> Result<(), CoreError>;
}

// ---------------------------------------------------------------------------
// ManifestDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Manifest {
    shot: String,
    #[serde(default)]
    links: BTreeMap<RoleId, LibraryLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    world: Option<WorldImport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<Timestamp>,
}

/// JSON-backed assembly document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDocument {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestDocument {
    /// An empty, unsaved assembly for `shot`.
    pub fn new(path: impl Into<PathBuf>, shot: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            manifest: Manifest {
                shot: shot.into(),
                ..Manifest::default()
            },
        }
    }

    /// Load an existing assembly.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::MissingArtifact(path.clone()),
            _ => CoreError::Io(e),
        })?;
        let manifest = serde_json::from_slice(&bytes)?;
        Ok(Self { path, manifest })
    }

    pub fn shot(&self) -> &str {
        &self.manifest.shot
    }

    pub fn saved_at(&self) -> Option<Timestamp> {
        self.manifest.saved_at
    }
}

impl AssemblyDocument for ManifestDocument {
    fn path(&self) -> &Path {
        &self.path
    }

    fn reference(&self, role: &str) -> Option<&LibraryLink> {
        self.manifest.links.get(role)
    }

    fn references(&self) -> Vec<&LibraryLink> {
        self.manifest.links.values().collect()
    }

    fn link(&mut self, link: LibraryLink) -> Result<(), CoreError> {
        self.manifest.links.insert(link.role.clone(), link);
        Ok(())
    }

    fn unlink(&mut self, role: &str) -> Result<bool, CoreError> {
        Ok(self.manifest.links.remove(role).is_some())
    }

    fn world(&self) -> Option<&WorldImport> {
        self.manifest.world.as_ref()
    }

    fn import_world(&mut self, world: WorldImport) -> Result<(), CoreError> {
        self.manifest.world = Some(world);
        Ok(())
    }

    fn clear_world(&mut self) -> Result<bool, CoreError> {
        Ok(self.manifest.world.take().is_some())
    }

    fn save(&mut self) -> Result<(), CoreError> {
        self.manifest.saved_at = Some(Utc::now());
        write_atomic(&self.path, &serde_json::to_vec_pretty(&self.manifest)?)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rebuild report
// ---------------------------------------------------------------------------

/// Outcome of an assembly rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Roles whose publish artifact is referenced after the rebuild.
    pub linked: Vec<RoleId>,
    /// Subset of `linked` whose reference was created or repaired this run.
    pub relinked: Vec<RoleId>,
    /// Roles whose publish artifact does not exist.
    pub missing: Vec<RoleId>,
    /// Roles whose link, unlink or world import failed in the host
    /// document, with the error.
    pub failed: Vec<(RoleId, String)>,
    /// Roles whose reference was dropped because their artifact is gone or
    /// they no longer take part in the assembly.
    pub unlinked: Vec<RoleId>,
    /// Role whose environment data the assembly uses.
    pub world_owner: Option<RoleId>,
    pub assembly_path: PathBuf,
}

impl RebuildReport {
    /// Every assembly role was linked.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.is_complete() {
            format!("Assembly rebuilt: {} role(s) linked", self.linked.len())
        } else {
            let mut parts = vec![format!("linked: {}", join_or_none(&self.linked))];
            parts.push(format!("missing: {}", join_or_none(&self.missing)));
            if !self.failed.is_empty() {
                let failed: Vec<String> = self.failed.iter().map(|(r, _)| r.clone()).collect();
                parts.push(format!("failed: {}", failed.join(", ")));
            }
            format!("Assembly partially rebuilt ({})", parts.join("; "))
        }
    }
}

fn unlink_role(doc: &mut dyn AssemblyDocument, role: &str, report: &mut RebuildReport) {
    match doc.unlink(role) {
        Ok(true) => {
            tracing::info!(role, "Removed stale assembly reference");
            report.unlinked.push(role.to_string());
        }
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(role, error = %e, "Removing assembly reference failed");
            report.failed.push((role.to_string(), e.to_string()));
        }
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

// ---------------------------------------------------------------------------
// AssemblyResolver
// ---------------------------------------------------------------------------

/// Builds and opens shot assemblies for one project.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyResolver<'a> {
    project: &'a ProjectConfig,
}

impl<'a> AssemblyResolver<'a> {
    pub fn new(project: &'a ProjectConfig) -> Self {
        Self { project }
    }

    /// Canonical assembly path of `shot`.
    pub fn assembly_path(&self, shot: &str) -> PathBuf {
        self.project
            .workspace()
            .assembly_path(shot, AssemblyLayout::ProjectScoped)
    }

    /// Move a legacy shot-scoped assembly into the canonical location.
    ///
    /// Does nothing when the canonical file already exists or there is no
    /// legacy file. Returns the new path when a move happened.
    pub fn migrate_legacy_assembly(&self, shot: &str) -> Result<Option<PathBuf>, CoreError> {
        let canonical = self.assembly_path(shot);
        let legacy = self
            .project
            .workspace()
            .assembly_path(shot, AssemblyLayout::ShotScoped);
        if canonical.exists() || !legacy.is_file() {
            return Ok(None);
        }
        if let Some(dir) = canonical.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::rename(&legacy, &canonical)?;
        tracing::info!(
            from = %legacy.display(),
            to = %canonical.display(),
            "Migrated legacy assembly"
        );
        Ok(Some(canonical))
    }

    /// Open the assembly of `shot`, creating and saving an empty one first
    /// if none exists.
    pub fn open_assembly(&self, shot: &str) -> Result<ManifestDocument, CoreError> {
        self.migrate_legacy_assembly(shot)?;
        let path = self.assembly_path(shot);
        if path.is_file() {
            return ManifestDocument::open(path);
        }
        let mut doc = ManifestDocument::new(&path, shot);
        doc.save()?;
        tracing::info!(path = %path.display(), "Created empty assembly");
        Ok(doc)
    }

    /// Re-link every non-skipped role's publish artifact into `doc`.
    ///
    /// References already pointing at the resolved publish path are left
    /// alone; missing or stale ones are (re)created. Roles without a publish
    /// artifact are reported as missing and lose their old reference, as do
    /// references of roles that are no longer assembled. A world import
    /// whose owner has nothing published is dropped. Host failures are
    /// collected in the report. The document is saved in every case.
    pub fn rebuild(
        &self,
        shot: &str,
        doc: &mut dyn AssemblyDocument,
    ) -> Result<RebuildReport, CoreError> {
        self.project.roles.validate()?;
        let workspace = self.project.workspace();
        let mut report = RebuildReport {
            assembly_path: doc.path().to_path_buf(),
            ..RebuildReport::default()
        };
        let mut world_failed = false;

        for role in self.project.roles.assembly_roles() {
            let publish_path = workspace.locate(role, Entity::Shot(shot)).publish_path;
            if !publish_path.is_file() {
                tracing::debug!(
                    role = %role.id,
                    path = %publish_path.display(),
                    "Publish artifact missing"
                );
                report.missing.push(role.id.clone());
                if doc.reference(&role.id).is_some() {
                    unlink_role(doc, &role.id, &mut report);
                }
                continue;
            }

            let up_to_date = doc
                .reference(&role.id)
                .is_some_and(|r| r.source == publish_path && r.mode == role.link_mode);
            if !up_to_date {
                let link = LibraryLink {
                    role: role.id.clone(),
                    source: publish_path.clone(),
                    group: role.group_name().to_string(),
                    mode: role.link_mode,
                };
                if let Err(e) = doc.link(link) {
                    tracing::warn!(
                        role = %role.id,
                        error = %e,
                        "Linking role into assembly failed"
                    );
                    report.failed.push((role.id.clone(), e.to_string()));
                    continue;
                }
                report.relinked.push(role.id.clone());
            }
            report.linked.push(role.id.clone());

            if role.owns_world && report.world_owner.is_none() {
                let world = WorldImport {
                    role: role.id.clone(),
                    source: publish_path,
                };
                if doc.world() == Some(&world) {
                    report.world_owner = Some(role.id.clone());
                } else if let Err(e) = doc.import_world(world) {
                    tracing::warn!(role = %role.id, error = %e, "World import failed");
                    report.failed.push((role.id.clone(), format!("world import: {e}")));
                    world_failed = true;
                } else {
                    report.world_owner = Some(role.id.clone());
                }
            }
        }

        let assembled: BTreeSet<&str> = self
            .project
            .roles
            .assembly_roles()
            .map(|r| r.id.as_str())
            .collect();
        let retired: Vec<RoleId> = doc
            .references()
            .into_iter()
            .filter(|link| !assembled.contains(link.role.as_str()))
            .map(|link| link.role.clone())
            .collect();
        for role in retired {
            unlink_role(doc, &role, &mut report);
        }

        if report.world_owner.is_none() && !world_failed && doc.world().is_some() {
            match doc.clear_world() {
                Ok(_) => tracing::info!(shot, "Dropped world import without a published owner"),
                Err(e) => {
                    tracing::warn!(shot, error = %e, "Dropping stale world import failed");
                    report.failed.push(("world".to_string(), e.to_string()));
                }
            }
        }

        doc.save()?;

        if report.is_complete() {
            tracing::info!(shot, linked = report.linked.len(), "Assembly rebuilt");
        } else {
            tracing::warn!(
                shot,
                linked = ?report.linked,
                missing = ?report.missing,
                "Assembly partially rebuilt"
            );
        }
        Ok(report)
    }

    /// Open (or create) the assembly of `shot` and rebuild it.
    pub fn rebuild_shot(&self, shot: &str) -> Result<RebuildReport, CoreError> {
        let mut doc = self.open_assembly(shot)?;
        self.rebuild(shot, &mut doc)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::roles::RoleConfig;
    use crate::versioning::VersioningEngine;

    const SHOT: &str = "SHOT_010";

    fn project(root: &Path) -> ProjectConfig {
        ProjectConfig::create(root, "Another Big Cartoon").unwrap()
    }

    fn publish(config: &ProjectConfig, role: &str) -> PathBuf {
        let engine = VersioningEngine::new(config);
        let wip = engine.save_new_version(Entity::Shot(SHOT), role, role.as_bytes()).unwrap();
        engine.publish(&wip.path, None).unwrap().publish_path
    }

    /// Document whose `link` always fails, for degradation tests.
    struct BrokenHost(ManifestDocument);

    /// Document whose world import always fails.
    struct NoWorldHost(ManifestDocument);

    impl AssemblyDocument for NoWorldHost {
        fn path(&self) -> &Path {
            self.0.path()
        }
        fn reference(&self, role: &str) -> Option<&LibraryLink> {
            self.0.reference(role)
        }
        fn references(&self) -> Vec<&LibraryLink> {
            self.0.references()
        }
        fn link(&mut self, link: LibraryLink) -> Result<(), CoreError> {
            self.0.link(link)
        }
        fn unlink(&mut self, role: &str) -> Result<bool, CoreError> {
            self.0.unlink(role)
        }
        fn world(&self) -> Option<&WorldImport> {
            self.0.world()
        }
        fn import_world(&mut self, _world: WorldImport) -> Result<(), CoreError> {
            Err(CoreError::Internal("world".into()))
        }
        fn clear_world(&mut self) -> Result<bool, CoreError> {
            self.0.clear_world()
        }
        fn save(&mut self) -> Result<(), CoreError> {
            self.0.save()
        }
    }

    impl AssemblyDocument for BrokenHost {
        fn path(&self) -> &Path {
            self.0.path()
        }
        fn reference(&self, role: &str) -> Option<&LibraryLink> {
            self.0.reference(role)
        }
        fn references(&self) -> Vec<&LibraryLink> {
            self.0.references()
        }
        fn link(&mut self, link: LibraryLink) -> Result<(), CoreError> {
            Err(CoreError::Internal(format!("cannot link {}", link.role)))
        }
        fn unlink(&mut self, role: &str) -> Result<bool, CoreError> {
            self.0.unlink(role)
        }
        fn world(&self) -> Option<&WorldImport> {
            self.0.world()
        }
        fn import_world(&mut self, world: WorldImport) -> Result<(), CoreError> {
            self.0.import_world(world)
        }
        fn clear_world(&mut self) -> Result<bool, CoreError> {
            self.0.clear_world()
        }
        fn save(&mut self) -> Result<(), CoreError> {
            self.0.save()
        }
    }

    #[test]
    fn open_creates_and_saves_empty_assembly() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let resolver = AssemblyResolver::new(&config);
        let doc = resolver.open_assembly(SHOT).unwrap();
        assert!(doc.path().ends_with("SHOTS/ASSEMBLY/ABC_SHOT_010_ASSEMBLY.blend"));
        assert!(doc.path().is_file());
        assert!(doc.references().is_empty());
    }

    #[test]
    fn partial_rebuild_reports_missing_and_saves() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        publish(&config, "ANIM");
        publish(&config, "LAYOUT");

        let report = AssemblyResolver::new(&config).rebuild_shot(SHOT).unwrap();
        assert_eq!(report.linked, vec!["ANIM", "LAYOUT"]);
        assert_eq!(report.missing, vec!["FX", "LIGHT"]);
        assert!(!report.is_complete());
        assert_eq!(report.world_owner.as_deref(), Some("LAYOUT"));

        let doc = ManifestDocument::open(&report.assembly_path).unwrap();
        assert_eq!(doc.references().len(), 2);
        assert_eq!(doc.world().unwrap().role, "LAYOUT");
        assert!(doc.saved_at().is_some());
    }

    #[test]
    fn rebuild_with_nothing_published_still_saves() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let report = AssemblyResolver::new(&config).rebuild_shot(SHOT).unwrap();
        assert!(report.linked.is_empty());
        assert_eq!(report.missing.len(), 4);
        assert!(report.assembly_path.is_file());
    }

    #[test]
    fn rebuild_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        for role in ["ANIM", "FX", "LAYOUT", "LIGHT"] {
            publish(&config, role);
        }
        let resolver = AssemblyResolver::new(&config);
        let first = resolver.rebuild_shot(SHOT).unwrap();
        assert!(first.is_complete());
        assert_eq!(first.relinked.len(), 4);

        let second = resolver.rebuild_shot(SHOT).unwrap();
        assert!(second.is_complete());
        assert!(second.relinked.is_empty());
        assert_eq!(second.linked.len(), 4);
    }

    #[test]
    fn stale_reference_is_repaired() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let anim = publish(&config, "ANIM");
        let resolver = AssemblyResolver::new(&config);
        let mut doc = resolver.open_assembly(SHOT).unwrap();
        doc.link(LibraryLink {
            role: "ANIM".into(),
            source: PathBuf::from("/old/location.blend"),
            group: "ANIM".into(),
            mode: LinkMode::Link,
        })
        .unwrap();

        let report = resolver.rebuild(SHOT, &mut doc).unwrap();
        assert_eq!(report.relinked, vec!["ANIM"]);
        assert_eq!(doc.reference("ANIM").unwrap().source, anim);
    }

    #[test]
    fn skipped_roles_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        publish(&config, "COMP");
        let report = AssemblyResolver::new(&config).rebuild_shot(SHOT).unwrap();
        assert!(!report.linked.contains(&"COMP".to_string()));
        assert!(!report.missing.contains(&"COMP".to_string()));
    }

    #[test]
    fn link_mode_and_group_follow_role() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = project(tmp.path());
        config
            .roles
            .insert(RoleConfig::new("ANIM").with_primary_group("CHARS"))
            .unwrap();
        publish(&config, "ANIM");
        publish(&config, "LIGHT");
        let resolver = AssemblyResolver::new(&config);
        let mut doc = resolver.open_assembly(SHOT).unwrap();
        resolver.rebuild(SHOT, &mut doc).unwrap();
        assert_eq!(doc.reference("ANIM").unwrap().group, "CHARS");
        assert_eq!(doc.reference("LIGHT").unwrap().mode, LinkMode::Append);
    }

    #[test]
    fn host_link_failure_degrades() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        publish(&config, "ANIM");
        let resolver = AssemblyResolver::new(&config);
        let mut doc = BrokenHost(resolver.open_assembly(SHOT).unwrap());
        let report = resolver.rebuild(SHOT, &mut doc).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(report.linked.is_empty());
        assert!(report.summary().contains("failed: ANIM"));
    }

    #[test]
    fn world_import_failure_still_saves() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        publish(&config, "LAYOUT");
        let resolver = AssemblyResolver::new(&config);
        let mut doc = NoWorldHost(resolver.open_assembly(SHOT).unwrap());

        let report = resolver.rebuild(SHOT, &mut doc).unwrap();
        assert_eq!(report.linked, vec!["LAYOUT"]);
        assert_eq!(report.world_owner, None);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "LAYOUT");

        let saved = ManifestDocument::open(&report.assembly_path).unwrap();
        assert!(saved.saved_at().is_some());
        assert!(saved.reference("LAYOUT").is_some());
    }

    #[test]
    fn vanished_publish_drops_its_reference_and_world() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let anim = publish(&config, "ANIM");
        let layout = publish(&config, "LAYOUT");
        let resolver = AssemblyResolver::new(&config);
        resolver.rebuild_shot(SHOT).unwrap();

        std::fs::remove_file(&anim).unwrap();
        std::fs::remove_file(&layout).unwrap();
        let report = resolver.rebuild_shot(SHOT).unwrap();
        assert!(report.missing.contains(&"ANIM".to_string()));
        assert_eq!(report.unlinked, vec!["ANIM", "LAYOUT"]);

        let doc = ManifestDocument::open(&report.assembly_path).unwrap();
        assert!(doc.reference("ANIM").is_none());
        assert!(doc.references().is_empty());
        assert!(doc.world().is_none());
    }

    #[test]
    fn roles_leaving_the_assembly_are_unlinked() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = project(tmp.path());
        publish(&config, "FX");
        AssemblyResolver::new(&config).rebuild_shot(SHOT).unwrap();

        config
            .roles
            .insert(RoleConfig::new("FX").with_skip_assembly(true))
            .unwrap();
        let report = AssemblyResolver::new(&config).rebuild_shot(SHOT).unwrap();
        assert_eq!(report.unlinked, vec!["FX"]);
        assert!(!report.missing.contains(&"FX".to_string()));
        let doc = ManifestDocument::open(&report.assembly_path).unwrap();
        assert!(doc.reference("FX").is_none());
    }

    #[test]
    fn legacy_assembly_is_migrated() {
        let tmp = tempfile::tempdir().unwrap();
        let config = project(tmp.path());
        let legacy = config
            .workspace()
            .assembly_path(SHOT, AssemblyLayout::ShotScoped);
        let mut old = ManifestDocument::new(&legacy, SHOT);
        old.link(LibraryLink {
            role: "ANIM".into(),
            source: PathBuf::from("/x.blend"),
            group: "ANIM".into(),
            mode: LinkMode::Link,
        })
        .unwrap();
        old.save().unwrap();

        let doc = AssemblyResolver::new(&config).open_assembly(SHOT).unwrap();
        assert!(!legacy.exists());
        assert!(doc.reference("ANIM").is_some());
    }

    #[test]
    fn open_missing_manifest_is_missing_artifact() {
        assert_matches!(
            ManifestDocument::open("/does/not/exist.blend"),
            Err(CoreError::MissingArtifact(_))
        );
    }

    #[test]
    fn summary_wording() {
        let report = RebuildReport {
            linked: vec!["ANIM".into()],
            missing: vec!["FX".into()],
            ..RebuildReport::default()
        };
        assert_eq!(
            report.summary(),
            "Assembly partially rebuilt (linked: ANIM; missing: FX)"
        );
    }
}
