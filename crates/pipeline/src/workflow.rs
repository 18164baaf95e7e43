//! Project-level workflows: the operations users trigger.
//!
//! [`Pipeline`] is the explicitly constructed service object of one opened
//! project. It owns the project configuration and the [`LockSession`], runs
//! the core engines, and reports every user-visible change to the notifier.
//! Methods return structured [`PipelineResult`]s; front ends convert them with
//! [`OperationStatus::from_result`](crate::status::OperationStatus::from_result).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use shotline_core::assembly::{
    AssemblyDocument, AssemblyResolver, ManifestDocument, RebuildReport,
};
use shotline_core::collaboration::{LockOutcome, LockRecord, LockStore, LockTable};
use shotline_core::error::CoreError;
use shotline_core::fsutil::write_atomic;
use shotline_core::naming::{self, validate_entity_name};
use shotline_core::paths::{placeholders, Entity, PathTemplate, RoleLocation};
use shotline_core::project::ProjectConfig;
use shotline_core::roles::RoleConfig;
use shotline_core::shots::{EntryKind, ShotRegistry};
use shotline_core::types::RoleId;
use shotline_core::versioning::{PublishRecord, VersionStatus, VersioningEngine, WipEntry};
use shotline_events::{EventKind, Notifier, PipelineEvent};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::session::{held_by, LockSession, OpenOutcome};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A newly registered shot or asset and the roles bootstrapped for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEntity {
    pub name: String,
    pub kind: EntryKind,
    pub roles: Vec<(RoleId, RoleLocation)>,
    /// The shot assembly document; assets have none.
    pub assembly: Option<PathBuf>,
}

/// The document a user lands on when opening a publish artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedDocument {
    pub path: PathBuf,
    /// History was bootstrapped with a first WIP copied from the publish.
    pub bootstrapped: bool,
    pub lock: OpenOutcome,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    project: ProjectConfig,
    session: Arc<LockSession>,
    notifier: Arc<dyn Notifier>,
    admins: Vec<String>,
}

impl Pipeline {
    pub fn new(
        project: ProjectConfig,
        user: impl Into<String>,
        notifier: Arc<dyn Notifier>,
        lock_timeout: Duration,
    ) -> Self {
        let session = LockSession::new(
            LockStore::new(project.locks_dir()),
            user,
            project.name.clone(),
            Arc::clone(&notifier),
        )
        .with_timeout(lock_timeout);
        Self {
            project,
            session: Arc::new(session),
            notifier,
            admins: Vec::new(),
        }
    }

    /// Load the configured project for the configured user.
    pub fn open(config: &PipelineConfig, notifier: Arc<dyn Notifier>) -> PipelineResult<Self> {
        let root = config.project_root.as_ref().ok_or(PipelineError::NoProject)?;
        let project = ProjectConfig::load(root)?;
        tracing::info!(
            root = %root.display(),
            project = %project.name,
            user = %config.user,
            "Project opened"
        );
        Ok(Self::new(project, config.user.clone(), notifier, config.lock_timeout)
            .with_admins(config.admins.clone()))
    }

    /// Users allowed to force-release locks.
    pub fn with_admins(mut self, admins: Vec<String>) -> Self {
        self.admins = admins;
        self
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    pub fn session(&self) -> &Arc<LockSession> {
        &self.session
    }

    pub fn user(&self) -> &str {
        self.session.user()
    }

    /// Whether the current user may force-release other users' locks.
    pub fn is_admin(&self) -> bool {
        self.admins.iter().any(|a| a == self.user())
    }

    fn engine(&self) -> VersioningEngine<'_> {
        VersioningEngine::new(&self.project)
    }

    fn event(&self, kind: EventKind) -> PipelineEvent {
        PipelineEvent::new(kind)
            .with_user(self.user())
            .with_project(&self.project.name)
    }

    // -----------------------------------------------------------------------
    // Shots and assets
    // -----------------------------------------------------------------------

    /// Look up `ids`, or every role passing `default` when `ids` is empty.
    /// Fails before any change when an id is unknown.
    fn select_roles(
        &self,
        ids: &[&str],
        default: impl Fn(&RoleConfig) -> bool,
    ) -> PipelineResult<Vec<&RoleConfig>> {
        if ids.is_empty() {
            return Ok(self.project.roles.iter().filter(|r| default(r)).collect());
        }
        ids.iter()
            .map(|id| self.project.roles.get(id).map_err(PipelineError::from))
            .collect()
    }

    /// Register a shot and bootstrap its roles.
    ///
    /// Without a name the next `SHOT_###` number is taken. Free-form names
    /// are only accepted in single-user projects. An empty `roles` slice
    /// means every shot-rooted role. Each role gets an empty first publish
    /// and a `_WIP_001` copied from it, and the shot assembly is created and
    /// linked. Nothing is registered unless every step succeeds.
    pub fn create_shot(
        &self,
        name: Option<&str>,
        roles: &[&str],
    ) -> PipelineResult<CreatedEntity> {
        let selected = self.select_roles(roles, |r| !stores_assets(r))?;
        if let Some(role) = selected.iter().find(|r| stores_assets(r)) {
            return Err(CoreError::Validation(format!(
                "Role '{}' stores assets, not shots",
                role.id
            ))
            .into());
        }
        if let Some(name) = name {
            validate_entity_name("Shot", name)?;
            if !self.project.single_user && !naming::is_shot_id(name) {
                return Err(CoreError::Validation(format!(
                    "Shot name '{name}' must look like SHOT_010 in a multi-user project"
                ))
                .into());
            }
        }

        let created = self.register_entity(EntryKind::Shot, &selected, |registry| {
            name.map_or_else(
                || naming::shot_id(registry.next_shot_number()),
                str::to_string,
            )
        })?;
        tracing::info!(shot = %created.name, roles = created.roles.len(), "Shot created");
        self.notifier.notify(
            self.event(EventKind::ShotCreated)
                .with_shot(&created.name)
                .with_payload(serde_json::json!({
                    "roles": role_ids(&created),
                    "assembly": created.assembly,
                })),
        );
        Ok(created)
    }

    /// Register a library asset and bootstrap its roles.
    ///
    /// Only roles with an asset-rooted template qualify; an empty `roles`
    /// slice means all of them.
    pub fn create_asset(&self, name: &str, roles: &[&str]) -> PipelineResult<CreatedEntity> {
        validate_entity_name("Asset", name)?;
        let selected = self.select_roles(roles, stores_assets)?;
        if selected.is_empty() {
            return Err(CoreError::Config("No asset roles are configured".to_string()).into());
        }
        if let Some(role) = selected.iter().find(|r| !stores_assets(r)) {
            return Err(CoreError::Validation(format!(
                "Role '{}' stores shots, not assets",
                role.id
            ))
            .into());
        }

        let created = self.register_entity(EntryKind::Asset, &selected, |_| name.to_string())?;
        tracing::info!(asset = %created.name, roles = created.roles.len(), "Asset created");
        self.notifier.notify(
            self.event(EventKind::AssetCreated).with_payload(serde_json::json!({
                "asset": created.name,
                "roles": role_ids(&created),
            })),
        );
        Ok(created)
    }

    /// Register an entry and bootstrap its roles under the registry lock.
    ///
    /// The registry is only written when the closure succeeds, so a failure
    /// leaves it untouched; the files created so far are removed again.
    fn register_entity(
        &self,
        kind: EntryKind,
        roles: &[&RoleConfig],
        name: impl FnOnce(&ShotRegistry) -> String,
    ) -> PipelineResult<CreatedEntity> {
        let mut created_paths = Vec::new();
        let result = ShotRegistry::update(self.project.root(), |registry| {
            let name = name(&*registry);
            registry.register(&name, kind)?;
            let created = self.bootstrap_roles(&name, kind, roles, &mut created_paths)?;
            let now = chrono::Utc::now();
            for (role, _) in &created.roles {
                registry.record_publish(&name, role, Some(1), Some(self.user()), now);
            }
            Ok(created)
        });
        result.map_err(|e| {
            rollback(&created_paths);
            e.into()
        })
    }

    fn bootstrap_roles(
        &self,
        name: &str,
        kind: EntryKind,
        roles: &[&RoleConfig],
        created_paths: &mut Vec<PathBuf>,
    ) -> Result<CreatedEntity, CoreError> {
        let workspace = self.project.workspace();
        let engine = self.engine();
        let entity = match kind {
            EntryKind::Shot => Entity::Shot(name),
            EntryKind::Asset => Entity::Asset(name),
        };

        let mut located = Vec::with_capacity(roles.len());
        for role in roles {
            let planned = workspace.locate(role, entity);
            for dir in [&planned.publish_dir, &planned.wip_dir] {
                if let Some(top) = first_missing_ancestor(dir) {
                    if !created_paths.contains(&top) {
                        created_paths.push(top);
                    }
                }
            }
            let location = workspace.resolve(role, entity)?;
            if !location.publish_path.exists() {
                write_atomic(&location.publish_path, &[])?;
            }
            if engine.latest_wip(entity, &role.id)?.is_none() {
                engine.create_first_wip(&location.publish_path)?;
            }
            located.push((role.id.clone(), location));
        }

        let assembly = match kind {
            EntryKind::Shot => {
                let resolver = AssemblyResolver::new(&self.project);
                let path = resolver.assembly_path(name);
                if !path.exists() {
                    created_paths.push(path.clone());
                }
                let mut doc = resolver.open_assembly(name)?;
                resolver.rebuild(name, &mut doc)?;
                Some(path)
            }
            EntryKind::Asset => None,
        };

        Ok(CreatedEntity {
            name: name.to_string(),
            kind,
            roles: located,
            assembly,
        })
    }

    // -----------------------------------------------------------------------
    // Versions
    // -----------------------------------------------------------------------

    pub fn list_wips(&self, entity: Entity<'_>, role: &str) -> PipelineResult<Vec<WipEntry>> {
        Ok(self.engine().list_wips(entity, role)?)
    }

    pub fn latest_wip(&self, entity: Entity<'_>, role: &str) -> PipelineResult<Option<WipEntry>> {
        Ok(self.engine().latest_wip(entity, role)?)
    }

    /// Where the next WIP would go. Read-only; see [`new_version`](Self::new_version).
    pub fn next_wip_path(&self, entity: Entity<'_>, role: &str) -> PipelineResult<WipEntry> {
        Ok(self.engine().next_wip_path(entity, role)?)
    }

    /// Save a new WIP version of (entity, role).
    ///
    /// The version number is reserved atomically. Without explicit
    /// `content` the latest WIP is copied, falling back to the publish
    /// artifact and then to an empty file.
    pub fn new_version(
        &self,
        entity: Entity<'_>,
        role: &str,
        content: Option<&[u8]>,
    ) -> PipelineResult<WipEntry> {
        let engine = self.engine();
        let entry = match content {
            Some(bytes) => engine.save_new_version(entity, role, bytes)?,
            None => {
                let location = engine.location(entity, role)?;
                let source = match engine.latest_wip(entity, role)? {
                    Some(latest) => Some(latest.path),
                    None => location.publish_path.is_file().then_some(location.publish_path),
                };
                let bytes = match source {
                    Some(path) => std::fs::read(path).map_err(CoreError::from)?,
                    None => Vec::new(),
                };
                engine.save_new_version(entity, role, &bytes)?
            }
        };

        let mut event = self
            .event(EventKind::FileSaved)
            .with_file(&entry.path)
            .with_role(role)
            .with_payload(serde_json::json!({ "version": entry.version, "new_version": true }));
        if let Entity::Shot(shot) = entity {
            event = event.with_shot(shot);
        }
        self.notifier.notify(event);
        Ok(entry)
    }

    /// Promote `wip_path` to its publish artifact.
    ///
    /// Refused when another user holds the lock on the WIP.
    pub fn publish(&self, wip_path: &Path) -> PipelineResult<PublishRecord> {
        if let Some(record) = self.session.store().get(wip_path) {
            if record.user != self.user() {
                return Err(held_by(wip_path, record).into());
            }
        }
        let record = self.engine().publish(wip_path, Some(self.user()))?;

        let mut event = self
            .event(EventKind::Published)
            .with_file(&record.publish_path)
            .with_payload(serde_json::json!({
                "version": record.version,
                "wip_path": record.wip_path,
            }));
        if let Some(artifact) = &record.artifact {
            event = event.with_shot(&artifact.entity).with_role(&artifact.role);
        }
        self.notifier.notify(event);
        Ok(record)
    }

    /// Open a publish artifact the way a user should: land on its newest
    /// WIP, bootstrapping `_WIP_001` from the publish when there is none.
    pub fn open_published(&self, publish_path: &Path) -> PipelineResult<OpenedDocument> {
        let engine = self.engine();
        let redirect = engine.redirect_to_latest_wip(publish_path)?;
        let (path, bootstrapped) = match redirect.wip {
            Some(wip) if redirect.should_redirect => (wip.path, false),
            _ => (engine.create_first_wip(publish_path)?, true),
        };
        let lock = self.session.on_document_opened(&path)?;
        Ok(OpenedDocument {
            path,
            bootstrapped,
            lock,
        })
    }

    /// Open any document through the session hook.
    pub fn open_document(&self, path: &Path) -> PipelineResult<OpenOutcome> {
        self.session.on_document_opened(path)
    }

    /// Freshness of a WIP relative to its publish.
    pub fn status(&self, wip_path: &Path) -> VersionStatus {
        self.engine().version_status(wip_path)
    }

    // -----------------------------------------------------------------------
    // Assembly
    // -----------------------------------------------------------------------

    /// Open (creating if needed) the JSON assembly of `shot`.
    pub fn open_assembly(&self, shot: &str) -> PipelineResult<ManifestDocument> {
        validate_entity_name("Shot", shot)?;
        Ok(AssemblyResolver::new(&self.project).open_assembly(shot)?)
    }

    /// Rebuild the JSON assembly of `shot`.
    pub fn rebuild_assembly(&self, shot: &str) -> PipelineResult<RebuildReport> {
        let mut doc = self.open_assembly(shot)?;
        self.rebuild_assembly_in(shot, &mut doc)
    }

    /// Rebuild `shot` into a host-provided assembly document.
    pub fn rebuild_assembly_in(
        &self,
        shot: &str,
        doc: &mut dyn AssemblyDocument,
    ) -> PipelineResult<RebuildReport> {
        validate_entity_name("Shot", shot)?;
        let report = AssemblyResolver::new(&self.project).rebuild(shot, doc)?;
        self.notifier.notify(
            self.event(EventKind::AssemblyRebuilt)
                .with_shot(shot)
                .with_file(&report.assembly_path)
                .with_payload(serde_json::json!({
                    "linked": report.linked,
                    "missing": report.missing,
                    "unlinked": report.unlinked,
                    "complete": report.is_complete(),
                })),
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    /// Lock `path`. Fails with [`CoreError::LockHeld`] when someone else has it.
    pub fn lock(&self, path: &Path, note: &str) -> PipelineResult<LockOutcome> {
        match self.session.lock(path, note)? {
            LockOutcome::HeldBy(record) => Err(held_by(path, record).into()),
            owned => Ok(owned),
        }
    }

    /// Release `path`. Returns `false` when we did not hold it.
    pub fn unlock(&self, path: &Path) -> PipelineResult<bool> {
        self.session.unlock(path)
    }

    /// Change the note on our lock of `path`.
    pub fn set_note(&self, path: &Path, note: &str) -> PipelineResult<bool> {
        self.session.update_note(path, note)
    }

    pub fn list_locks(&self) -> LockTable {
        self.session.store().list()
    }

    /// Release another user's lock. Admins only.
    pub fn force_unlock(&self, path: &Path) -> PipelineResult<Option<LockRecord>> {
        if !self.is_admin() {
            return Err(CoreError::Forbidden(format!(
                "'{}' is not allowed to force-release locks",
                self.user()
            ))
            .into());
        }
        self.session.force_unlock(path)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("project", &self.project.name)
            .field("session", &self.session)
            .field("admins", &self.admins)
            .finish_non_exhaustive()
    }
}

fn stores_assets(role: &RoleConfig) -> bool {
    match &role.template {
        PathTemplate::Custom(pattern) => pattern.contains(placeholders::ASSET_NAME),
        other => other.is_asset_rooted(),
    }
}

fn role_ids(created: &CreatedEntity) -> Vec<&str> {
    created.roles.iter().map(|(id, _)| id.as_str()).collect()
}

/// The outermost ancestor of `path` (itself included) that does not exist yet.
fn first_missing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .last()
        .map(Path::to_path_buf)
}

/// Remove what a failed bootstrap created, newest first.
fn rollback(paths: &[PathBuf]) {
    for path in paths.iter().rev() {
        let removed = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        match removed {
            Ok(()) => tracing::debug!(path = %path.display(), "Rolled back"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Rollback failed"),
        }
    }
}
