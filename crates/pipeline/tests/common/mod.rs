#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shotline_core::paths::Entity;
use shotline_core::project::ProjectConfig;
use shotline_events::{EventKind, Notifier, PipelineEvent};
use shotline_pipeline::{DocumentHost, Pipeline, PipelineResult};
use tempfile::TempDir;

pub const SHOT: &str = "SHOT_010";

/// Notifier that keeps every event.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<PipelineEvent>>,
}

impl Recorder {
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    pub fn last(&self, kind: EventKind) -> Option<PipelineEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.kind == kind)
            .cloned()
    }
}

impl Notifier for Recorder {
    fn notify(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Host whose documents become clean when saved.
#[derive(Default)]
pub struct FakeHost {
    dirty: Mutex<HashSet<PathBuf>>,
    saves: Mutex<Vec<PathBuf>>,
}

impl FakeHost {
    pub fn mark_dirty(&self, path: &Path) {
        self.dirty.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn saves(&self) -> Vec<PathBuf> {
        self.saves.lock().unwrap().clone()
    }
}

impl DocumentHost for FakeHost {
    fn is_dirty(&self, path: &Path) -> bool {
        self.dirty.lock().unwrap().contains(path)
    }

    fn save(&self, path: &Path) -> PipelineResult<()> {
        self.dirty.lock().unwrap().remove(path);
        self.saves.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

pub struct TestProject {
    pub dir: TempDir,
    pub pipeline: Pipeline,
    pub events: Arc<Recorder>,
}

impl TestProject {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A second user working on the same project.
    pub fn join_as(&self, user: &str) -> (Pipeline, Arc<Recorder>) {
        pipeline_for(self.root(), user)
    }
}

/// A fresh "Another Big Cartoon" project (prefix `ABC`) opened by alice.
pub fn project() -> TestProject {
    let dir = tempfile::tempdir().unwrap();
    ProjectConfig::create(dir.path(), "Another Big Cartoon").unwrap();
    let (pipeline, events) = pipeline_for(dir.path(), "alice");
    TestProject {
        dir,
        pipeline,
        events,
    }
}

pub fn pipeline_for(root: &Path, user: &str) -> (Pipeline, Arc<Recorder>) {
    let events = Arc::new(Recorder::default());
    let config = ProjectConfig::load(root).unwrap();
    let pipeline = Pipeline::new(config, user, events.clone(), Duration::from_secs(300))
        .with_admins(vec!["carol".to_string()]);
    (pipeline, events)
}

/// Write a publish artifact directly, as if it pre-dated versioning.
pub fn write_publish(pipeline: &Pipeline, role: &str, content: &[u8]) -> PathBuf {
    let project = pipeline.project();
    let role = project.roles.get(role).unwrap();
    let location = project.workspace().resolve(role, Entity::Shot(SHOT)).unwrap();
    std::fs::write(&location.publish_path, content).unwrap();
    location.publish_path
}

/// Save a new version of `role` with `content` and publish it.
pub fn publish_role(pipeline: &Pipeline, role: &str, content: &[u8]) -> PathBuf {
    let wip = pipeline
        .new_version(Entity::Shot(SHOT), role, Some(content))
        .unwrap();
    pipeline.publish(&wip.path).unwrap().publish_path
}
