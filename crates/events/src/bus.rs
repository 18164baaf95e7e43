//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`PipelineEvent`]s. Share
//! it via `Arc<EventBus>`.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shotline_core::types::Timestamp;
use tokio::sync::broadcast;

use crate::notifier::Notifier;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// What happened. Serialized as a dotted name, e.g. `"file.locked"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "file.opened")]
    FileOpened,
    #[serde(rename = "file.saved")]
    FileSaved,
    #[serde(rename = "file.locked")]
    FileLocked,
    #[serde(rename = "file.unlocked")]
    FileUnlocked,
    #[serde(rename = "note.added")]
    NoteAdded,
    #[serde(rename = "shot.created")]
    ShotCreated,
    #[serde(rename = "asset.created")]
    AssetCreated,
    #[serde(rename = "published")]
    Published,
    #[serde(rename = "assembly.rebuilt")]
    AssemblyRebuilt,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileOpened => "file.opened",
            Self::FileSaved => "file.saved",
            Self::FileLocked => "file.locked",
            Self::FileUnlocked => "file.unlocked",
            Self::NoteAdded => "note.added",
            Self::ShotCreated => "shot.created",
            Self::AssetCreated => "asset.created",
            Self::Published => "published",
            Self::AssemblyRebuilt => "assembly.rebuilt",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// A pipeline event with its contextual fields.
///
/// Constructed via [`PipelineEvent::new`] and enriched with the `with_*`
/// builder methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Free-form JSON carrying event-specific data.
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

impl PipelineEvent {
    /// Create an event with only its kind set.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            file_path: None,
            user: None,
            project: None,
            shot: None,
            role: None,
            note: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_shot(mut self, shot: impl Into<String>) -> Self {
        self.shot = Some(shot.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// ```rust
/// use shotline_events::bus::{EventBus, EventKind, PipelineEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(PipelineEvent::new(EventKind::ShotCreated).with_shot("SHOT_010"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped when there are none.
    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier for EventBus {
    fn notify(&self, event: PipelineEvent) {
        self.publish(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
