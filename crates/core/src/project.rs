//! Project configuration: root, prefix, file extension, lock directory, and
//! role definitions, persisted as JSON under `<root>/.shotline/`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fsutil::write_atomic;
use crate::naming::derive_prefix;
use crate::paths::Workspace;
use crate::roles::{default_roles, RoleRegistry};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Folder under the project root holding pipeline metadata.
pub const CONFIG_DIR: &str = ".shotline";

/// Project configuration filename inside [`CONFIG_DIR`].
pub const PROJECT_FILE: &str = "project.json";

/// Default lock directory name inside [`CONFIG_DIR`].
pub const DEFAULT_LOCKS_DIR: &str = "locks";

/// Default extension of scene documents.
pub const DEFAULT_EXTENSION: &str = "blend";

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

/// Persistent project configuration.
///
/// The prefix is derived from the name once, at [`create`](Self::create),
/// and stored; renaming the project never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub prefix: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Directory holding the shared lock file. Relative paths are resolved
    /// against the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locks_dir: Option<PathBuf>,
    /// Single-user mode allows free-form shot names instead of `SHOT_###`.
    #[serde(default)]
    pub single_user: bool,
    #[serde(default)]
    pub roles: RoleRegistry,
    #[serde(skip)]
    root: PathBuf,
}

impl ProjectConfig {
    /// Build an in-memory configuration with the default roles.
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        let prefix = derive_prefix(&name);
        if prefix.is_empty() {
            return Err(CoreError::Config(format!(
                "Cannot derive a project prefix from name '{name}'"
            )));
        }
        Ok(Self {
            name,
            prefix,
            extension: default_extension(),
            locks_dir: None,
            single_user: false,
            roles: RoleRegistry::from_roles(default_roles())?,
            root: root.into(),
        })
    }

    /// Create a new project on disk: writes the config and the `SHOTS/` tree.
    ///
    /// Fails with [`CoreError::Conflict`] if a project already exists at `root`.
    pub fn create(root: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self, CoreError> {
        let config = Self::new(root, name)?;
        if config.config_path().exists() {
            return Err(CoreError::Conflict(format!(
                "A project already exists at {}",
                config.root.display()
            )));
        }
        std::fs::create_dir_all(config.workspace().shots_dir())?;
        config.save()?;
        tracing::info!(
            root = %config.root.display(),
            prefix = %config.prefix,
            "Project created"
        );
        Ok(config)
    }

    /// Load and validate the configuration of the project at `root`.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let root = root.into();
        let path = root.join(CONFIG_DIR).join(PROJECT_FILE);
        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CoreError::Config(format!("No project found at {}", root.display()))
            }
            _ => CoreError::Io(e),
        })?;
        let mut config: Self = serde_json::from_slice(&bytes)?;
        config.root = root;
        config.validate()?;
        Ok(config)
    }

    /// Persist the configuration atomically.
    pub fn save(&self) -> Result<(), CoreError> {
        self.validate()?;
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&self.config_path(), &json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prefix.is_empty() || !self.prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::Config(format!(
                "Project prefix '{}' must be non-empty alphanumeric",
                self.prefix
            )));
        }
        if self.extension.is_empty() || self.extension.contains('.') {
            return Err(CoreError::Config(format!(
                "File extension '{}' must be non-empty and without a dot",
                self.extension
            )));
        }
        self.roles.validate()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/.shotline`
    pub fn config_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir().join(PROJECT_FILE)
    }

    /// Directory holding the shared lock file.
    pub fn locks_dir(&self) -> PathBuf {
        match &self.locks_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.root.join(dir),
            None => self.config_dir().join(DEFAULT_LOCKS_DIR),
        }
    }

    /// Addressing context for the path resolver.
    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.root, &self.prefix, &self.extension)
    }
}
