use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} '{id}'")]
    NotFound { entity: &'static str, id: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Artifact does not exist: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("File is locked by {owner}: {}", .path.display())]
    LockHeld { path: PathBuf, owner: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] with an owned identifier.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}
