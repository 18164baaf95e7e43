use shotline_core::error::CoreError;

/// Error type of pipeline workflows.
///
/// Wraps [`CoreError`] for domain failures and adds the few conditions that
/// only exist above the core (host document API, process configuration).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No project root was configured for this process.
    #[error("No project selected")]
    NoProject,

    /// The host application failed to carry out a document operation.
    #[error("Host error: {0}")]
    Host(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Message shown to the user at the operation boundary.
    ///
    /// Filesystem and serialization failures collapse to a generic message;
    /// the structured error stays available on the `Result` for callers that
    /// need to branch on it.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Core(core) => match core {
                CoreError::Io(e) => format!("Operation failed: file system error ({e})"),
                CoreError::Serialization(e) => {
                    format!("Operation failed: unreadable metadata ({e})")
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal error");
                    "Operation failed: an internal error occurred".to_string()
                }
                other => other.to_string(),
            },
            PipelineError::NoProject => {
                "No project selected: set SHOTLINE_PROJECT or pass --project".to_string()
            }
            other => other.to_string(),
        }
    }
}
