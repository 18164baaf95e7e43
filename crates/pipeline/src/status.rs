use std::fmt;

use serde::Serialize;

use crate::error::PipelineResult;

/// User-facing result of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationStatus {
    pub success: bool,
    pub message: String,
}

impl OperationStatus {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// Convert a workflow result at the operation boundary.
    ///
    /// Failures are logged and rendered with
    /// [`PipelineError::user_message`](crate::error::PipelineError::user_message).
    pub fn from_result<T>(result: &PipelineResult<T>, describe: impl FnOnce(&T) -> String) -> Self {
        match result {
            Ok(value) => Self::success(describe(value)),
            Err(e) => {
                tracing::warn!(error = %e, "Operation failed");
                Self::failure(e.user_message())
            }
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
