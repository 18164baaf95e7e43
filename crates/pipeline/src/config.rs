use std::path::PathBuf;
use std::time::Duration;

use shotline_core::collaboration::DEFAULT_INACTIVITY_TIMEOUT_SECS;

/// Fallback user id when no environment variable names one.
const UNKNOWN_USER: &str = "unknown";

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Root of the selected project, if any.
    pub project_root: Option<PathBuf>,
    /// Identity recorded on locks and publishes.
    pub user: String,
    /// Inactivity period after which a held lock is auto-released.
    pub lock_timeout: Duration,
    /// Endpoint receiving pipeline events, if configured.
    pub webhook_url: Option<String>,
    /// Users allowed to force-release other users' locks.
    pub admins: Vec<String>,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                      |
    /// |------------------------------|------------------------------|
    /// | `SHOTLINE_PROJECT`           | none                         |
    /// | `SHOTLINE_USER`              | `USER`, then `USERNAME`      |
    /// | `SHOTLINE_LOCK_TIMEOUT_SECS` | `300`                        |
    /// | `SHOTLINE_WEBHOOK_URL`       | none                         |
    /// | `SHOTLINE_ADMINS`            | none (comma-separated)       |
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let project_root = var("SHOTLINE_PROJECT").map(PathBuf::from);

        let user = var("SHOTLINE_USER")
            .or_else(|| var("USER"))
            .or_else(|| var("USERNAME"))
            .unwrap_or_else(|| UNKNOWN_USER.to_string());

        let lock_timeout_secs = match var("SHOTLINE_LOCK_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                tracing::warn!(
                    value = %raw,
                    default = DEFAULT_INACTIVITY_TIMEOUT_SECS,
                    "SHOTLINE_LOCK_TIMEOUT_SECS is not a number of seconds, using default"
                );
                DEFAULT_INACTIVITY_TIMEOUT_SECS
            }),
            None => DEFAULT_INACTIVITY_TIMEOUT_SECS,
        };

        let admins = var("SHOTLINE_ADMINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            project_root,
            user,
            lock_timeout: Duration::from_secs(lock_timeout_secs),
            webhook_url: var("SHOTLINE_WEBHOOK_URL"),
            admins,
        }
    }

    /// Select a project root, overriding the environment.
    pub fn with_project(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
