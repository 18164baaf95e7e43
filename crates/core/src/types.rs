/// Role identifiers are the role's configured name (e.g. `"ANIM"`).
pub type RoleId = String;

/// All persisted timestamps are UTC unless noted otherwise.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Format used for lock record timestamps (local wall-clock time).
pub const LOCK_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
