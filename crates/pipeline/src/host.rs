//! The host application's document API as seen by the pipeline.

use std::path::Path;

use crate::error::PipelineResult;

/// Document operations the lock session needs from the host.
///
/// Background monitors call these from a worker thread; implementations
/// whose document API is main-thread-only must marshal the call themselves.
pub trait DocumentHost: Send + Sync {
    /// Whether the open document at `path` has unsaved changes.
    fn is_dirty(&self, path: &Path) -> bool;

    /// Save the open document at `path` in place.
    fn save(&self, path: &Path) -> PipelineResult<()>;
}

/// Host without open documents (command line, scripts). Nothing is ever dirty.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessHost;

impl DocumentHost for HeadlessHost {
    fn is_dirty(&self, _path: &Path) -> bool {
        false
    }

    fn save(&self, _path: &Path) -> PipelineResult<()> {
        Ok(())
    }
}
