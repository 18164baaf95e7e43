//! Filesystem helpers: atomic replace-writes and advisory `flock` guards.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use fs2::FileExt;

/// Write `contents` to `path` by writing a sibling temp file and renaming it
/// over the destination, so readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    let result = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

/// An exclusive advisory lock on a sidecar file, released on drop.
///
/// # Synchronization protocol
///
/// - **What is protected**: the data file the sidecar is named after.
/// - **Who can mutate**: only the holder of the exclusive lock.
/// - **Happens-before**: acquisition happens-after the previous holder's
///   unlock (explicit on drop, implicit when its handle closes).
///
/// Backed by `flock` on Unix and `LockFileEx` on Windows.
#[derive(Debug)]
pub struct ExclusiveFileLock {
    file: File,
}

impl ExclusiveFileLock {
    /// Block until the exclusive lock on `path` is held, creating the file if needed.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for ExclusiveFileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "Releasing file lock failed");
        }
    }
}
