//! Scratch storage: working-directory lifecycle and the byte budget.
//!
//! One sorter run owns one working directory. Chunk files and the tail
//! live inside it, are never reused across runs, and are removed (with
//! warnings on failure, never errors) when the output stream is dropped.

use std::fs::File;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{Result, SortError, warn};

/// Exclusively owned scratch directory for one run.
///
/// The directory name carries a version prefix (`xisort_<major>_<minor>_`)
/// plus a unique suffix, so concurrent runs never collide and stale
/// directories are identifiable. Dropping the handle deletes the
/// directory and anything left inside it.
#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    /// Create a fresh, uniquely named directory under `parent` (or the
    /// system temp directory).
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let prefix = workdir_prefix();
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match parent {
            Some(p) => builder.tempdir_in(p)?,
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Deterministic chunk file name for index `idx`.
    #[must_use]
    pub fn chunk_path(&self, idx: u64) -> PathBuf {
        self.dir.path().join(format!("c_{idx:012}"))
    }

    #[must_use]
    pub fn tail_tmp_path(&self) -> PathBuf {
        self.dir.path().join("tail.tmp")
    }

    #[must_use]
    pub fn tail_fin_path(&self) -> PathBuf {
        self.dir.path().join("tail.fin")
    }

    /// Warn about entries still present after the known scratch files
    /// were removed. The directory itself is deleted on drop regardless.
    pub fn report_leftovers(&self) {
        let Ok(entries) = std::fs::read_dir(self.dir.path()) else {
            return;
        };
        let leftovers: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        if !leftovers.is_empty() {
            warn(format_args!(
                "scratch directory {} not empty at cleanup: {}",
                self.dir.path().display(),
                leftovers.join(", ")
            ));
        }
    }
}

fn workdir_prefix() -> String {
    let mut parts = env!("CARGO_PKG_VERSION").splitn(3, '.');
    let major = parts.next().unwrap_or("0");
    let minor = parts.next().unwrap_or("0");
    format!("xisort_{major}_{minor}_")
}

/// Best-effort fsync of `path`'s parent directory (POSIX only).
pub(crate) fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// Live scratch bytes across chunk files and the tail, bounded by the
/// configured quota.
#[derive(Debug)]
pub struct ScratchBudget {
    limit: u64,
    used: u64,
}

impl ScratchBudget {
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Account for `bytes` of new scratch data.
    pub fn charge(&mut self, bytes: u64) -> Result<()> {
        self.used = self.used.saturating_add(bytes);
        if self.used > self.limit {
            return Err(SortError::QuotaExceeded {
                used: self.used,
                limit: self.limit,
            });
        }
        Ok(())
    }

    /// Return `bytes` to the budget after a scratch file is removed.
    pub fn release(&mut self, bytes: u64) {
        self.used = self.used.saturating_sub(bytes);
    }

    #[must_use]
    pub fn used(&self) -> u64 {
        self.used
    }
}
