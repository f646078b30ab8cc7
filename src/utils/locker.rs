//! File-based locking to keep one scheduler instance per table
//!
//! A table may be covered by at most one active backup plan; the lock file
//! enforces that across processes the way an advisory lock does.

use anyhow::{Context, Result};
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lock guard for a table's backup plan
pub struct PlanLock {
    // Store the lock and file together
    _lock: Box<(RwLock<File>, Option<fd_lock::RwLockWriteGuard<'static, File>>)>,
    lock_path: PathBuf,
}

impl PlanLock {
    /// Acquire the exclusive plan lock for a table.
    /// Returns an error when another control-plane instance holds it.
    pub fn acquire(table_name: &str) -> Result<Self> {
        let lock_path = Self::lock_path(table_name);

        debug!("Attempting to acquire plan lock: {:?}", lock_path);

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create lock directory")?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&lock_path)
            .context(format!("Failed to open lock file: {:?}", lock_path))?;

        // Create boxed lock
        let mut boxed_lock = Box::new((RwLock::new(file), None));

        // SAFETY: We're creating a self-referential structure here.
        // The lock guard references the RwLock, which is stored in the same Box.
        // This is safe because:
        // 1. The Box won't move once created
        // 2. The guard and RwLock will be dropped together
        // 3. The guard is dropped before the RwLock in the tuple drop order
        let lock_ptr = &mut boxed_lock.0 as *mut RwLock<File>;
        let guard = unsafe { (*lock_ptr).try_write() }.context(format!(
            "Table '{}' is already guarded by another scheduler instance (lock held)",
            table_name
        ))?;

        // Store the guard - casting to 'static is safe because we control the lifetime
        let static_guard: fd_lock::RwLockWriteGuard<'static, File> =
            unsafe { std::mem::transmute(guard) };
        boxed_lock.1 = Some(static_guard);

        info!("Acquired plan lock for table: {}", table_name);

        Ok(Self {
            _lock: boxed_lock,
            lock_path,
        })
    }

    /// Get the lock file path for a table
    fn lock_path(table_name: &str) -> PathBuf {
        #[cfg(unix)]
        let base = Path::new("/tmp");

        #[cfg(windows)]
        let base = std::env::temp_dir();

        base.join(format!("catalog-dr-{}.lock", table_name))
    }

    /// Get the lock file path (for cleanup or inspection)
    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for PlanLock {
    fn drop(&mut self) {
        info!("Released plan lock: {:?}", self.lock_path);

        // Try to remove the lock file (best effort)
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            debug!("Failed to remove lock file: {}", e);
        }
    }
}
