//! Per-target upgrade locks for cross-process coordination.
//!
//! At most one upgrade may run per target short name. Unlike a queueing
//! lock, acquisition here is fail-fast: a held lock means another upgrade is
//! in flight, and the correct behavior is an immediate structured failure,
//! not waiting to race on the same directory tree.
//!
//! The core lock doubles as a gate: a core upgrade holds it exclusively,
//! plugin upgrades hold it shared. Plugins of distinct names may therefore
//! upgrade concurrently, but never while the core file replacement is in
//! flight.

use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::UpgradeError;

/// Name of the lock gating core upgrades against plugin installs.
pub const CORE_LOCK_NAME: &str = "core";

/// An acquired upgrade lock.
///
/// The lock is held through the open file handle and released when the
/// handle closes on drop. Lock files are left in place: a shared holder's
/// lock must never be detached from the path other processes open.
#[derive(Debug)]
pub struct TargetLock {
    _file: File,
    name: String,
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        debug!(lock = %self.name, "Upgrade lock released");
    }
}

impl TargetLock {
    fn open_lock_file(locks_dir: &Path, name: &str) -> Result<(File, PathBuf), UpgradeError> {
        std::fs::create_dir_all(locks_dir).map_err(|e| UpgradeError::fs(locks_dir, e))?;
        let path = locks_dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| UpgradeError::fs(&path, e))?;
        Ok((file, path))
    }

    /// Acquire the named lock exclusively, failing fast when it is held in
    /// any mode.
    ///
    /// `target` names the upgrade target reported in the
    /// [`UpgradeError::AlreadyInProgress`] failure.
    pub fn acquire_exclusive(
        locks_dir: &Path,
        name: &str,
        target: &str,
    ) -> Result<Self, UpgradeError> {
        let (file, path) = Self::open_lock_file(locks_dir, name)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(true) => {
                debug!(lock = name, path = %path.display(), "Exclusive upgrade lock acquired");
                Ok(Self {
                    _file: file,
                    name: name.to_string(),
                })
            }
            Ok(false) | Err(_) => Err(UpgradeError::AlreadyInProgress {
                target: target.to_string(),
            }),
        }
    }

    /// Acquire the named lock shared, failing fast when it is held
    /// exclusively.
    pub fn acquire_shared(
        locks_dir: &Path,
        name: &str,
        target: &str,
    ) -> Result<Self, UpgradeError> {
        let (file, path) = Self::open_lock_file(locks_dir, name)?;
        match FileExt::try_lock_shared(&file) {
            Ok(true) => {
                debug!(lock = name, path = %path.display(), "Shared upgrade lock acquired");
                Ok(Self {
                    _file: file,
                    name: name.to_string(),
                })
            }
            Ok(false) | Err(_) => Err(UpgradeError::AlreadyInProgress {
                target: target.to_string(),
            }),
        }
    }
}
