//! Replacement journal: crash recovery for the file-replacement step.
//!
//! File replacement is not transactional; a crash mid-copy can leave a
//! partially upgraded tree. Before each live file is overwritten its
//! pre-copy content is backed up, and an append-only journal line records
//! what happened to each path. An interrupted or failed upgrade can then be
//! undone by replaying the journal newest-first: restore backups over
//! replaced files, delete files that were added.
//!
//! The journal lives under the state directory and is removed on successful
//! completion. Starting a new upgrade for the same target supersedes any
//! journal a previous failed attempt left behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::UpgradeError;

/// What the replacement step did to one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalAction {
    /// An existing live file was overwritten; its old content is in the
    /// backup tree.
    Replaced,
    /// The file did not exist live before this upgrade.
    Added,
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalHeader {
    short_name: String,
    target_dir: PathBuf,
    created_at: DateTime<Utc>,
}

/// One journal line: a path relative to the target directory and what
/// happened to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Path relative to the target directory.
    pub path: PathBuf,
    /// Action taken on the path.
    pub action: JournalAction,
}

/// Outcome of replaying a journal in reverse.
#[derive(Debug)]
pub struct RollbackSummary {
    /// Directory the rollback acted on.
    pub target_dir: PathBuf,
    /// Files restored from backups.
    pub restored: usize,
    /// Added files that were removed again.
    pub removed: usize,
}

fn journal_path(state_dir: &Path, short_name: &str) -> PathBuf {
    state_dir.join(format!("journal-{short_name}.jsonl"))
}

fn backup_dir(state_dir: &Path, short_name: &str) -> PathBuf {
    state_dir.join(format!("backup-{short_name}"))
}

fn data_error(path: &Path, message: String) -> UpgradeError {
    UpgradeError::fs(path, io::Error::new(io::ErrorKind::InvalidData, message))
}

/// Open journal for one replacement run.
pub struct ReplaceJournal {
    target_dir: PathBuf,
    journal_path: PathBuf,
    backup_dir: PathBuf,
    file: std::fs::File,
}

impl ReplaceJournal {
    /// Start a fresh journal for `short_name`, superseding any journal a
    /// previous failed attempt left behind.
    pub fn create(
        state_dir: &Path,
        short_name: &str,
        target_dir: &Path,
    ) -> Result<Self, UpgradeError> {
        std::fs::create_dir_all(state_dir).map_err(|e| UpgradeError::fs(state_dir, e))?;

        let journal_path = journal_path(state_dir, short_name);
        let backups = backup_dir(state_dir, short_name);
        if backups.exists() {
            warn!(short_name, "Discarding backups from a previous upgrade attempt");
            std::fs::remove_dir_all(&backups).map_err(|e| UpgradeError::fs(&backups, e))?;
        }

        let mut file = std::fs::File::create(&journal_path)
            .map_err(|e| UpgradeError::fs(&journal_path, e))?;
        let header = JournalHeader {
            short_name: short_name.to_string(),
            target_dir: target_dir.to_path_buf(),
            created_at: Utc::now(),
        };
        let line = serde_json::to_string(&header)
            .map_err(|e| data_error(&journal_path, e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| UpgradeError::fs(&journal_path, e))?;

        Ok(Self {
            target_dir: target_dir.to_path_buf(),
            journal_path,
            backup_dir: backups,
            file,
        })
    }

    fn append(&mut self, entry: &JournalEntry) -> Result<(), UpgradeError> {
        let line = serde_json::to_string(entry)
            .map_err(|e| data_error(&self.journal_path, e.to_string()))?;
        writeln!(self.file, "{line}").map_err(|e| UpgradeError::fs(&self.journal_path, e))?;
        self.file.flush().map_err(|e| UpgradeError::fs(&self.journal_path, e))
    }

    /// Record the imminent replacement of `rel`, backing up its current
    /// content first. Must be called before the overwrite happens.
    pub fn record_replaced(&mut self, rel: &Path) -> Result<(), UpgradeError> {
        let live = self.target_dir.join(rel);
        let backup = self.backup_dir.join(rel);
        if let Some(parent) = backup.parent() {
            std::fs::create_dir_all(parent).map_err(|e| UpgradeError::fs(parent, e))?;
        }
        std::fs::copy(&live, &backup).map_err(|e| UpgradeError::fs(&live, e))?;
        self.append(&JournalEntry {
            path: rel.to_path_buf(),
            action: JournalAction::Replaced,
        })
    }

    /// Record that `rel` is about to be added (no live predecessor).
    pub fn record_added(&mut self, rel: &Path) -> Result<(), UpgradeError> {
        self.append(&JournalEntry {
            path: rel.to_path_buf(),
            action: JournalAction::Added,
        })
    }

    /// Successful completion: the journal and its backups are no longer
    /// needed.
    pub fn commit(self) -> Result<(), UpgradeError> {
        std::fs::remove_file(&self.journal_path)
            .map_err(|e| UpgradeError::fs(&self.journal_path, e))?;
        if self.backup_dir.exists() {
            std::fs::remove_dir_all(&self.backup_dir)
                .map_err(|e| UpgradeError::fs(&self.backup_dir, e))?;
        }
        debug!("Replacement journal committed");
        Ok(())
    }
}

/// Whether a journal from an earlier run exists for `short_name`.
pub fn journal_exists(state_dir: &Path, short_name: &str) -> bool {
    journal_path(state_dir, short_name).exists()
}

/// Replay the journal for `short_name` in reverse: restore replaced files
/// from their backups and remove added ones, then delete the journal.
pub fn rollback(state_dir: &Path, short_name: &str) -> Result<RollbackSummary, UpgradeError> {
    let path = journal_path(state_dir, short_name);
    let file = std::fs::File::open(&path).map_err(|e| UpgradeError::fs(&path, e))?;
    let mut lines = io::BufReader::new(file).lines();

    let header_line = lines
        .next()
        .ok_or_else(|| data_error(&path, "journal is empty".to_string()))?
        .map_err(|e| UpgradeError::fs(&path, e))?;
    let header: JournalHeader = serde_json::from_str(&header_line)
        .map_err(|e| data_error(&path, format!("bad journal header: {e}")))?;

    let mut entries = Vec::new();
    for line in lines {
        let line = line.map_err(|e| UpgradeError::fs(&path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: JournalEntry = serde_json::from_str(&line)
            .map_err(|e| data_error(&path, format!("bad journal entry: {e}")))?;
        entries.push(entry);
    }

    let backups = backup_dir(state_dir, short_name);
    let mut restored = 0;
    let mut removed = 0;
    for entry in entries.iter().rev() {
        let live = header.target_dir.join(&entry.path);
        match entry.action {
            JournalAction::Replaced => {
                let backup = backups.join(&entry.path);
                if let Some(parent) = live.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| UpgradeError::fs(parent, e))?;
                }
                std::fs::copy(&backup, &live).map_err(|e| UpgradeError::fs(&backup, e))?;
                restored += 1;
            }
            JournalAction::Added => match std::fs::remove_file(&live) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(UpgradeError::fs(&live, e)),
            },
        }
    }

    std::fs::remove_file(&path).map_err(|e| UpgradeError::fs(&path, e))?;
    if backups.exists() {
        std::fs::remove_dir_all(&backups).map_err(|e| UpgradeError::fs(&backups, e))?;
    }

    info!(
        target = %header.short_name,
        restored, removed, "Rollback complete"
    );
    Ok(RollbackSummary {
        target_dir: header.target_dir,
        restored,
        removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let state = temp.path().join("state");
        let target = temp.path().join("live");
        std::fs::create_dir_all(&target).unwrap();
        (temp, state, target)
    }

    #[test]
    fn commit_removes_journal_and_backups() {
        let (_temp, state, target) = setup();
        std::fs::write(target.join("a.php"), b"old").unwrap();

        let mut journal = ReplaceJournal::create(&state, "osclass", &target).unwrap();
        journal.record_replaced(Path::new("a.php")).unwrap();
        journal.record_added(Path::new("b.php")).unwrap();
        assert!(journal_exists(&state, "osclass"));

        journal.commit().unwrap();
        assert!(!journal_exists(&state, "osclass"));
        assert!(!state.join("backup-osclass").exists());
    }

    #[test]
    fn rollback_restores_replaced_and_removes_added() {
        let (_temp, state, target) = setup();
        std::fs::write(target.join("a.php"), b"old-content").unwrap();

        let mut journal = ReplaceJournal::create(&state, "osclass", &target).unwrap();
        journal.record_replaced(Path::new("a.php")).unwrap();
        // Simulate the upgrade overwriting and adding files after recording.
        std::fs::write(target.join("a.php"), b"new-content").unwrap();
        journal.record_added(Path::new("sub/b.php")).unwrap();
        std::fs::create_dir_all(target.join("sub")).unwrap();
        std::fs::write(target.join("sub/b.php"), b"added").unwrap();
        drop(journal); // failure path: journal left behind

        let summary = rollback(&state, "osclass").unwrap();
        assert_eq!(summary.restored, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(std::fs::read(target.join("a.php")).unwrap(), b"old-content");
        assert!(!target.join("sub/b.php").exists());
        assert!(!journal_exists(&state, "osclass"));
    }

    #[test]
    fn rollback_without_journal_is_an_error() {
        let (_temp, state, _target) = setup();
        assert!(rollback(&state, "osclass").is_err());
    }

    #[test]
    fn new_journal_supersedes_stale_backups() {
        let (_temp, state, target) = setup();
        std::fs::create_dir_all(state.join("backup-osclass")).unwrap();
        std::fs::write(state.join("backup-osclass/stale.php"), b"stale").unwrap();

        let journal = ReplaceJournal::create(&state, "osclass", &target).unwrap();
        assert!(!state.join("backup-osclass/stale.php").exists());
        drop(journal);
    }
}
