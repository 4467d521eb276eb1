//! Selective file replacement from a staged tree into the live install.
//!
//! Policy:
//! - paths under the exclusion list are never written, whole subtrees
//!   included;
//! - existing live files are replaced, files only present in the staged tree
//!   are added;
//! - files only present live are left untouched — the replacement step never
//!   deletes anything it did not write, so user data outside the exclusion
//!   list survives too.
//!
//! Every file write is journaled (with a pre-copy backup for replacements)
//! before it happens, and a failure reports the paths already written so an
//! operator knows exactly how far the tree got.

use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::core::UpgradeError;
use crate::installer::journal::ReplaceJournal;

/// A replacement failure, carrying the paths written before it happened.
#[derive(Debug)]
pub struct ReplaceFailure {
    /// The underlying error.
    pub error: UpgradeError,
    /// Relative paths already copied into the live tree.
    pub copied: Vec<PathBuf>,
}

/// Whether `rel` falls under any excluded path.
fn is_excluded(rel: &Path, excluded: &[PathBuf]) -> bool {
    excluded.iter().any(|ex| rel.starts_with(ex))
}

/// Copy the staged tree into `target_dir`, honoring the exclusion list and
/// journaling every write. Returns the relative paths copied.
pub fn replace_tree(
    staged_root: &Path,
    target_dir: &Path,
    excluded: &[PathBuf],
    journal: &mut ReplaceJournal,
) -> Result<Vec<PathBuf>, ReplaceFailure> {
    let mut copied = Vec::new();
    match copy_tree(staged_root, target_dir, excluded, journal, &mut copied) {
        Ok(()) => {
            debug!(files = copied.len(), "Live tree updated from staged package");
            Ok(copied)
        }
        Err(error) => Err(ReplaceFailure { error, copied }),
    }
}

fn copy_tree(
    staged_root: &Path,
    target_dir: &Path,
    excluded: &[PathBuf],
    journal: &mut ReplaceJournal,
    copied: &mut Vec<PathBuf>,
) -> Result<(), UpgradeError> {
    let mut walker = WalkDir::new(staged_root).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| staged_root.to_path_buf());
            UpgradeError::fs(path, e.into())
        })?;

        let rel = match entry.path().strip_prefix(staged_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };

        if is_excluded(&rel, excluded) {
            trace!(path = %rel.display(), "Skipping excluded path");
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        let dest = target_dir.join(&rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| UpgradeError::fs(&dest, e))?;
        } else {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| UpgradeError::fs(parent, e))?;
            }
            if dest.exists() {
                journal.record_replaced(&rel)?;
            } else {
                journal.record_added(&rel)?;
            }
            std::fs::copy(entry.path(), &dest).map_err(|e| UpgradeError::fs(&dest, e))?;
            copied.push(rel);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Trees {
        _temp: TempDir,
        staged: PathBuf,
        live: PathBuf,
        state: PathBuf,
    }

    fn setup() -> Trees {
        let temp = TempDir::new().unwrap();
        let staged = temp.path().join("staged");
        let live = temp.path().join("live");
        let state = temp.path().join("state");
        std::fs::create_dir_all(&staged).unwrap();
        std::fs::create_dir_all(&live).unwrap();
        Trees {
            _temp: temp,
            staged,
            live,
            state,
        }
    }

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn run(trees: &Trees, excluded: &[PathBuf]) -> Vec<PathBuf> {
        let mut journal = ReplaceJournal::create(&trees.state, "osclass", &trees.live).unwrap();
        let copied = replace_tree(&trees.staged, &trees.live, excluded, &mut journal).unwrap();
        journal.commit().unwrap();
        copied
    }

    #[test]
    fn excluded_paths_survive_byte_identical() {
        let trees = setup();
        // Live user data that the archive also ships.
        write(&trees.live, "config.php", b"<?php // live credentials");
        write(&trees.live, "oc-content/uploads/x.jpg", b"user-upload");
        write(&trees.staged, "config.php", b"<?php // shipped sample");
        write(&trees.staged, "oc-content/themes/default/style.css", b"body{}");
        write(&trees.staged, "index.php", b"<?php v2");

        let excluded = [PathBuf::from("config.php"), PathBuf::from("oc-content")];
        let copied = run(&trees, &excluded);

        assert_eq!(
            std::fs::read(trees.live.join("config.php")).unwrap(),
            b"<?php // live credentials"
        );
        assert_eq!(
            std::fs::read(trees.live.join("oc-content/uploads/x.jpg")).unwrap(),
            b"user-upload"
        );
        // Nothing under the excluded directory was written at all.
        assert!(!trees.live.join("oc-content/themes").exists());
        assert_eq!(copied, vec![PathBuf::from("index.php")]);
    }

    #[test]
    fn replacement_is_additive_and_preserves_stray_files() {
        let trees = setup();
        write(&trees.live, "old-only.php", b"still here");
        write(&trees.live, "shared.php", b"v1");
        write(&trees.staged, "shared.php", b"v2");
        write(&trees.staged, "new/module.php", b"fresh");

        let copied = run(&trees, &[]);

        assert_eq!(std::fs::read(trees.live.join("shared.php")).unwrap(), b"v2");
        assert_eq!(std::fs::read(trees.live.join("new/module.php")).unwrap(), b"fresh");
        // Present only live: never deleted.
        assert_eq!(std::fs::read(trees.live.join("old-only.php")).unwrap(), b"still here");
        assert_eq!(copied.len(), 2);
    }

    #[test]
    fn journal_enables_restoring_the_pre_copy_tree() {
        let trees = setup();
        write(&trees.live, "app.php", b"version-1");
        write(&trees.staged, "app.php", b"version-2");
        write(&trees.staged, "added.php", b"brand new");

        let mut journal = ReplaceJournal::create(&trees.state, "osclass", &trees.live).unwrap();
        replace_tree(&trees.staged, &trees.live, &[], &mut journal).unwrap();
        drop(journal); // upgrade failed downstream; journal stays

        let summary = crate::installer::journal::rollback(&trees.state, "osclass").unwrap();
        assert_eq!(summary.restored, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(std::fs::read(trees.live.join("app.php")).unwrap(), b"version-1");
        assert!(!trees.live.join("added.php").exists());
    }
}
