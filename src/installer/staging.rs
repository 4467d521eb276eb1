//! Archive staging: extraction into a temporary tree and layout checks.
//!
//! A downloaded archive is never unpacked on top of the live install.
//! It is extracted into a temporary directory first, its root structure is
//! verified against what the target kind requires, and only then does the
//! replacement step start copying from the staged tree.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

use crate::constants::CORE_LAYOUT_MARKER;
use crate::core::UpgradeError;
use crate::manifest::UpgradeTarget;

/// A verified, extracted archive awaiting installation.
///
/// Owns the temporary directory; dropping it removes the staged tree.
#[derive(Debug)]
pub struct StagedPackage {
    _temp: TempDir,
    install_root: PathBuf,
}

impl StagedPackage {
    /// Directory whose contents map one-to-one onto the target directory.
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }
}

/// Extract `bytes` into a fresh staging directory and verify the layout
/// expected for `target`.
///
/// Empty or non-archive content fails with [`UpgradeError::CorruptArchive`];
/// a readable archive with the wrong root structure fails with
/// [`UpgradeError::LayoutMismatch`]. Extraction runs on the blocking pool.
pub async fn stage_archive(
    bytes: Vec<u8>,
    target: &UpgradeTarget,
) -> Result<StagedPackage, UpgradeError> {
    if bytes.is_empty() {
        return Err(UpgradeError::CorruptArchive {
            reason: "empty download".to_string(),
        });
    }
    if bytes.len() < 4 || &bytes[..2] != b"PK" {
        return Err(UpgradeError::CorruptArchive {
            reason: "not a zip archive".to_string(),
        });
    }

    let target = target.clone();
    tokio::task::spawn_blocking(move || extract_and_verify(bytes, &target))
        .await
        .map_err(|e| UpgradeError::Io(std::io::Error::other(e)))?
}

fn extract_and_verify(
    bytes: Vec<u8>,
    target: &UpgradeTarget,
) -> Result<StagedPackage, UpgradeError> {
    let temp = TempDir::new()?;

    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| UpgradeError::CorruptArchive {
            reason: e.to_string(),
        })?;
    if archive.is_empty() {
        return Err(UpgradeError::CorruptArchive {
            reason: "archive has no entries".to_string(),
        });
    }

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| UpgradeError::CorruptArchive {
            reason: e.to_string(),
        })?;
        // enclosed_name refuses absolute paths and `..` components; an
        // archive is not allowed to write outside its staging directory.
        let Some(rel) = entry.enclosed_name() else {
            return Err(UpgradeError::CorruptArchive {
                reason: format!("unsafe entry path: {}", entry.name()),
            });
        };
        let dest = temp.path().join(rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| UpgradeError::fs(&dest, e))?;
        } else {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| UpgradeError::fs(parent, e))?;
            }
            let mut out = std::fs::File::create(&dest).map_err(|e| UpgradeError::fs(&dest, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| UpgradeError::fs(&dest, e))?;
        }
    }

    let install_root = verify_layout(temp.path(), target)?;
    debug!(root = %install_root.display(), "Archive staged and verified");
    Ok(StagedPackage {
        _temp: temp,
        install_root,
    })
}

/// Check the staged root structure and return the directory to install from.
fn verify_layout(staged: &Path, target: &UpgradeTarget) -> Result<PathBuf, UpgradeError> {
    match target {
        UpgradeTarget::Core => {
            if staged.join(CORE_LAYOUT_MARKER).is_dir() {
                Ok(staged.to_path_buf())
            } else {
                Err(UpgradeError::LayoutMismatch {
                    kind: "core".to_string(),
                    reason: format!("missing {CORE_LAYOUT_MARKER}/ at archive root"),
                })
            }
        }
        UpgradeTarget::Plugin(short_name) => {
            let mismatch = |reason: String| UpgradeError::LayoutMismatch {
                kind: "plugin".to_string(),
                reason,
            };

            let mut entries = std::fs::read_dir(staged)
                .map_err(|e| UpgradeError::fs(staged, e))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| UpgradeError::fs(staged, e))?;
            if entries.len() != 1 {
                return Err(mismatch(format!(
                    "expected a single root directory, found {} entries",
                    entries.len()
                )));
            }
            let entry = entries.remove(0);
            let name = entry.file_name();
            if !entry.path().is_dir() {
                return Err(mismatch("archive root is not a directory".to_string()));
            }
            if name.to_string_lossy() != short_name.as_str() {
                return Err(mismatch(format!(
                    "root directory '{}' does not match plugin '{short_name}'",
                    name.to_string_lossy()
                )));
            }
            Ok(entry.path())
        }
    }
}
