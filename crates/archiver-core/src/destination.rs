//! Preparing the local side of a backup before the monitor takes over.

use std::fs;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, UserDirs};
use eyre::{bail, eyre, Result, WrapErr};
use sysinfo::Disks;

/// Free space below which the operator is asked to confirm.
pub const LOW_SPACE_THRESHOLD: u64 = 10 * 1024 * 1024 * 1024;

/// What to do when the destination already has content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnExisting {
    /// Add new files next to the existing ones.
    Merge,
    /// Delete everything and start from an empty directory.
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDestination {
    pub path: PathBuf,
    /// True only when this run created the directory from nothing.
    pub created: bool,
    /// Entries found before the run (zero for created or wiped directories).
    pub existing_entries: usize,
}

pub fn prepare_destination(path: &Path, on_existing: OnExisting) -> Result<PreparedDestination> {
    if !path.exists() {
        fs::create_dir_all(path).wrap_err_with(|| {
            format!("failed to create backup directory {}", path.display())
        })?;
        return Ok(PreparedDestination {
            path: path.to_path_buf(),
            created: true,
            existing_entries: 0,
        });
    }
    if !path.is_dir() {
        bail!("backup location {} is not a directory", path.display());
    }

    let existing_entries = fs::read_dir(path)
        .wrap_err_with(|| format!("failed to read backup directory {}", path.display()))?
        .count();

    match on_existing {
        OnExisting::Merge => Ok(PreparedDestination {
            path: path.to_path_buf(),
            created: false,
            existing_entries,
        }),
        OnExisting::Fresh => {
            if existing_entries > 0 {
                fs::remove_dir_all(path).wrap_err_with(|| {
                    format!("failed to delete existing backup {}", path.display())
                })?;
                fs::create_dir_all(path).wrap_err_with(|| {
                    format!("failed to recreate backup directory {}", path.display())
                })?;
            }
            // Still the operator's directory: a later failure must not remove it.
            Ok(PreparedDestination {
                path: path.to_path_buf(),
                created: false,
                existing_entries: 0,
            })
        }
    }
}

/// Directories that must never be used as a backup root.
pub fn protected_locations() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(base) = BaseDirs::new() {
        dirs.push(base.home_dir().to_path_buf());
        dirs.push(base.data_dir().to_path_buf());
        dirs.push(base.data_local_dir().to_path_buf());
    }
    if let Some(user) = UserDirs::new() {
        dirs.extend(
            [
                user.document_dir(),
                user.download_dir(),
                user.desktop_dir(),
                user.picture_dir(),
            ]
            .into_iter()
            .flatten()
            .map(Path::to_path_buf),
        );
    }
    dirs
}

pub fn is_protected_location(path: &Path) -> bool {
    let normalized = normalize(path);
    if normalized.parent().is_none() {
        return true;
    }
    protected_locations()
        .iter()
        .any(|protected| normalize(protected) == normalized)
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.components().collect())
}

/// Free bytes on the filesystem holding `path` (or its nearest existing
/// ancestor).
pub fn available_space(path: &Path) -> Result<u64> {
    let existing = path
        .ancestors()
        .find(|candidate| candidate.exists())
        .ok_or_else(|| eyre!("no existing ancestor for {}", path.display()))?;
    let canonical = fs::canonicalize(existing)
        .wrap_err_with(|| format!("failed to resolve {}", existing.display()))?;

    let disks = Disks::new_with_refreshed_list();
    let mut best_match = None;
    let mut best_len = 0usize;
    for disk in disks.iter() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let depth = mount.components().count();
            if depth >= best_len {
                best_len = depth;
                best_match = Some(disk.available_space());
            }
        }
    }

    best_match.ok_or_else(|| {
        eyre!(
            "no filesystem information available for {}",
            path.display()
        )
    })
}
