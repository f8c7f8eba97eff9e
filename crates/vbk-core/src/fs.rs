//! Filesystem preconditions shared by the backup and restore pipelines.

use std::path::{Path, PathBuf};

use crate::error::{VbkError, VbkResult};

/// True if `dir` exists, is a directory, and has no entries.
///
/// A missing path or a non-directory is a precondition failure rather than
/// "empty": backing up or restoring into something that is not a directory
/// is never what the operator meant.
pub fn is_dir_empty(dir: &Path) -> VbkResult<bool> {
    if !dir.is_dir() {
        return Err(VbkError::Precondition(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let mut entries = std::fs::read_dir(dir)?;
    Ok(entries.next().transpose()?.is_none())
}

/// Returns `path` if nothing exists there, otherwise the first free
/// `path_0`, `path_1`, ... sibling.
pub fn ensure_unique(path: &Path) -> PathBuf {
    if !exists(path) {
        return path.to_path_buf();
    }
    let base = path.as_os_str().to_owned();
    (0u64..)
        .map(|n| {
            let mut candidate = base.clone();
            candidate.push(format!("_{n}"));
            PathBuf::from(candidate)
        })
        .find(|candidate| !exists(candidate))
        .unwrap_or_else(|| path.to_path_buf())
}

// Dangling symlinks count as taken.
fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}
