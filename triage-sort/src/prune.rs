//! Removal of empty destination directories.

use std::fs;
use std::path::{Path, PathBuf};

/// Remove every directory in `dirs` that exists and has no entries.
///
/// Non-recursive: a directory holding only an empty subdirectory is kept.
/// Failures are logged and skipped; the returned list holds what was removed.
pub fn prune_empty_dirs<'a, I>(dirs: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut removed = Vec::new();
    for dir in dirs {
        if !is_empty_dir(dir) {
            continue;
        }
        // remove_dir fails on a directory that filled up after the check.
        match fs::remove_dir(dir) {
            Ok(()) => {
                tracing::info!("removed empty directory: {}", dir.display());
                removed.push(dir.to_path_buf());
            }
            Err(err) => tracing::debug!("could not remove {}: {err}", dir.display()),
        }
    }
    removed
}

fn is_empty_dir(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => false,
    }
}
