//! Copy-and-truncate rotation of the launchd stdout/stderr logs.
//!
//! launchd opens both files once and hands the descriptors to the daemon for
//! its whole lifetime, so the live file is never renamed. Its contents are
//! copied to `daemon.log.1` (older copies shift up to `.5`, the oldest is
//! dropped) and the live file is truncated in place. Writers opened in append
//! mode carry on at the new end of file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::{stderr_log_path, stdout_log_path};

/// Rotate once a log reaches 10 MiB.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if it has reached `max_bytes`.
///
/// Returns `true` if rotation occurred. A missing log is not an error.
/// Lines written between the copy and the truncate are lost.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if max_files == 0 || size < max_bytes {
        return Ok(false);
    }

    shift_copies(log_path, max_files)?;
    fs::copy(log_path, numbered_path(log_path, 1))?;
    fs::OpenOptions::new()
        .write(true)
        .open(log_path)?
        .set_len(0)?;
    Ok(true)
}

/// Make room in slot 1: `.n` becomes `.n+1`, the copy in the last slot goes.
fn shift_copies(log_path: &Path, max_files: usize) -> io::Result<()> {
    match fs::remove_file(numbered_path(log_path, max_files)) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    for slot in (1..max_files).rev() {
        let from = numbered_path(log_path, slot);
        if from.exists() {
            fs::rename(&from, numbered_path(log_path, slot + 1))?;
        }
    }
    Ok(())
}

/// Rotate both daemon logs under `home`. Failures are logged per file.
pub fn rotate_logs(home: &Path) {
    for log_path in [stdout_log_path(home), stderr_log_path(home)] {
        match rotate_if_needed(&log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// `daemon.log` + `n` → `daemon.log.n`
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("daemon.log");
    base.with_file_name(format!("{name}.{n}"))
}
