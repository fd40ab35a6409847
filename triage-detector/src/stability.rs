//! Stability detection: is a staged file safe to move yet?
//!
//! A file is unstable when any of these holds, checked in order:
//! 1. its extension is a known partial-download suffix;
//! 2. it was modified within the quiescence window (future mtimes count);
//! 3. a non-blocking exclusive lock probe fails, or the probe itself errors.
//!
//! Every failure to look at the file is reported as unstable (fail-closed).

use std::collections::HashSet;
use std::fmt;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};

use fs2::FileExt;

pub const DEFAULT_QUIESCENCE: Duration = Duration::from_secs(30);

pub const DEFAULT_PARTIAL_EXTENSIONS: &[&str] =
    &["download", "tmp", "part", "crdownload", "partial"];

/// Verdict of a stability check, with the reason when unstable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    /// Extension is on the partial-download denylist.
    PartialExtension,
    /// Modified within the quiescence window.
    RecentlyModified,
    /// Another process holds a lock on the file.
    Locked,
    /// The file could not be stat'ed, opened or probed.
    ProbeFailed,
}

impl Stability {
    pub fn is_stable(self) -> bool {
        matches!(self, Stability::Stable)
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stability::Stable => write!(f, "stable"),
            Stability::PartialExtension => write!(f, "partial download"),
            Stability::RecentlyModified => write!(f, "recently modified"),
            Stability::Locked => write!(f, "locked by another process"),
            Stability::ProbeFailed => write!(f, "probe failed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StabilityDetector {
    partial_extensions: HashSet<String>,
    quiescence: Duration,
}

impl Default for StabilityDetector {
    fn default() -> Self {
        Self::new(DEFAULT_PARTIAL_EXTENSIONS, DEFAULT_QUIESCENCE)
    }
}

impl StabilityDetector {
    /// Extensions are matched case-insensitively; a leading dot is ignored.
    pub fn new<I, S>(partial_extensions: I, quiescence: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let partial_extensions = partial_extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self {
            partial_extensions,
            quiescence,
        }
    }

    pub fn quiescence(&self) -> Duration {
        self.quiescence
    }

    pub fn is_stable(&self, path: &Path) -> bool {
        self.check(path, SystemTime::now()).is_stable()
    }

    /// Evaluate `path` as of `now`.
    pub fn check(&self, path: &Path, now: SystemTime) -> Stability {
        if self.has_partial_extension(path) {
            return Stability::PartialExtension;
        }

        let modified = match std::fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(_) => return Stability::ProbeFailed,
        };
        match now.duration_since(modified) {
            Ok(age) if age >= self.quiescence => {}
            _ => return Stability::RecentlyModified,
        }

        probe_lock(path)
    }

    fn has_partial_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.partial_extensions.contains(&ext.to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

/// Take and immediately release a non-blocking exclusive lock.
fn probe_lock(path: &Path) -> Stability {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(_) => return Stability::ProbeFailed,
    };
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            Stability::Stable
        }
        Err(err)
            if err.kind() == ErrorKind::WouldBlock
                || err.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
        {
            Stability::Locked
        }
        Err(_) => Stability::ProbeFailed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
