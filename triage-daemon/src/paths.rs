use std::path::{Path, PathBuf};
use std::time::Duration;

use triage_core::config::TRIAGE_DIR;

pub const DAEMON_LABEL: &str = "dev.triage.daemon";

/// Repeated notifications for one path inside this window count once.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";

pub fn triage_root(home: &Path) -> PathBuf {
    home.join(TRIAGE_DIR)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    triage_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}

pub fn launch_agents_dir(home: &Path) -> PathBuf {
    home.join("Library").join("LaunchAgents")
}

pub fn launchd_plist_path(home: &Path) -> PathBuf {
    launch_agents_dir(home).join(format!("{DAEMON_LABEL}.plist"))
}
