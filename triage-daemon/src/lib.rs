//! Daemon runtime: periodic triage cycles, change-notification nudges, log
//! rotation and launchd integration.

mod error;
pub mod launchd;
pub mod log_rotation;
pub mod paths;
mod runtime;

pub use error::DaemonError;
pub use launchd::{generate_plist, install as install_launchd, uninstall as uninstall_launchd};
pub use runtime::{init_tracing, run, start_blocking};
