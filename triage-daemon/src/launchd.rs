//! macOS launchd agent that keeps `triage daemon start` running per user.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{io_err, DaemonError};
use crate::paths::{
    launch_agents_dir, launchd_plist_path, logs_dir, stderr_log_path, stdout_log_path,
    DAEMON_LABEL,
};

/// Render the agent plist. `config` is forwarded as `--config` when given.
pub fn generate_plist(binary_path: &Path, home: &Path, config: Option<&Path>) -> String {
    let mut args = vec![xml_escape(&binary_path.display().to_string())];
    if let Some(config) = config {
        args.push("--config".to_string());
        args.push(xml_escape(&config.display().to_string()));
    }
    args.push("daemon".to_string());
    args.push("start".to_string());
    let program_arguments: String = args
        .iter()
        .map(|arg| format!("    <string>{arg}</string>\n"))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
{program_arguments}  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  <true/>
  <key>ProcessType</key>
  <string>Background</string>
  <key>StandardOutPath</key>
  <string>{stdout}</string>
  <key>StandardErrorPath</key>
  <string>{stderr}</string>
</dict>
</plist>
"#,
        label = DAEMON_LABEL,
        stdout = xml_escape(&stdout_log_path(home).display().to_string()),
        stderr = xml_escape(&stderr_log_path(home).display().to_string()),
    )
}

/// Write the plist and (re)bootstrap the agent for the current user.
pub fn install(home: &Path, binary_path: &Path, config: Option<&Path>) -> Result<PathBuf, DaemonError> {
    ensure_macos()?;

    let launch_agents = launch_agents_dir(home);
    fs::create_dir_all(&launch_agents).map_err(|e| io_err(&launch_agents, e))?;
    let logs = logs_dir(home);
    fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;

    let plist = launchd_plist_path(home);
    fs::write(&plist, generate_plist(binary_path, home, config)).map_err(|e| io_err(&plist, e))?;

    let domain = launchctl_domain()?;
    let service = format!("{domain}/{DAEMON_LABEL}");

    let _ = run_launchctl(&["bootout", &service], true);
    run_launchctl(&["bootstrap", &domain, &plist.display().to_string()], false)?;
    run_launchctl(&["kickstart", "-k", &service], false)?;

    Ok(plist)
}

/// Boot out the agent and remove its plist. A missing plist is not an error.
pub fn uninstall(home: &Path) -> Result<(), DaemonError> {
    ensure_macos()?;

    let plist = launchd_plist_path(home);
    if plist.exists() {
        let domain = launchctl_domain()?;
        let service = format!("{domain}/{DAEMON_LABEL}");
        let _ = run_launchctl(&["bootout", &service], true);
        fs::remove_file(&plist).map_err(|e| io_err(&plist, e))?;
    }
    Ok(())
}

#[cfg(target_os = "macos")]
fn ensure_macos() -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn ensure_macos() -> Result<(), DaemonError> {
    Err(DaemonError::Launchd(
        "launchd management is only supported on macOS".to_string(),
    ))
}

fn run_launchctl(args: &[&str], ignore_failure: bool) -> Result<(), DaemonError> {
    let output = Command::new("launchctl")
        .args(args)
        .output()
        .map_err(|e| io_err("launchctl", e))?;

    if output.status.success() || ignore_failure {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Err(DaemonError::Launchd(format!(
        "launchctl {} failed (status {}): {} {}",
        args.first().copied().unwrap_or_default(),
        output.status,
        stdout,
        stderr
    )))
}

fn launchctl_domain() -> Result<String, DaemonError> {
    let output = Command::new("id")
        .arg("-u")
        .output()
        .map_err(|e| io_err("id -u", e))?;
    if !output.status.success() {
        return Err(DaemonError::Launchd(format!(
            "failed to resolve current uid (status {})",
            output.status
        )));
    }

    let uid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if uid.is_empty() {
        return Err(DaemonError::Launchd(
            "current uid from `id -u` was empty".to_string(),
        ));
    }
    Ok(format!("gui/{uid}"))
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use plist::Value;

    fn program_arguments(plist: &str) -> Vec<String> {
        let value = Value::from_reader_xml(plist.as_bytes()).expect("parse plist");
        let dict = value.as_dictionary().expect("plist root dict");
        dict.get("ProgramArguments")
            .and_then(Value::as_array)
            .expect("ProgramArguments array")
            .iter()
            .map(|v| v.as_string().expect("program arg as string").to_string())
            .collect()
    }

    #[test]
    fn plist_contains_required_launchd_fields() {
        let home = Path::new("/Users/tester");
        let plist = generate_plist(Path::new("/usr/local/bin/triage"), home, None);

        let value = Value::from_reader_xml(plist.as_bytes()).expect("parse plist");
        let dict = value.as_dictionary().expect("plist root dict");

        assert_eq!(
            dict.get("Label").and_then(Value::as_string),
            Some("dev.triage.daemon")
        );
        assert_eq!(dict.get("RunAtLoad").and_then(Value::as_boolean), Some(true));
        assert_eq!(dict.get("KeepAlive").and_then(Value::as_boolean), Some(true));
        assert_eq!(
            dict.get("StandardOutPath").and_then(Value::as_string),
            Some("/Users/tester/.triage/logs/daemon.log")
        );
        assert_eq!(
            dict.get("StandardErrorPath").and_then(Value::as_string),
            Some("/Users/tester/.triage/logs/daemon-err.log")
        );
        assert_eq!(
            program_arguments(&plist),
            vec!["/usr/local/bin/triage", "daemon", "start"]
        );
    }

    #[test]
    fn config_override_is_forwarded_before_subcommand() {
        let plist = generate_plist(
            Path::new("/opt/triage/bin/triage"),
            Path::new("/Users/tester"),
            Some(Path::new("/Users/tester/triage & co.yaml")),
        );
        assert_eq!(
            program_arguments(&plist),
            vec![
                "/opt/triage/bin/triage",
                "--config",
                "/Users/tester/triage & co.yaml",
                "daemon",
                "start"
            ]
        );
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn install_is_rejected_off_macos() {
        let home = tempfile::TempDir::new().unwrap();
        let err = install(home.path(), Path::new("/usr/local/bin/triage"), None).unwrap_err();
        assert!(matches!(err, DaemonError::Launchd(_)));
        assert!(!launchd_plist_path(home.path()).exists());
    }
}
