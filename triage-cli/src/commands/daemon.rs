//! `triage daemon` — foreground loop, launchd agent and log access.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use triage_daemon::paths::{stderr_log_path, stdout_log_path};
use triage_daemon::{install_launchd, start_blocking, uninstall_launchd};

use super::Globals;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the periodic triage loop in the foreground until ctrl-c.
    Start,
    /// Install and bootstrap the launchd agent.
    Install,
    /// Boot out and remove the launchd agent.
    Uninstall,
    /// Print recent daemon log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the stderr log file.
    #[arg(long)]
    pub stderr_only: bool,
}

pub fn run(command: DaemonCommand, globals: &Globals) -> Result<()> {
    let home = globals.home();

    match command {
        DaemonCommand::Start => {
            let config = globals.load_config()?;
            start_blocking(home, config).context("daemon exited with error")?;
        }
        DaemonCommand::Install => {
            let binary = std::env::current_exe().context("could not locate triage binary")?;
            let config = match &globals.config {
                Some(path) => Some(
                    std::fs::canonicalize(path)
                        .with_context(|| format!("config not found: {}", path.display()))?,
                ),
                None => None,
            };
            let plist = install_launchd(home, &binary, config.as_deref())
                .context("failed to install launchd service")?;
            println!("installed launchd service: {}", plist.display());
        }
        DaemonCommand::Uninstall => {
            uninstall_launchd(home).context("failed to uninstall launchd service")?;
            println!("uninstalled launchd service");
        }
        DaemonCommand::Logs(args) => {
            if !args.stderr_only {
                print_tail(&stdout_log_path(home), args.lines)
                    .context("failed to read daemon stdout log")?;
            }
            print_tail(&stderr_log_path(home), args.lines)
                .context("failed to read daemon stderr log")?;
        }
    }

    Ok(())
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut tail = VecDeque::<String>::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if lines == 0 {
            continue;
        }
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}
