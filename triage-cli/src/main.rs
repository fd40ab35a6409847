//! Triage — sort a download folder by where each file came from.
//!
//! # Usage
//!
//! ```text
//! triage sort [--dry-run] [--json]
//! triage inspect <file>
//! triage config init [--force] | show | path
//! triage daemon start|install|uninstall|logs
//! ```
//!
//! `--config <path>` replaces `~/.triage/config.yaml` for any command.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, inspect::InspectArgs, sort::SortArgs, Globals,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "triage",
    version,
    about = "Route downloaded files into folders by origin",
    long_about = None,
)]
struct Cli {
    /// Config file to use instead of ~/.triage/config.yaml.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one triage cycle over the staging directory.
    Sort(SortArgs),

    /// Explain what triage would do with one file, without touching it.
    Inspect(InspectArgs),

    /// Create, show or locate the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Run the periodic daemon or manage its launchd agent.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let globals = Globals::new(cli.config)?;

    // The daemon installs its own subscriber on stdout for launchd.
    if !matches!(
        cli.command,
        Commands::Daemon {
            command: DaemonCommand::Start
        }
    ) {
        init_cli_tracing();
    }

    match cli.command {
        Commands::Sort(args) => args.run(&globals),
        Commands::Inspect(args) => args.run(&globals),
        Commands::Config { command } => commands::config::run(command, &globals),
        Commands::Daemon { command } => commands::daemon::run(command, &globals),
    }
}

/// Warnings and errors on stderr so `--json` output stays parseable.
fn init_cli_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
