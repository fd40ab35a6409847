//! `triage config` — create, show and locate the configuration file.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use triage_core::config as core_config;
use triage_core::{Config, OriginSourceKind};

use super::Globals;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write the default configuration.
    Init {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration and routing table.
    Show,
    /// Print the configuration file location.
    Path,
}

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "match")]
    matcher: String,
    #[tabled(rename = "destination")]
    destination: String,
    #[tabled(rename = "naming")]
    naming: String,
}

pub fn run(command: ConfigCommand, globals: &Globals) -> Result<()> {
    match command {
        ConfigCommand::Init { force } => {
            let path = globals.config_path();
            core_config::init_to(&path, force)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("✓ wrote default config: {}", path.display());
        }
        ConfigCommand::Show => {
            let config = globals.load_config()?;
            print_config(&config, globals)?;
        }
        ConfigCommand::Path => println!("{}", globals.config_path().display()),
    }
    Ok(())
}

fn print_config(config: &Config, globals: &Globals) -> Result<()> {
    let path = globals.config_path();
    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    };
    let sources: Vec<&str> = config
        .origin_sources
        .iter()
        .map(|kind| match kind {
            OriginSourceKind::Mdls => "mdls",
            OriginSourceKind::Xattr => "xattr",
        })
        .collect();
    let signatures: Vec<String> = config
        .signatures
        .iter()
        .map(|sig| match &sig.value {
            Some(value) => format!("{}={} → {}", sig.key, value, sig.tool),
            None => format!("{} → {}", sig.key, sig.tool),
        })
        .collect();

    println!("{:<20}{source}", "config".bold());
    println!(
        "{:<20}{}",
        "staging".bold(),
        config.staging_dir(globals.home()).display()
    );
    println!("{:<20}{}s", "interval".bold(), config.interval_secs);
    println!("{:<20}{}s", "quiescence".bold(), config.quiescence_secs);
    println!(
        "{:<20}{}",
        "partial extensions".bold(),
        config.partial_extensions.join(", ")
    );
    println!("{:<20}{}", "prune empty".bold(), config.prune_empty);
    println!("{:<20}{}", "watch".bold(), config.watch);
    println!("{:<20}{}", "origin sources".bold(), sources.join(", "));
    println!("{:<20}{}", "signatures".bold(), signatures.join("; "));

    let table = config
        .routing_table(globals.home())
        .context("invalid routing rules")?;
    if table.is_empty() {
        println!("No routing rules: every file stays in the staging directory.");
        return Ok(());
    }

    let rows: Vec<RuleRow> = table
        .rules()
        .iter()
        .enumerate()
        .map(|(i, rule)| RuleRow {
            index: i + 1,
            matcher: rule.matcher.to_string(),
            destination: rule.destination.display().to_string(),
            naming: rule.naming.to_string(),
        })
        .collect();
    let mut rendered = Table::new(rows);
    rendered.with(Style::rounded());
    println!("{rendered}");
    Ok(())
}
