//! `triage sort` — run exactly one cycle in the foreground.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use triage_sort::{CycleReport, Placement};

use super::Globals;

/// Arguments for `triage sort`.
#[derive(Args, Debug)]
pub struct SortArgs {
    /// Report what would happen without moving or deleting anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the cycle report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl SortArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let triage = globals.triage()?;
        let report = triage.run_cycle(self.dry_run).with_context(|| {
            format!(
                "failed to scan staging directory {}",
                triage.staging_dir().display()
            )
        })?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize report")?
            );
            return Ok(());
        }

        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &CycleReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };

    if report.processed == 0 {
        println!("{prefix}✓ nothing to triage");
        return;
    }

    let status = if report.failed > 0 {
        "!".yellow().to_string()
    } else {
        "✓".green().to_string()
    };
    println!("{prefix}{status} {report}");

    for placement in &report.placements {
        match placement {
            Placement::Moved { from, to } => {
                println!("  →  {} -> {}", from.display(), to.display())
            }
            Placement::WouldMove { from, to } => {
                println!("  ~  {} -> {}", from.display(), to.display())
            }
            Placement::RemovedDuplicate { removed, existing }
            | Placement::WouldRemoveDuplicate { removed, existing } => println!(
                "  =  {} (duplicate of {})",
                removed.display(),
                existing.display()
            ),
            Placement::SkippedNoMatch { path } => {
                println!("  ·  {}", path.display().to_string().bright_black())
            }
        }
    }
    for dir in &report.pruned {
        println!("  ✗  {} (empty, removed)", dir.display());
    }
}
