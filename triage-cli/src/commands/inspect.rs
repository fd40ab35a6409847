//! `triage inspect` — explain the decision for a single file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use triage_detector::Stability;
use triage_sort::{Inspection, Placement};

use super::Globals;

/// Arguments for `triage inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// File to inspect.
    pub file: PathBuf,
}

impl InspectArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        if !self.file.is_file() {
            bail!("not a regular file: {}", self.file.display());
        }
        let path = std::fs::canonicalize(&self.file)
            .with_context(|| format!("failed to resolve {}", self.file.display()))?;

        let triage = globals.triage()?;
        let inspection = triage
            .inspect(&path)
            .with_context(|| format!("failed to inspect {}", path.display()))?;
        print_inspection(&inspection);
        Ok(())
    }
}

fn print_inspection(inspection: &Inspection) {
    println!("{:<12}{}", "file", inspection.path.display());

    let stability = match inspection.stability {
        Stability::Stable => inspection.stability.to_string().green(),
        Stability::PartialExtension | Stability::RecentlyModified | Stability::Locked => {
            inspection.stability.to_string().yellow()
        }
        Stability::ProbeFailed => inspection.stability.to_string().red(),
    };
    println!("{:<12}{stability}", "stability");

    if inspection.provenance.is_empty() {
        println!("{:<12}{}", "provenance", "(none)".bright_black());
    } else {
        for (i, origin) in inspection.provenance.iter().enumerate() {
            let label = if i == 0 { "provenance" } else { "" };
            println!("{label:<12}{origin}");
        }
    }

    match &inspection.rule {
        Some(rule) => println!(
            "{:<12}{} -> {} ({})",
            "rule",
            rule.matcher,
            rule.destination.display(),
            rule.naming
        ),
        None => println!("{:<12}{}", "rule", "no match, file stays".bright_black()),
    }

    match &inspection.placement {
        Some(Placement::WouldMove { to, .. }) => {
            println!("{:<12}{}", "destination", to.display())
        }
        Some(Placement::WouldRemoveDuplicate { existing, .. }) => println!(
            "{:<12}duplicate of {}, would be removed",
            "destination",
            existing.display()
        ),
        Some(other) => println!("{:<12}{other:?}", "destination"),
        None => {}
    }

    if !inspection.stability.is_stable() && inspection.placement.is_some() {
        println!(
            "{}",
            "not stable yet: a cycle would leave this file alone for now".yellow()
        );
    }
}
