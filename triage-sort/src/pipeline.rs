//! One triage cycle, shared by `triage sort` and the daemon loop.
//!
//! enumerate → stability → provenance → route → place → prune

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;

use triage_core::{CandidateFile, Config, ProvenanceRecord, RoutingRule, RoutingTable};
use triage_detector::{ProvenanceResolver, Stability, StabilityDetector};

use crate::error::{io_err, SortError};
use crate::placement::{ConflictResolver, Placement};
use crate::prune::prune_empty_dirs;

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Counters and decisions from one cycle.
///
/// `processed` counts every candidate looked at, so it always equals the sum
/// of the other five counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub processed: usize,
    pub moved: usize,
    pub duplicates: usize,
    pub unmatched: usize,
    /// Unstable files, left for a later cycle.
    pub skipped: usize,
    pub failed: usize,
    pub placements: Vec<Placement>,
    pub pruned: Vec<PathBuf>,
    pub duration_ms: u64,
}

impl CycleReport {
    fn new(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            dry_run,
            processed: 0,
            moved: 0,
            duplicates: 0,
            unmatched: 0,
            skipped: 0,
            failed: 0,
            placements: Vec::new(),
            pruned: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Whether the cycle changed (or would change) anything on disk.
    pub fn is_idle(&self) -> bool {
        self.moved == 0 && self.duplicates == 0 && self.pruned.is_empty()
    }

    fn record(&mut self, placement: Placement) {
        if placement.is_move() {
            self.moved += 1;
        } else if placement.is_duplicate() {
            self.duplicates += 1;
        } else {
            self.unmatched += 1;
        }
        self.placements.push(placement);
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {}: moved {}, duplicates {}, unmatched {}, skipped {}, failed {}",
            self.processed, self.moved, self.duplicates, self.unmatched, self.skipped, self.failed
        )?;
        if !self.pruned.is_empty() {
            write!(f, ", pruned {}", self.pruned.len())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// Everything the engine would decide about one file, computed without side
/// effects.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub path: PathBuf,
    pub stability: Stability,
    pub provenance: ProvenanceRecord,
    pub rule: Option<RoutingRule>,
    /// Dry-run placement; `None` when no rule matched.
    pub placement: Option<Placement>,
}

// ---------------------------------------------------------------------------
// Triage
// ---------------------------------------------------------------------------

/// The triage engine: immutable configuration plus its collaborators.
#[derive(Debug)]
pub struct Triage {
    staging_dir: PathBuf,
    detector: StabilityDetector,
    resolver: ProvenanceResolver,
    table: RoutingTable,
    prune_empty: bool,
}

impl Triage {
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        detector: StabilityDetector,
        resolver: ProvenanceResolver,
        table: RoutingTable,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            detector,
            resolver,
            table,
            prune_empty: true,
        }
    }

    pub fn with_prune(mut self, prune_empty: bool) -> Self {
        self.prune_empty = prune_empty;
        self
    }

    /// Build the engine from a validated config, expanding `~/` against `home`.
    pub fn from_config(config: &Config, home: &Path) -> Result<Self, SortError> {
        config.validate()?;
        let detector = StabilityDetector::new(&config.partial_extensions, config.quiescence());
        let resolver = ProvenanceResolver::from_config(config);
        let table = config.routing_table(home)?;
        Ok(Self::new(config.staging_dir(home), detector, resolver, table)
            .with_prune(config.prune_empty))
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn resolver(&self) -> &ProvenanceResolver {
        &self.resolver
    }

    /// Evaluate every candidate in the staging directory once.
    ///
    /// Per-file failures are logged and counted; only a staging directory
    /// that exists but cannot be listed is an error.
    pub fn run_cycle(&self, dry_run: bool) -> Result<CycleReport, SortError> {
        let clock = Instant::now();
        let mut report = CycleReport::new(dry_run);

        let candidates = match list_candidates(&self.staging_dir) {
            Ok(candidates) => candidates,
            Err(SortError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    "staging directory does not exist: {}",
                    self.staging_dir.display()
                );
                return Ok(report);
            }
            Err(err) => return Err(err),
        };

        let placer = if dry_run {
            ConflictResolver::dry_run()
        } else {
            ConflictResolver::new()
        };

        for candidate in &candidates {
            report.processed += 1;
            let path = candidate.path.as_path();

            let stability = self.detector.check(path, SystemTime::now());
            if !stability.is_stable() {
                tracing::debug!("skipped ({stability}): {}", path.display());
                report.skipped += 1;
                continue;
            }

            let provenance = self.resolver.resolve(path);
            let Some(route) = self.table.route(provenance.as_slice()) else {
                tracing::debug!("no matching rule: {}", path.display());
                report.record(Placement::SkippedNoMatch {
                    path: path.to_path_buf(),
                });
                continue;
            };
            tracing::debug!("{} matched {} via {}", path.display(), route.rule.matcher, route.origin);

            match placer.place(path, route.rule, provenance.as_slice()) {
                Ok(placement) => {
                    if dry_run {
                        tracing::info!("[dry-run] {}", describe(&placement));
                    }
                    report.record(placement);
                }
                Err(err) => {
                    tracing::warn!("failed to place {}: {err}", path.display());
                    report.failed += 1;
                }
            }
        }

        if self.prune_empty && !dry_run {
            let staging = self.staging_dir.as_path();
            report.pruned = prune_empty_dirs(
                self.table
                    .destinations()
                    .into_iter()
                    .filter(|dir| *dir != staging),
            );
        }

        report.duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        if report.is_idle() {
            tracing::debug!("cycle complete: {report}");
        } else {
            tracing::info!("cycle complete: {report}");
        }
        Ok(report)
    }

    /// Explain what a cycle would do with `path`, touching nothing.
    pub fn inspect(&self, path: &Path) -> Result<Inspection, SortError> {
        let stability = self.detector.check(path, SystemTime::now());
        let provenance = self.resolver.resolve(path);
        let route = self.table.route(provenance.as_slice());
        let rule = route.as_ref().map(|route| route.rule.clone());
        let placement = match &rule {
            Some(rule) => Some(ConflictResolver::dry_run().place(
                path,
                rule,
                provenance.as_slice(),
            )?),
            None => None,
        };
        Ok(Inspection {
            path: path.to_path_buf(),
            stability,
            provenance,
            rule,
            placement,
        })
    }
}

fn describe(placement: &Placement) -> String {
    match placement {
        Placement::Moved { from, to } | Placement::WouldMove { from, to } => {
            format!("move {} -> {}", from.display(), to.display())
        }
        Placement::RemovedDuplicate { removed, existing }
        | Placement::WouldRemoveDuplicate { removed, existing } => {
            format!(
                "remove duplicate {} (same as {})",
                removed.display(),
                existing.display()
            )
        }
        Placement::SkippedNoMatch { path } => format!("no match {}", path.display()),
    }
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

/// Regular, non-hidden files directly inside `staging`, sorted by name.
///
/// Symlinks and directories are ignored. Entries that vanish while being
/// listed are dropped silently.
pub fn list_candidates(staging: &Path) -> Result<Vec<CandidateFile>, SortError> {
    let entries = fs::read_dir(staging).map_err(|e| io_err(staging, e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!("unreadable entry in {}: {err}", staging.display());
                continue;
            }
        };
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        match entry.file_type() {
            Ok(kind) if kind.is_file() => {}
            _ => continue,
        }
        if let Ok(candidate) = CandidateFile::from_path(&entry.path()) {
            candidates.push(candidate);
        }
    }
    candidates.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(candidates)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
