//! End-to-end cycles over a temp staging directory with a scripted origin source.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

use triage_core::{Matcher, NamingScheme, RoutingRule, RoutingTable};
use triage_detector::{OriginSource, ProvenanceError, ProvenanceResolver, StabilityDetector};
use triage_sort::{hashing::hash_file, Placement, Triage};

/// Reports configured URLs by file name; unknown files have no origins.
struct ScriptedOrigins(HashMap<String, Vec<String>>);

impl ScriptedOrigins {
    fn new(entries: &[(&str, &str)]) -> Self {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, url) in entries {
            map.entry(name.to_string()).or_default().push(url.to_string());
        }
        Self(map)
    }
}

impl OriginSource for ScriptedOrigins {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn where_froms(&self, path: &Path) -> Result<Vec<String>, ProvenanceError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        Ok(self.0.get(name).cloned().unwrap_or_default())
    }
}

struct Fixture {
    _root: TempDir,
    staging: PathBuf,
    illustration: PathBuf,
    twitter: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let staging = root.path().join("Downloads");
        fs::create_dir(&staging).unwrap();
        Self {
            illustration: staging.join("Illustration"),
            twitter: staging.join("Twitter"),
            staging,
            _root: root,
        }
    }

    fn table(&self) -> RoutingTable {
        RoutingTable::new(vec![
            RoutingRule::new(Matcher::domain("gelbooru.com"), &self.illustration),
            RoutingRule::new(Matcher::domain("x.com"), &self.twitter)
                .with_naming(NamingScheme::StatusPost),
        ])
    }

    fn triage(&self, origins: &[(&str, &str)]) -> Triage {
        Triage::new(
            &self.staging,
            StabilityDetector::default(),
            ProvenanceResolver::new().with_source(ScriptedOrigins::new(origins)),
            self.table(),
        )
    }

    /// A staged file last modified `age` ago.
    fn stage(&self, name: &str, content: &[u8], age: Duration) -> PathBuf {
        let path = self.staging.join(name);
        fs::write(&path, content).unwrap();
        set_file_mtime(&path, FileTime::from_system_time(SystemTime::now() - age)).unwrap();
        path
    }

    fn settled(&self, name: &str, content: &[u8]) -> PathBuf {
        self.stage(name, content, Duration::from_secs(35))
    }
}

const GELBOORU: &str = "https://gelbooru.com/post/1";

#[test]
fn routed_file_lands_under_its_own_name() {
    let fx = Fixture::new();
    let src = fx.settled("photo.png", b"pixels");

    let report = fx.triage(&[("photo.png", GELBOORU)]).run_cycle(false).unwrap();

    assert_eq!(report.moved, 1);
    assert!(!src.exists());
    assert_eq!(fs::read(fx.illustration.join("photo.png")).unwrap(), b"pixels");
}

#[test]
fn name_clash_with_different_content_gets_hash_suffix() {
    let fx = Fixture::new();
    fs::create_dir(&fx.illustration).unwrap();
    fs::write(fx.illustration.join("photo.png"), b"someone else").unwrap();
    let src = fx.settled("photo.png", b"pixels");
    let hash = hash_file(&src).unwrap();

    let report = fx.triage(&[("photo.png", GELBOORU)]).run_cycle(false).unwrap();

    assert_eq!(report.moved, 1);
    let renamed = fx.illustration.join(format!("photo_{hash}.png"));
    assert_eq!(fs::read(renamed).unwrap(), b"pixels");
    assert_eq!(
        fs::read(fx.illustration.join("photo.png")).unwrap(),
        b"someone else"
    );
}

#[test]
fn identical_content_is_collapsed() {
    let fx = Fixture::new();
    fs::create_dir(&fx.illustration).unwrap();
    fs::write(fx.illustration.join("photo.png"), b"pixels").unwrap();
    let src = fx.settled("photo.png", b"pixels");

    let report = fx.triage(&[("photo.png", GELBOORU)]).run_cycle(false).unwrap();

    assert_eq!(report.duplicates, 1);
    assert_eq!(report.moved, 0);
    assert!(!src.exists());
    assert_eq!(fs::read_dir(&fx.illustration).unwrap().count(), 1);
}

#[test]
fn status_urls_synthesize_structured_names() {
    let fx = Fixture::new();
    fx.settled("GxA.jpg", b"second photo");
    fx.settled("GxB.jpg", b"only photo");

    let report = fx
        .triage(&[
            ("GxA.jpg", "https://x.com/alice/status/123/photo/2"),
            ("GxB.jpg", "https://x.com/alice/status/456"),
        ])
        .run_cycle(false)
        .unwrap();

    assert_eq!(report.moved, 2);
    assert!(fx.twitter.join("[alice][123][2].jpg").exists());
    assert!(fx.twitter.join("[alice][456][1].jpg").exists());
}

#[test]
fn unstable_files_are_never_moved() {
    let fx = Fixture::new();
    let partial = fx.stage("movie.mp4.crdownload", b"half", Duration::from_secs(86_400));
    let fresh = fx.stage("fresh.png", b"new", Duration::from_secs(5));

    let report = fx
        .triage(&[
            ("movie.mp4.crdownload", GELBOORU),
            ("fresh.png", GELBOORU),
        ])
        .run_cycle(false)
        .unwrap();

    assert_eq!(report.skipped, 2);
    assert_eq!(report.moved, 0);
    assert!(partial.exists());
    assert!(fresh.exists());
}

#[test]
fn unmatched_file_stays_and_is_not_a_failure() {
    let fx = Fixture::new();
    let src = fx.settled("notes.txt", b"hello");

    let report = fx
        .triage(&[("notes.txt", "https://example.com/notes.txt")])
        .run_cycle(false)
        .unwrap();

    assert_eq!(report.unmatched, 1);
    assert_eq!(report.failed, 0);
    assert!(src.exists());
    assert_eq!(
        report.placements,
        vec![Placement::SkippedNoMatch { path: src }]
    );
}

#[test]
fn settled_directory_produces_no_moves_on_second_cycle() {
    let fx = Fixture::new();
    fx.settled("photo.png", b"pixels");
    fx.settled("notes.txt", b"hello");
    let triage = fx.triage(&[("photo.png", GELBOORU)]);

    let first = triage.run_cycle(false).unwrap();
    let second = triage.run_cycle(false).unwrap();

    assert_eq!(first.moved, 1);
    assert_eq!(second.moved, 0);
    assert_eq!(second.duplicates, 0);
    assert_eq!(second.processed, 1, "only the unmatched file remains");
}

#[test]
fn empty_destinations_are_pruned_after_a_cycle() {
    let fx = Fixture::new();
    fs::create_dir(&fx.twitter).unwrap();
    fs::create_dir(&fx.illustration).unwrap();
    fx.settled("photo.png", b"pixels");

    let report = fx.triage(&[("photo.png", GELBOORU)]).run_cycle(false).unwrap();

    assert_eq!(report.pruned, vec![fx.twitter.clone()]);
    assert!(!fx.twitter.exists());
    assert!(fx.illustration.exists());
}

#[test]
fn pruning_can_be_disabled() {
    let fx = Fixture::new();
    fs::create_dir(&fx.twitter).unwrap();

    let report = fx.triage(&[]).with_prune(false).run_cycle(false).unwrap();

    assert!(report.pruned.is_empty());
    assert!(fx.twitter.exists());
}

#[test]
fn dry_run_reports_without_changing_anything() {
    let fx = Fixture::new();
    let src = fx.settled("photo.png", b"pixels");
    fs::create_dir(&fx.twitter).unwrap();

    let report = fx.triage(&[("photo.png", GELBOORU)]).run_cycle(true).unwrap();

    assert!(report.dry_run);
    assert_eq!(
        report.placements,
        vec![Placement::WouldMove {
            from: src.clone(),
            to: fx.illustration.join("photo.png"),
        }]
    );
    assert!(src.exists());
    assert!(!fx.illustration.exists());
    assert!(fx.twitter.exists(), "dry-run never prunes");
}

#[test]
fn inspect_explains_a_routed_file() {
    let fx = Fixture::new();
    let src = fx.settled("photo.png", b"pixels");

    let inspection = fx.triage(&[("photo.png", GELBOORU)]).inspect(&src).unwrap();

    assert!(inspection.stability.is_stable());
    assert_eq!(inspection.provenance.len(), 1);
    assert_eq!(
        inspection.rule.map(|rule| rule.destination),
        Some(fx.illustration.clone())
    );
    assert_eq!(
        inspection.placement.and_then(|p| p.destination().map(Path::to_path_buf)),
        Some(fx.illustration.join("photo.png"))
    );
    assert!(src.exists());
}

#[test]
fn report_serialises_with_kebab_case_actions() {
    let fx = Fixture::new();
    fx.settled("photo.png", b"pixels");

    let report = fx.triage(&[("photo.png", GELBOORU)]).run_cycle(true).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["moved"], 1);
    assert_eq!(json["placements"][0]["action"], "would-move");
}
