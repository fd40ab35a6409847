//! Conflict-free placement of a routed file.
//!
//! ## `place` — collision loop
//!
//! 1. Ensure the destination directory exists.
//! 2. Pick the candidate name: source name, or a structured
//!    `[author][id][n]` name for status-post rules.
//! 3. While the candidate exists, hash both files (the source at most once):
//!    equal → drop the source as a duplicate; different → retry with the
//!    source hash appended to the name.
//! 4. Move with no-clobber semantics. A destination that appears between the
//!    check and the move sends the loop around again.
//!
//! Hashing only happens on a collision, so the common case costs one `stat`.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use serde::Serialize;

use triage_core::{
    naming::join_extension, parse_status_post, NamingScheme, OriginId, RoutingRule, StatusPost,
};

use crate::error::{io_err, SortError};
use crate::hashing::hash_file;

/// Upper bound on renamed candidates tried for one file.
const MAX_ATTEMPTS: u32 = 64;

// ---------------------------------------------------------------------------
// Placement result
// ---------------------------------------------------------------------------

/// Outcome of evaluating one staged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Placement {
    /// File was moved into its destination.
    Moved { from: PathBuf, to: PathBuf },
    /// Dry-run: the file *would* have been moved.
    WouldMove { from: PathBuf, to: PathBuf },
    /// Identical content already existed; the staged copy was deleted.
    RemovedDuplicate { removed: PathBuf, existing: PathBuf },
    /// Dry-run: the staged copy *would* have been deleted as a duplicate.
    WouldRemoveDuplicate { removed: PathBuf, existing: PathBuf },
    /// No routing rule matched; the file stays where it is.
    SkippedNoMatch { path: PathBuf },
}

impl Placement {
    pub fn is_move(&self) -> bool {
        matches!(self, Placement::Moved { .. } | Placement::WouldMove { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Placement::RemovedDuplicate { .. } | Placement::WouldRemoveDuplicate { .. }
        )
    }

    /// The file that ended up (or would end up) holding the content.
    pub fn destination(&self) -> Option<&Path> {
        match self {
            Placement::Moved { to, .. } | Placement::WouldMove { to, .. } => Some(to),
            Placement::RemovedDuplicate { existing, .. }
            | Placement::WouldRemoveDuplicate { existing, .. } => Some(existing),
            Placement::SkippedNoMatch { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate names
// ---------------------------------------------------------------------------

/// The name a file is placed under, before and after hash qualification.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CandidateName {
    Plain {
        file_name: String,
        stem: String,
        extension: String,
    },
    Structured {
        post: StatusPost,
        extension: String,
    },
}

impl CandidateName {
    fn for_source(
        source: &Path,
        naming: NamingScheme,
        origins: &[OriginId],
    ) -> Result<Self, SortError> {
        let file_name = source
            .file_name()
            .ok_or_else(|| SortError::NoFileName {
                path: source.to_path_buf(),
            })?
            .to_str()
            .ok_or_else(|| SortError::NonUtf8Name {
                path: source.to_path_buf(),
            })?
            .to_string();
        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_string();

        if naming == NamingScheme::StatusPost {
            let post = origins
                .iter()
                .filter_map(OriginId::as_url)
                .find_map(parse_status_post);
            if let Some(post) = post {
                return Ok(CandidateName::Structured { post, extension });
            }
        }

        let stem = source
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&file_name)
            .to_string();
        Ok(CandidateName::Plain {
            file_name,
            stem,
            extension,
        })
    }

    fn initial(&self) -> String {
        match self {
            CandidateName::Plain { file_name, .. } => file_name.clone(),
            CandidateName::Structured { post, extension } => post.file_name(extension),
        }
    }

    /// Name for the `attempt`-th collision (1-based).
    ///
    /// Plain: `<stem>_<hash>.<ext>`; structured: `[a][id][n][<hash>].<ext>`.
    /// From the second attempt on a counter is added: `_<hash>_2`, `[<hash>]_2`.
    fn qualified(&self, hash: &str, attempt: u32) -> String {
        let counter = if attempt > 1 {
            format!("_{attempt}")
        } else {
            String::new()
        };
        match self {
            CandidateName::Plain {
                stem, extension, ..
            } => join_extension(format!("{stem}_{hash}{counter}"), extension),
            CandidateName::Structured { post, extension } => {
                join_extension(format!("{}[{hash}]{counter}", post.stem()), extension)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ConflictResolver
// ---------------------------------------------------------------------------

/// Computes the final destination of a routed file and performs the move.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    dry_run: bool,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver that reports decisions without touching the filesystem.
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Place `source` according to `rule`. `origins` feed structured naming.
    pub fn place(
        &self,
        source: &Path,
        rule: &RoutingRule,
        origins: &[OriginId],
    ) -> Result<Placement, SortError> {
        let dir = rule.destination.as_path();
        if !self.dry_run {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let name = CandidateName::for_source(source, rule.naming, origins)?;
        let mut candidate = dir.join(name.initial());
        let mut source_hash: Option<String> = None;
        let mut attempt = 0u32;

        loop {
            match occupant(&candidate)? {
                Occupant::Vacant => {
                    if self.dry_run {
                        return Ok(Placement::WouldMove {
                            from: source.to_path_buf(),
                            to: candidate,
                        });
                    }
                    match move_no_clobber(source, &candidate) {
                        Ok(()) => {
                            tracing::info!(
                                "moved: {} -> {}",
                                source.display(),
                                candidate.display()
                            );
                            return Ok(Placement::Moved {
                                from: source.to_path_buf(),
                                to: candidate,
                            });
                        }
                        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                            tracing::debug!(
                                path = %candidate.display(),
                                "destination appeared, retrying"
                            );
                        }
                        Err(err) => return Err(io_err(&candidate, err)),
                    }
                }
                Occupant::RegularFile => {
                    if is_same_file(source, &candidate) {
                        return Err(SortError::AlreadyInPlace {
                            path: source.to_path_buf(),
                        });
                    }
                    let hash = source_digest(source, &mut source_hash)?;
                    if hash_file(&candidate)? == hash {
                        return self.discard_duplicate(source, candidate);
                    }
                    candidate = dir.join(name.qualified(&hash, attempt + 1));
                }
                // Directories, symlinks (dangling or not) and other special
                // entries never match; the name is simply taken.
                Occupant::Other => {
                    let hash = source_digest(source, &mut source_hash)?;
                    candidate = dir.join(name.qualified(&hash, attempt + 1));
                }
            }

            attempt += 1;
            if attempt > MAX_ATTEMPTS {
                return Err(SortError::NameExhausted {
                    dir: dir.to_path_buf(),
                    name: name.initial(),
                });
            }
        }
    }

    fn discard_duplicate(&self, source: &Path, existing: PathBuf) -> Result<Placement, SortError> {
        if self.dry_run {
            return Ok(Placement::WouldRemoveDuplicate {
                removed: source.to_path_buf(),
                existing,
            });
        }
        fs::remove_file(source).map_err(|e| io_err(source, e))?;
        tracing::info!(
            "duplicate removed: {} (same content as {})",
            source.display(),
            existing.display()
        );
        Ok(Placement::RemovedDuplicate {
            removed: source.to_path_buf(),
            existing,
        })
    }
}

// ---------------------------------------------------------------------------
// Moving
// ---------------------------------------------------------------------------

/// What sits at a candidate path, judged without following symlinks.
enum Occupant {
    Vacant,
    RegularFile,
    Other,
}

fn occupant(path: &Path) -> Result<Occupant, SortError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_file() => Ok(Occupant::RegularFile),
        Ok(_) => Ok(Occupant::Other),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Occupant::Vacant),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Hash `source` on first use only.
fn source_digest(source: &Path, cached: &mut Option<String>) -> Result<String, SortError> {
    if let Some(hash) = cached {
        return Ok(hash.clone());
    }
    let hash = hash_file(source)?;
    *cached = Some(hash.clone());
    Ok(hash)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Move `source` to `dest`, failing with `AlreadyExists` instead of replacing.
///
/// Uses a hard link plus unlink where the filesystem allows it; otherwise
/// copies into a hidden sibling of `dest` and renames it into place, so a
/// partially copied file is never visible under the final name.
fn move_no_clobber(source: &Path, dest: &Path) -> io::Result<()> {
    match fs::hard_link(source, dest) {
        Ok(()) => {
            if let Err(err) = fs::remove_file(source) {
                let _ = fs::remove_file(dest);
                return Err(err);
            }
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(err),
        Err(_) => copy_then_rename(source, dest),
    }
}

fn copy_then_rename(source: &Path, dest: &Path) -> io::Result<()> {
    let file_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("incoming");
    let tmp = dest.with_file_name(format!(".{file_name}.triage.tmp"));

    if let Err(err) = fs::copy(source, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    if fs::symlink_metadata(dest).is_ok() {
        let _ = fs::remove_file(&tmp);
        return Err(io::Error::new(
            ErrorKind::AlreadyExists,
            "destination appeared during copy",
        ));
    }
    if let Err(err) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    if let Err(err) = fs::remove_file(source) {
        let _ = fs::remove_file(dest);
        return Err(err);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use triage_core::Matcher;

    fn rule(dest: &Path, naming: NamingScheme) -> RoutingRule {
        RoutingRule::new(Matcher::domain("x.com"), dest).with_naming(naming)
    }

    fn status(url: &str) -> Vec<OriginId> {
        vec![OriginId::Url(url.to_string())]
    }

    #[test]
    fn plain_name_is_kept_on_first_try() {
        let staging = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = staging.path().join("photo.png");
        fs::write(&src, b"one").unwrap();

        let placed = ConflictResolver::new()
            .place(&src, &rule(dest.path(), NamingScheme::Plain), &[])
            .unwrap();
        assert_eq!(
            placed,
            Placement::Moved {
                from: src.clone(),
                to: dest.path().join("photo.png")
            }
        );
        assert!(!src.exists());
        assert_eq!(fs::read(dest.path().join("photo.png")).unwrap(), b"one");
    }

    #[test]
    fn creates_missing_destination_recursively() {
        let staging = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let dest = root.path().join("a").join("b");
        let src = staging.path().join("x.bin");
        fs::write(&src, b"x").unwrap();

        ConflictResolver::new()
            .place(&src, &rule(&dest, NamingScheme::Plain), &[])
            .unwrap();
        assert!(dest.join("x.bin").exists());
    }

    #[test]
    fn structured_name_from_status_url() {
        let staging = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = staging.path().join("GxY12abc.jpg");
        fs::write(&src, b"img").unwrap();

        let placed = ConflictResolver::new()
            .place(
                &src,
                &rule(dest.path(), NamingScheme::StatusPost),
                &status("https://x.com/alice/status/123/photo/2"),
            )
            .unwrap();
        assert_eq!(placed.destination(), Some(dest.path().join("[alice][123][2].jpg").as_path()));
    }

    #[test]
    fn structured_name_uses_first_parsable_origin() {
        let staging = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = staging.path().join("media.png");
        fs::write(&src, b"img").unwrap();

        let origins = vec![
            OriginId::Url("https://pbs.twimg.com/media/abc.png".into()),
            OriginId::Url("https://x.com/bob/status/77".into()),
        ];
        let placed = ConflictResolver::new()
            .place(&src, &rule(dest.path(), NamingScheme::StatusPost), &origins)
            .unwrap();
        assert_eq!(placed.destination(), Some(dest.path().join("[bob][77][1].png").as_path()));
    }

    #[test]
    fn structured_rule_without_status_url_keeps_source_name() {
        let staging = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = staging.path().join("clip.mp4");
        fs::write(&src, b"v").unwrap();

        let placed = ConflictResolver::new()
            .place(
                &src,
                &rule(dest.path(), NamingScheme::StatusPost),
                &status("https://x.com/home"),
            )
            .unwrap();
        assert_eq!(placed.destination(), Some(dest.path().join("clip.mp4").as_path()));
    }

    #[test]
    fn structured_collision_appends_bracketed_hash() {
        let staging = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join("[alice][123][1].jpg"), b"older").unwrap();
        let src = staging.path().join("a.jpg");
        fs::write(&src, b"newer").unwrap();
        let hash = hash_file(&src).unwrap();

        let placed = ConflictResolver::new()
            .place(
                &src,
                &rule(dest.path(), NamingScheme::StatusPost),
                &status("https://x.com/alice/status/123"),
            )
            .unwrap();
        let expected = dest.path().join(format!("[alice][123][1][{hash}].jpg"));
        assert_eq!(placed.destination(), Some(expected.as_path()));
    }

    #[test]
    fn taken_hash_name_falls_back_to_counter() {
        let staging = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = staging.path().join("photo.png");
        fs::write(&src, b"mine").unwrap();
        let hash = hash_file(&src).unwrap();

        fs::write(dest.path().join("photo.png"), b"theirs").unwrap();
        // Someone else's content squatting on our hash-qualified name.
        fs::write(dest.path().join(format!("photo_{hash}.png")), b"edited").unwrap();

        let placed = ConflictResolver::new()
            .place(&src, &rule(dest.path(), NamingScheme::Plain), &[])
            .unwrap();
        let expected = dest.path().join(format!("photo_{hash}_2.png"));
        assert_eq!(placed.destination(), Some(expected.as_path()));
        assert_eq!(fs::read(expected).unwrap(), b"mine");
    }

    #[test]
    fn dry_run_touches_nothing() {
        let staging = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let dest = root.path().join("Illustration");
        let src = staging.path().join("photo.png");
        fs::write(&src, b"one").unwrap();

        let placed = ConflictResolver::dry_run()
            .place(&src, &rule(&dest, NamingScheme::Plain), &[])
            .unwrap();
        assert!(matches!(placed, Placement::WouldMove { .. }));
        assert!(src.exists());
        assert!(!dest.exists(), "dry-run must not create directories");
    }

    #[test]
    fn dry_run_reports_duplicate_without_deleting() {
        let staging = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = staging.path().join("photo.png");
        fs::write(&src, b"same").unwrap();
        fs::write(dest.path().join("photo.png"), b"same").unwrap();

        let placed = ConflictResolver::dry_run()
            .place(&src, &rule(dest.path(), NamingScheme::Plain), &[])
            .unwrap();
        assert!(matches!(placed, Placement::WouldRemoveDuplicate { .. }));
        assert!(src.exists());
    }

    #[test]
    fn copy_fallback_leaves_no_temp_file() {
        let staging = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = staging.path().join("doc.pdf");
        fs::write(&src, b"pdf").unwrap();
        let target = dest.path().join("doc.pdf");

        copy_then_rename(&src, &target).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&target).unwrap(), b"pdf");
        assert!(!dest.path().join(".doc.pdf.triage.tmp").exists());
    }

    #[test]
    fn no_clobber_move_refuses_existing_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a");
        let dest = dir.path().join("b");
        fs::write(&src, b"a").unwrap();
        fs::write(&dest, b"b").unwrap();

        let err = move_no_clobber(&src, &dest).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&dest).unwrap(), b"b");
        assert!(src.exists());
    }

    #[test]
    fn rule_pointing_at_staging_keeps_the_file() {
        let staging = TempDir::new().unwrap();
        let src = staging.path().join("photo.png");
        fs::write(&src, b"one").unwrap();

        let err = ConflictResolver::new()
            .place(&src, &rule(staging.path(), NamingScheme::Plain), &[])
            .unwrap_err();
        assert!(matches!(err, SortError::AlreadyInPlace { .. }));
        assert!(src.exists());
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_at_destination_is_a_collision() {
        let staging = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = staging.path().join("photo.png");
        fs::write(&src, b"pixels").unwrap();
        let hash = hash_file(&src).unwrap();
        std::os::unix::fs::symlink(dest.path().join("gone"), dest.path().join("photo.png"))
            .unwrap();

        let placed = ConflictResolver::new()
            .place(&src, &rule(dest.path(), NamingScheme::Plain), &[])
            .unwrap();
        let expected = dest.path().join(format!("photo_{hash}.png"));
        assert_eq!(placed.destination(), Some(expected.as_path()));
        assert_eq!(fs::read(&expected).unwrap(), b"pixels");
        assert!(fs::symlink_metadata(dest.path().join("photo.png"))
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[test]
    fn directory_at_destination_name_is_a_collision() {
        let staging = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let src = staging.path().join("photo.png");
        fs::write(&src, b"pixels").unwrap();
        let hash = hash_file(&src).unwrap();
        fs::create_dir(dest.path().join("photo.png")).unwrap();

        let placed = ConflictResolver::new()
            .place(&src, &rule(dest.path(), NamingScheme::Plain), &[])
            .unwrap();
        let expected = dest.path().join(format!("photo_{hash}.png"));
        assert_eq!(placed.destination(), Some(expected.as_path()));
        assert!(!src.exists());
    }
}
