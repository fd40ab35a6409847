//! Domain types for the triage engine.
//!
//! Nothing here is persisted: every value is rebuilt from the filesystem on
//! each evaluation and dropped at the end of it.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for an authoring tool (e.g. `NovelAI`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolName(pub String);

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ToolName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ToolName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Origin identifiers
// ---------------------------------------------------------------------------

/// One piece of provenance for a staged file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OriginId {
    /// An `http`/`https` URL the file was obtained from.
    Url(String),
    /// An authoring tool recognised from the file's embedded tags.
    Tool(ToolName),
}

impl OriginId {
    /// Lower-cased host of a URL identifier; `None` for tools and unparsable URLs.
    pub fn host(&self) -> Option<String> {
        match self {
            OriginId::Url(raw) => url::Url::parse(raw)
                .ok()
                .and_then(|u| u.host_str().map(str::to_ascii_lowercase)),
            OriginId::Tool(_) => None,
        }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            OriginId::Url(raw) => Some(raw),
            OriginId::Tool(_) => None,
        }
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginId::Url(raw) => write!(f, "{raw}"),
            OriginId::Tool(tool) => write!(f, "tool:{tool}"),
        }
    }
}

/// Ordered origin identifiers for one file. Order is significant for routing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceRecord(Vec<OriginId>);

impl ProvenanceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `origin` unless an equal identifier is already present.
    pub fn push(&mut self, origin: OriginId) {
        if !self.0.contains(&origin) {
            self.0.push(origin);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[OriginId] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OriginId> {
        self.0.iter()
    }
}

impl From<Vec<OriginId>> for ProvenanceRecord {
    fn from(origins: Vec<OriginId>) -> Self {
        let mut record = Self::new();
        for origin in origins {
            record.push(origin);
        }
        record
    }
}

impl<'a> IntoIterator for &'a ProvenanceRecord {
    type Item = &'a OriginId;
    type IntoIter = std::slice::Iter<'a, OriginId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Tool signatures
// ---------------------------------------------------------------------------

/// Embedded-tag pattern that identifies an authoring tool.
///
/// With `value` set the tag must equal it exactly; without, presence of the
/// key is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSignature {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub tool: ToolName,
}

impl ToolSignature {
    /// Test the value found under `self.key` (or `None` if the key is absent).
    pub fn matches(&self, found: Option<&str>) -> bool {
        match (found, self.value.as_deref()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(found), Some(expected)) => found == expected,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate files
// ---------------------------------------------------------------------------

/// A regular file in the staging directory, as seen during one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Absolute path inside the staging directory.
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl CandidateFile {
    /// Stat `path` and capture its size and modification time.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            modified: meta.modified()?,
        })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Extension without the leading dot, as written on disk.
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }

    pub fn is_hidden(&self) -> bool {
        self.file_name().map(|n| n.starts_with('.')).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
