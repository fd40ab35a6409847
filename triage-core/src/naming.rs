//! Structured filenames for short-form social posts.
//!
//! A status URL of the shape `.../<author>/status/<id>[/photo/<n>]` maps to a
//! bracketed stem `[<author>][<id>][<n>]`. The parser is pure and performs no
//! I/O.

use std::fmt;

/// Components parsed from a status-post URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPost {
    pub author: String,
    pub id: String,
    /// Photo index digits as they appear in the URL; `1` when the URL has
    /// no `/photo/<n>` suffix.
    pub photo: String,
}

impl StatusPost {
    /// `[<author>][<id>][<n>]`
    pub fn stem(&self) -> String {
        format!("[{}][{}][{}]", self.author, self.id, self.photo)
    }

    /// Stem followed by `extension` (given without the dot; may be empty).
    pub fn file_name(&self, extension: &str) -> String {
        join_extension(self.stem(), extension)
    }
}

impl fmt::Display for StatusPost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

/// Parse `origin` as a status-post URL.
///
/// Returns `None` for non-http(s) input, for URLs without an `<author>/status/<id>`
/// run of path segments, and when the id is not numeric. A non-numeric photo
/// index is ignored.
pub fn parse_status_post(origin: &str) -> Option<StatusPost> {
    let url = url::Url::parse(origin).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let segments: Vec<&str> = url
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();

    let status_at = segments
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, segment)| **segment == "status")
        .map(|(i, _)| i)?;

    let author = segments[status_at - 1];
    let id = *segments.get(status_at + 1)?;
    if !is_numeric(id) {
        return None;
    }

    let photo = match (segments.get(status_at + 2), segments.get(status_at + 3)) {
        (Some(&"photo"), Some(index)) if is_numeric(index) => index.to_string(),
        _ => "1".to_string(),
    };

    Some(StatusPost {
        author: author.to_string(),
        id: id.to_string(),
        photo,
    })
}

/// `stem` + `.` + `extension`, or just `stem` when there is no extension.
pub fn join_extension(stem: String, extension: &str) -> String {
    if extension.is_empty() {
        stem
    } else {
        format!("{stem}.{extension}")
    }
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
