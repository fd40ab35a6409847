//! External-origin strategy: "where was this downloaded from?"
//!
//! The OS records download URLs outside the file contents. An
//! [`OriginSource`] fetches the raw strings; [`normalize_origin`] keeps only
//! usable `http`/`https` URLs.

use std::path::Path;
use std::process::Command;

use triage_core::OriginSourceKind;

use crate::error::{io_err, ProvenanceError};

/// A collaborator that reports raw "where from" strings for a file.
///
/// Implementations must be side-effect free. Malformed output should produce
/// an empty list rather than an error.
pub trait OriginSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn where_froms(&self, path: &Path) -> Result<Vec<String>, ProvenanceError>;
}

/// Strip a `blob:` prefix and keep only `http://` / `https://` URLs.
pub fn normalize_origin(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let url = trimmed.strip_prefix("blob:").unwrap_or(trimmed);
    if url.starts_with("http://") || url.starts_with("https://") {
        Some(url.to_string())
    } else {
        None
    }
}

/// Build the source configured by `kind`.
pub fn origin_source_for(kind: OriginSourceKind) -> Box<dyn OriginSource> {
    match kind {
        OriginSourceKind::Mdls => Box::new(MdlsOriginSource::default()),
        OriginSourceKind::Xattr => Box::new(XattrOriginSource::default()),
    }
}

// ---------------------------------------------------------------------------
// mdls (macOS Spotlight)
// ---------------------------------------------------------------------------

pub const WHERE_FROMS_ATTR: &str = "kMDItemWhereFroms";

/// Reads `kMDItemWhereFroms` through `mdls -raw`.
#[derive(Debug, Clone)]
pub struct MdlsOriginSource {
    program: String,
}

impl Default for MdlsOriginSource {
    fn default() -> Self {
        Self {
            program: "mdls".to_string(),
        }
    }
}

impl MdlsOriginSource {
    /// Use a different executable (tests, non-standard installs).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl OriginSource for MdlsOriginSource {
    fn name(&self) -> &'static str {
        "mdls"
    }

    fn where_froms(&self, path: &Path) -> Result<Vec<String>, ProvenanceError> {
        let output = Command::new(&self.program)
            .args(["-raw", "-attr", WHERE_FROMS_ATTR])
            .arg(path)
            .output()
            .map_err(|e| io_err(&self.program, e))?;
        if !output.status.success() {
            return Err(ProvenanceError::CommandFailed {
                program: "mdls",
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(parse_mdls_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `mdls -raw` array output: `("https://a", "https://b")`.
///
/// Anything that does not start with `(` — including an empty string — is
/// treated as "no origins". `(null)` parses to a single non-URL entry that
/// normalisation later drops.
pub fn parse_mdls_list(stdout: &str) -> Vec<String> {
    if !stdout.starts_with('(') {
        return Vec::new();
    }
    stdout
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(|entry| entry.trim().trim_matches('"').to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// xattr (freedesktop user.xdg.* attributes)
// ---------------------------------------------------------------------------

/// Attributes browsers set on Linux, in preference order.
pub const XDG_ORIGIN_ATTRS: &[&str] = &["user.xdg.origin.url", "user.xdg.referrer.url"];

/// Reads `user.xdg.origin.url` / `user.xdg.referrer.url` through `getfattr`.
#[derive(Debug, Clone)]
pub struct XattrOriginSource {
    program: String,
}

impl Default for XattrOriginSource {
    fn default() -> Self {
        Self {
            program: "getfattr".to_string(),
        }
    }
}

impl XattrOriginSource {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn read_attr(&self, path: &Path, attr: &str) -> Result<Option<String>, ProvenanceError> {
        let output = Command::new(&self.program)
            .args(["--only-values", "--absolute-names", "-n", attr])
            .arg(path)
            .output()
            .map_err(|e| io_err(&self.program, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("No such attribute") || stderr.contains("No data available") {
                return Ok(None);
            }
            return Err(ProvenanceError::CommandFailed {
                program: "getfattr",
                status: output.status,
                stderr,
            });
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!value.is_empty()).then_some(value))
    }
}

impl OriginSource for XattrOriginSource {
    fn name(&self) -> &'static str {
        "xattr"
    }

    fn where_froms(&self, path: &Path) -> Result<Vec<String>, ProvenanceError> {
        let mut origins = Vec::new();
        for attr in XDG_ORIGIN_ATTRS {
            if let Some(value) = self.read_attr(path, attr)? {
                origins.push(value);
            }
        }
        Ok(origins)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parses_multiline_mdls_array() {
        let stdout = "(\n    \"https://cdn.example.com/a.png\",\n    \"https://example.com/page\"\n)";
        assert_eq!(
            parse_mdls_list(stdout),
            vec![
                "https://cdn.example.com/a.png".to_string(),
                "https://example.com/page".to_string()
            ]
        );
    }

    #[rstest]
    #[case("")]
    #[case("could not find /tmp/x")]
    #[case(" (\"https://leading.space\")")]
    fn non_array_output_is_empty(#[case] stdout: &str) {
        assert!(parse_mdls_list(stdout).is_empty());
    }

    #[test]
    fn null_array_normalises_to_nothing() {
        let entries = parse_mdls_list("(null)");
        assert!(entries.iter().filter_map(|e| normalize_origin(e)).next().is_none());
    }

    #[rstest]
    #[case("https://a.com/x", Some("https://a.com/x"))]
    #[case("http://a.com/x", Some("http://a.com/x"))]
    #[case("blob:https://x.com/5b1c", Some("https://x.com/5b1c"))]
    #[case("  https://padded.com  ", Some("https://padded.com"))]
    #[case("data:image/png;base64,AAAA", None)]
    #[case("file:///Users/me/a.png", None)]
    #[case("blob:null/abc", None)]
    #[case("", None)]
    fn normalisation(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(normalize_origin(raw).as_deref(), expected);
    }

    #[test]
    fn missing_program_is_an_error_not_a_panic() {
        let source = MdlsOriginSource::with_program("/nonexistent/triage-mdls");
        assert!(source.where_froms(Path::new("/tmp/whatever")).is_err());
    }
}
