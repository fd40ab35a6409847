//! YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.triage/
//!   config.yaml   (mode 0600, written by `triage config init`)
//! ```
//!
//! # API pattern
//!
//! Functions that touch the default location come in two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Paths inside the file may start with `~/`; they are expanded against the
//! same home directory when the config is turned into runtime values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::routing::{Matcher, NamingScheme, RoutingRule, RoutingTable};
use crate::types::{ToolName, ToolSignature};

/// Name of the per-user directory under `$HOME`.
pub const TRIAGE_DIR: &str = ".triage";
pub const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Where "downloaded from" URLs are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginSourceKind {
    /// Spotlight `kMDItemWhereFroms` via `mdls` (macOS).
    Mdls,
    /// `user.xdg.origin.url` extended attribute via `getfattr` (Linux).
    Xattr,
}

impl OriginSourceKind {
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            OriginSourceKind::Mdls
        } else {
            OriginSourceKind::Xattr
        }
    }
}

/// One routing rule as written in YAML. Exactly one of `domain` / `tool` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub destination: String,
    #[serde(default, skip_serializing_if = "NamingScheme::is_plain")]
    pub naming: NamingScheme,
}

impl RuleConfig {
    pub fn domain(domain: &str, destination: &str) -> Self {
        Self {
            domain: Some(domain.to_string()),
            tool: None,
            destination: destination.to_string(),
            naming: NamingScheme::Plain,
        }
    }

    pub fn tool(tool: &str, destination: &str) -> Self {
        Self {
            domain: None,
            tool: Some(tool.to_string()),
            destination: destination.to_string(),
            naming: NamingScheme::Plain,
        }
    }

    pub fn named(mut self, naming: NamingScheme) -> Self {
        self.naming = naming;
        self
    }

    fn matcher(&self, index: usize) -> Result<Matcher, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRule {
            index,
            reason: reason.to_string(),
        };
        match (self.domain.as_deref(), self.tool.as_deref()) {
            (Some(domain), None) => {
                let domain = domain.trim();
                if domain.is_empty() {
                    return Err(invalid("`domain` is empty"));
                }
                Ok(Matcher::domain(domain))
            }
            (None, Some(tool)) => {
                if tool.trim().is_empty() {
                    return Err(invalid("`tool` is empty"));
                }
                Ok(Matcher::tool(tool.trim()))
            }
            (Some(_), Some(_)) => Err(invalid("set either `domain` or `tool`, not both")),
            (None, None) => Err(invalid("one of `domain` or `tool` is required")),
        }
    }
}

/// Root of `~/.triage/config.yaml`. Missing keys take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory scanned (non-recursively) for new files.
    pub staging_dir: String,
    /// Seconds between scan cycles.
    pub interval_secs: u64,
    /// A file modified more recently than this is still being written.
    pub quiescence_secs: u64,
    /// Extensions (without dot, case-insensitive) of in-progress downloads.
    pub partial_extensions: Vec<String>,
    /// Remove destination directories left empty after a cycle.
    pub prune_empty: bool,
    /// Nudge an early cycle on file-system notifications for the staging dir.
    pub watch: bool,
    pub origin_sources: Vec<OriginSourceKind>,
    pub signatures: Vec<ToolSignature>,
    pub rules: Vec<RuleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            staging_dir: "~/Downloads".to_string(),
            interval_secs: 10,
            quiescence_secs: 30,
            partial_extensions: ["download", "tmp", "part", "crdownload", "partial"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            prune_empty: true,
            watch: true,
            origin_sources: vec![OriginSourceKind::platform_default()],
            signatures: vec![
                ToolSignature {
                    key: "Software".to_string(),
                    value: Some("NovelAI".to_string()),
                    tool: ToolName::from("NovelAI"),
                },
                ToolSignature {
                    key: "parameters".to_string(),
                    value: None,
                    tool: ToolName::from("StableDiffusion"),
                },
            ],
            rules: vec![
                RuleConfig::domain("novelai.net", "~/Downloads/AI"),
                RuleConfig::tool("NovelAI", "~/Downloads/AI"),
                RuleConfig::tool("StableDiffusion", "~/Downloads/AI"),
                RuleConfig::domain("iwara.tv", "~/Downloads/Iwara"),
                RuleConfig::domain("gelbooru.com", "~/Downloads/Illustration"),
                RuleConfig::domain("pixiv.net", "~/Downloads/Illustration"),
                RuleConfig::domain("x.com", "~/Downloads/Twitter").named(NamingScheme::StatusPost),
                RuleConfig::domain("twitter.com", "~/Downloads/Twitter")
                    .named(NamingScheme::StatusPost),
            ],
        }
    }
}

impl Config {
    pub fn staging_dir(&self, home: &Path) -> PathBuf {
        expand_home(&self.staging_dir, home)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn quiescence(&self) -> Duration {
        Duration::from_secs(self.quiescence_secs)
    }

    /// Reject settings the runtime cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "`interval_secs` must be greater than zero".to_string(),
            ));
        }
        if self.staging_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("`staging_dir` is empty".to_string()));
        }
        for (index, rule) in self.rules.iter().enumerate() {
            rule.matcher(index)?;
            if rule.destination.trim().is_empty() {
                return Err(ConfigError::InvalidRule {
                    index,
                    reason: "`destination` is empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Build the immutable routing table, expanding `~/` destinations.
    pub fn routing_table(&self, home: &Path) -> Result<RoutingTable, ConfigError> {
        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                Ok(RoutingRule::new(
                    rule.matcher(index)?,
                    expand_home(&rule.destination, home),
                )
                .with_naming(rule.naming))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(RoutingTable::new(rules))
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.triage/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(TRIAGE_DIR).join(CONFIG_FILE)
}

/// Expand a leading `~` or `~/` against `home`; other paths are returned as-is.
pub fn expand_home(raw: &str, home: &Path) -> PathBuf {
    let raw = raw.trim();
    if raw == "~" {
        return home.to_path_buf();
    }
    match raw.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(raw),
    }
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load `<home>/.triage/config.yaml`, falling back to defaults when absent.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(Config::default());
    }
    load_from(&path)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

/// Load and validate an explicit config file. A missing file is an error.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let config: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?
    };
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically write `config` to `path`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let tmp = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Write the default config to `<home>/.triage/config.yaml`.
///
/// Refuses to replace an existing file unless `force` is set.
pub fn init_at(home: &Path, force: bool) -> Result<PathBuf, ConfigError> {
    let path = config_path_at(home);
    init_to(&path, force)?;
    Ok(path)
}

/// Write the default config to an explicit `path`, same rules as [`init_at`].
pub fn init_to(path: &Path, force: bool) -> Result<(), ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    save_to(path, &Config::default())
}

/// `init_at` convenience wrapper.
pub fn init(force: bool) -> Result<PathBuf, ConfigError> {
    init_at(&home()?, force)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
