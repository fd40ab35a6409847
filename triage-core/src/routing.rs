//! Ordered, first-match routing from provenance to destination directories.
//!
//! Resolution walks identifiers in provenance order and, for each one, rules
//! in declaration order. The first `(identifier, rule)` pair that matches
//! wins; there is no notion of a more specific match.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{OriginId, ToolName};

/// How files routed by a rule are named at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NamingScheme {
    /// Keep the source file name.
    #[default]
    Plain,
    /// Rebuild the name from a `.../<author>/status/<id>[/photo/<n>]` URL.
    StatusPost,
}

impl NamingScheme {
    pub fn is_plain(&self) -> bool {
        matches!(self, NamingScheme::Plain)
    }
}

impl fmt::Display for NamingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingScheme::Plain => write!(f, "plain"),
            NamingScheme::StatusPost => write!(f, "status_post"),
        }
    }
}

/// Predicate half of a routing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// URL host ends with this (lower-cased) suffix.
    Domain(String),
    /// Tool identifier equals this name.
    Tool(ToolName),
}

impl Matcher {
    pub fn domain(suffix: impl Into<String>) -> Self {
        Matcher::Domain(suffix.into().to_ascii_lowercase())
    }

    pub fn tool(name: impl Into<ToolName>) -> Self {
        Matcher::Tool(name.into())
    }

    pub fn matches(&self, origin: &OriginId) -> bool {
        match (self, origin) {
            (Matcher::Domain(suffix), OriginId::Url(_)) => origin
                .host()
                .map(|host| host.ends_with(suffix.as_str()))
                .unwrap_or(false),
            (Matcher::Tool(name), OriginId::Tool(tool)) => name == tool,
            _ => false,
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Domain(suffix) => write!(f, "domain:{suffix}"),
            Matcher::Tool(name) => write!(f, "tool:{name}"),
        }
    }
}

/// A matcher paired with the directory its files go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    pub matcher: Matcher,
    pub destination: PathBuf,
    pub naming: NamingScheme,
}

impl RoutingRule {
    pub fn new(matcher: Matcher, destination: impl Into<PathBuf>) -> Self {
        Self {
            matcher,
            destination: destination.into(),
            naming: NamingScheme::Plain,
        }
    }

    pub fn with_naming(mut self, naming: NamingScheme) -> Self {
        self.naming = naming;
        self
    }
}

/// The winning `(identifier, rule)` pair of a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a> {
    pub origin: &'a OriginId,
    pub rule: &'a RoutingRule,
}

impl Route<'_> {
    pub fn destination(&self) -> &Path {
        &self.rule.destination
    }
}

/// Immutable, ordered rule set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    rules: Vec<RoutingRule>,
}

impl RoutingTable {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve `origins` to a destination. `None` means leave the file in place.
    pub fn route<'a>(&'a self, origins: &'a [OriginId]) -> Option<Route<'a>> {
        origins.iter().find_map(|origin| {
            self.rules
                .iter()
                .find(|rule| rule.matcher.matches(origin))
                .map(|rule| Route { origin, rule })
        })
    }

    /// Distinct destination directories in declaration order.
    pub fn destinations(&self) -> Vec<&Path> {
        let mut seen: Vec<&Path> = Vec::new();
        for rule in &self.rules {
            let dir = rule.destination.as_path();
            if !seen.contains(&dir) {
                seen.push(dir);
            }
        }
        seen
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
