//! Triage core library — domain types, routing table, structured naming, config.
//!
//! - [`types`] — origin identifiers, provenance records, candidate files
//! - [`routing`] — ordered first-match [`RoutingTable`]
//! - [`naming`] — pure status-post URL parsing for structured filenames
//! - [`config`] — YAML configuration load / save / init
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod naming;
pub mod routing;
pub mod types;

pub use config::{Config, OriginSourceKind, RuleConfig};
pub use error::ConfigError;
pub use naming::{parse_status_post, StatusPost};
pub use routing::{Matcher, NamingScheme, Route, RoutingRule, RoutingTable};
pub use types::{CandidateFile, OriginId, ProvenanceRecord, ToolName, ToolSignature};
