//! Provenance resolution.
//!
//! [`ProvenanceResolver::resolve`] combines both strategies into one ordered
//! [`ProvenanceRecord`]: external-origin URLs first (in source order), then
//! tool names recognised from embedded tags. Any collaborator failure is
//! logged and contributes nothing; resolution itself never fails.

mod embedded;
mod origin;

use std::path::Path;

use triage_core::{Config, OriginId, ProvenanceRecord};

pub use embedded::{match_signatures, EmbeddedInspector, PngTagReader, TagReader, Tags};
pub use origin::{
    normalize_origin, origin_source_for, parse_mdls_list, MdlsOriginSource, OriginSource,
    XattrOriginSource, WHERE_FROMS_ATTR, XDG_ORIGIN_ATTRS,
};

#[derive(Default)]
pub struct ProvenanceResolver {
    sources: Vec<Box<dyn OriginSource>>,
    embedded: Option<EmbeddedInspector>,
}

impl ProvenanceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources from `config.origin_sources`, plus PNG tag inspection when any
    /// signatures are configured.
    pub fn from_config(config: &Config) -> Self {
        let mut resolver = Self::new();
        for kind in &config.origin_sources {
            resolver.sources.push(origin_source_for(*kind));
        }
        if !config.signatures.is_empty() {
            resolver.embedded = Some(EmbeddedInspector::new(
                PngTagReader,
                config.signatures.clone(),
            ));
        }
        resolver
    }

    pub fn with_source(mut self, source: impl OriginSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn with_embedded(mut self, inspector: EmbeddedInspector) -> Self {
        self.embedded = Some(inspector);
        self
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn resolve(&self, path: &Path) -> ProvenanceRecord {
        let mut record = ProvenanceRecord::new();

        for source in &self.sources {
            match source.where_froms(path) {
                Ok(raw) => {
                    for url in raw.iter().filter_map(|entry| normalize_origin(entry)) {
                        record.push(OriginId::Url(url));
                    }
                }
                Err(err) => tracing::debug!(
                    path = %path.display(),
                    source = source.name(),
                    error = %err,
                    "origin lookup failed",
                ),
            }
        }

        if let Some(inspector) = &self.embedded {
            match inspector.tools(path) {
                Ok(tools) => {
                    for tool in tools {
                        record.push(OriginId::Tool(tool));
                    }
                }
                Err(err) => tracing::debug!(
                    path = %path.display(),
                    error = %err,
                    "embedded metadata unreadable",
                ),
            }
        }

        record
    }
}

impl std::fmt::Debug for ProvenanceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvenanceResolver")
            .field("sources", &self.source_names())
            .field("embedded", &self.embedded)
            .finish()
    }
}
