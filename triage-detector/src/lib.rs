//! # triage-detector
//!
//! Everything the engine learns about a staged file before deciding where it
//! goes:
//!
//! - [`stability`] — has the file finished being written?
//! - [`provenance`] — where did it come from (URLs, embedded authoring tags)?
//!
//! Both are advisory and re-evaluated every cycle; nothing is cached.

pub mod error;
pub mod provenance;
pub mod stability;

pub use error::ProvenanceError;
pub use provenance::{
    EmbeddedInspector, MdlsOriginSource, OriginSource, PngTagReader, ProvenanceResolver,
    TagReader, Tags, XattrOriginSource,
};
pub use stability::{Stability, StabilityDetector};
