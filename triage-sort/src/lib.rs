//! # triage-sort
//!
//! Placement and cycle orchestration.
//!
//! Build a [`Triage`] from configuration and call [`Triage::run_cycle`] to
//! evaluate every file in the staging directory once. Placement of a single
//! routed file is handled by [`ConflictResolver`].

pub mod error;
pub mod hashing;
pub mod pipeline;
pub mod placement;
pub mod prune;

pub use error::SortError;
pub use pipeline::{list_candidates, CycleReport, Inspection, Triage};
pub use placement::{ConflictResolver, Placement};
