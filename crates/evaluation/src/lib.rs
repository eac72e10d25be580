//! Feature-flag evaluation: constraint matching, segment resolution,
//! deterministic variant distribution, and the concurrent engine that ties
//! them to immutable per-namespace configuration snapshots.

pub mod distribution;
pub mod engine;
pub mod matcher;
pub mod rules;
pub mod segment;
pub mod snapshot;

pub use engine::Engine;
pub use snapshot::Snapshot;
