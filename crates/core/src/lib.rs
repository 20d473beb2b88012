//! # Rulebook Core
//!
//! Domain types, ports, and error definitions for the Rulebook retrieval engine.
//! This crate performs **no I/O**. It defines the data model and the two host
//! capabilities (file reading and parameterized store queries) that the other
//! crates implement against.
//!
//! ## Design Philosophy
//!
//! Storage and file access are traits here. Concrete implementations (SQLite,
//! filesystem, in-memory) live in `rulebook-pack`. This enables:
//! - Swapping the storage driver per target platform
//! - Deterministic tests with in-memory stores
//! - Clean dependency graph (all crates depend inward on core)

pub mod bundle;
pub mod error;
pub mod model;
pub mod query;
pub mod reader;
pub mod store;

// Re-export key types at crate root
pub use bundle::{
    AskWarning, BundleEntity, BundleItem, BundleRule, ContextBundle, RoutingTrace, RuleCategory,
};
pub use error::{Error, ErrorKind, Result};
pub use model::{Entity, Rule};
pub use query::{QueryAnalysis, ResolutionStep, RoutingPlan};
pub use reader::PackReader;
pub use store::{ContentStore, StoreConnector};
