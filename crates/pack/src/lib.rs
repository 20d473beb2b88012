//! Pack loading, validation, and storage backends for Rulebook.
//!
//! A pack is a versioned, read-only data set: a manifest, per-index metadata,
//! the router configuration, the relational tables, and (for the legacy
//! vector path) half-precision embedding blobs.

pub mod fs_reader;
pub mod in_memory;
pub mod loader;
pub mod manifest;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use fs_reader::FsPackReader;
pub use in_memory::{InMemoryConnector, InMemoryStore, MemoryReader};
pub use loader::{DataState, InitParams, load};
pub use manifest::{IndexMeta, Manifest, Metric};
pub use vector::{LegacyIndex, Neighbor, VectorCache, VectorIndex};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnector, SqliteStore};
