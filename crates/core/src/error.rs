//! Error types for the Rulebook engine.
//!
//! Built on `thiserror`.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them and exposes a stable, machine-readable [`ErrorKind`] plus
//! optional structured details for hosts.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// The top-level error type for all Rulebook operations.
///
/// Every variant is `Clone`: a failed load is cached and reported
/// again without re-reading the pack.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // --- Pack format / validation errors (fatal to initialization) ---
    #[error("Pack error: {0}")]
    Pack(#[from] PackError),

    // --- Host file reading ---
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    // --- Storage port ---
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    // --- Retrieval errors (fatal to one question only) ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Question lifecycle ---
    #[error("Engine is not initialized; call initialize first")]
    NotInitialized,

    #[error("Another question is already in flight on this engine")]
    Busy,

    #[error("Question was cancelled before completion")]
    Cancelled,
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable, machine-readable error kinds. This set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedManifest,
    UnsupportedSchemaVersion,
    UnsupportedRetrievalFormat,
    MissingCapability,
    UnsupportedCapabilityVersion,
    MissingCapabilityFile,
    MalformedIndexMeta,
    EmbeddingMismatch,
    CountsMismatch,
    MalformedRouterConfig,
    ReadFailed,
    Storage,
    NotInitialized,
    Busy,
    Cancelled,
    DimensionMismatch,
    RowCapExceeded,
    MalformedVectorData,
    Config,
}

impl ErrorKind {
    /// The snake_case wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedManifest => "malformed_manifest",
            Self::UnsupportedSchemaVersion => "unsupported_schema_version",
            Self::UnsupportedRetrievalFormat => "unsupported_retrieval_format",
            Self::MissingCapability => "missing_capability",
            Self::UnsupportedCapabilityVersion => "unsupported_capability_version",
            Self::MissingCapabilityFile => "missing_capability_file",
            Self::MalformedIndexMeta => "malformed_index_meta",
            Self::EmbeddingMismatch => "embedding_mismatch",
            Self::CountsMismatch => "counts_mismatch",
            Self::MalformedRouterConfig => "malformed_router_config",
            Self::ReadFailed => "read_failed",
            Self::Storage => "storage",
            Self::NotInitialized => "not_initialized",
            Self::Busy => "busy",
            Self::Cancelled => "cancelled",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::RowCapExceeded => "row_cap_exceeded",
            Self::MalformedVectorData => "malformed_vector_data",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Pack(e) => e.kind(),
            Self::Read(_) => ErrorKind::ReadFailed,
            Self::Store(_) => ErrorKind::Storage,
            Self::Retrieval(e) => e.kind(),
            Self::Config { .. } => ErrorKind::Config,
            Self::NotInitialized => ErrorKind::NotInitialized,
            Self::Busy => ErrorKind::Busy,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Structured details for the host, when the error carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Pack(e) => e.details(),
            Self::Read(ReadError::NotFound { path }) | Self::Read(ReadError::Io { path, .. }) => {
                Some(json!({ "path": path }))
            }
            Self::Retrieval(e) => e.details(),
            _ => None,
        }
    }

    /// Render as the JSON shape hosts consume: `{kind, message, details?}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Some(details) = self.details() {
            value["details"] = details;
        }
        value
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum PackError {
    #[error("Malformed manifest: {reason}")]
    MalformedManifest { reason: String },

    #[error("Unsupported pack schema version {found} (supported: {supported})")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    #[error("Unsupported retrieval format version {found} (supported: {supported})")]
    UnsupportedRetrievalFormat { found: u32, supported: u32 },

    #[error("Manifest is missing the required '{capability}' capability block")]
    MissingCapability { capability: String },

    #[error("Capability '{capability}' has unsupported schema version {found} (supported: {supported})")]
    UnsupportedCapabilityVersion {
        capability: String,
        found: u32,
        supported: u32,
    },

    #[error("Capability '{capability}' does not declare required file '{file}'")]
    MissingCapabilityFile { capability: String, file: String },

    #[error("Malformed index metadata for '{index}': {reason}")]
    MalformedIndexMeta { index: String, reason: String },

    #[error("Embedding model mismatch: configured '{configured}', rules '{rules}', cards '{cards}'")]
    EmbeddingMismatch {
        configured: String,
        rules: String,
        cards: String,
    },

    #[error(
        "Indices disagree on embeddings: rules '{rules}' ({rules_dim}-dim), cards '{cards}' ({cards_dim}-dim)"
    )]
    IndexEmbeddingMismatch {
        rules: String,
        rules_dim: usize,
        cards: String,
        cards_dim: usize,
    },

    #[error("Record count mismatch for '{index}': declared {declared}, found {found}")]
    CountsMismatch {
        index: String,
        declared: usize,
        found: usize,
    },

    #[error("Malformed router configuration: {reason}")]
    MalformedRouterConfig { reason: String },
}

impl PackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedManifest { .. } => ErrorKind::MalformedManifest,
            Self::UnsupportedSchemaVersion { .. } => ErrorKind::UnsupportedSchemaVersion,
            Self::UnsupportedRetrievalFormat { .. } => ErrorKind::UnsupportedRetrievalFormat,
            Self::MissingCapability { .. } => ErrorKind::MissingCapability,
            Self::UnsupportedCapabilityVersion { .. } => ErrorKind::UnsupportedCapabilityVersion,
            Self::MissingCapabilityFile { .. } => ErrorKind::MissingCapabilityFile,
            Self::MalformedIndexMeta { .. } => ErrorKind::MalformedIndexMeta,
            Self::EmbeddingMismatch { .. } | Self::IndexEmbeddingMismatch { .. } => {
                ErrorKind::EmbeddingMismatch
            }
            Self::CountsMismatch { .. } => ErrorKind::CountsMismatch,
            Self::MalformedRouterConfig { .. } => ErrorKind::MalformedRouterConfig,
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::UnsupportedSchemaVersion { found, supported }
            | Self::UnsupportedRetrievalFormat { found, supported } => {
                Some(json!({ "found": found, "supported": supported }))
            }
            Self::UnsupportedCapabilityVersion {
                capability,
                found,
                supported,
            } => Some(json!({
                "capability": capability,
                "found": found,
                "supported": supported,
            })),
            Self::MissingCapability { capability } => Some(json!({ "capability": capability })),
            Self::MissingCapabilityFile { capability, file } => {
                Some(json!({ "capability": capability, "file": file }))
            }
            Self::EmbeddingMismatch {
                configured,
                rules,
                cards,
            } => Some(json!({
                "configured": configured,
                "rules": rules,
                "cards": cards,
            })),
            Self::IndexEmbeddingMismatch {
                rules,
                rules_dim,
                cards,
                cards_dim,
            } => Some(json!({
                "rules": rules,
                "rules_dim": rules_dim,
                "cards": cards,
                "cards_dim": cards_dim,
            })),
            Self::CountsMismatch {
                index,
                declared,
                found,
            } => Some(json!({ "index": index, "declared": declared, "found": found })),
            Self::MalformedIndexMeta { index, .. } => Some(json!({ "index": index })),
            Self::MalformedManifest { .. } | Self::MalformedRouterConfig { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ReadError {
    #[error("File not found in pack: {path}")]
    NotFound { path: String },

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Store is closed")]
    Closed,
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Dimension mismatch for '{index}': index has {expected}-dim vectors, query has {found}")]
    DimensionMismatch {
        index: String,
        expected: usize,
        found: usize,
    },

    #[error("Row cap exceeded for '{index}': {rows} rows, max {max_rows}")]
    RowCapExceeded {
        index: String,
        rows: usize,
        max_rows: usize,
    },

    #[error("Malformed vector data for '{index}': {reason}")]
    MalformedVectorData { index: String, reason: String },
}

impl RetrievalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::RowCapExceeded { .. } => ErrorKind::RowCapExceeded,
            Self::MalformedVectorData { .. } => ErrorKind::MalformedVectorData,
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::DimensionMismatch {
                index,
                expected,
                found,
            } => Some(json!({ "index": index, "expected": expected, "found": found })),
            Self::RowCapExceeded {
                index,
                rows,
                max_rows,
            } => Some(json!({ "index": index, "rows": rows, "max_rows": max_rows })),
            Self::MalformedVectorData { index, .. } => Some(json!({ "index": index })),
        }
    }
}
