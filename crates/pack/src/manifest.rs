//! Manifest and per-index metadata documents.
//!
//! Parsing is two-phase: the raw document is deserialized with every field
//! optional, then checked in a fixed order so each malformed shape maps to
//! exactly one [`PackError`] kind.

use rulebook_core::error::PackError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pack schema version this engine reads.
pub const SUPPORTED_PACK_SCHEMA_VERSION: u32 = 1;
/// Retrieval format version this engine reads.
pub const SUPPORTED_RETRIEVAL_FORMAT_VERSION: u32 = 1;
/// Schema version of the `validate` capability block.
pub const SUPPORTED_VALIDATE_CAPABILITY_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const INDEX_META_FILE: &str = "index_meta.json";
pub const ROUTER_CONFIG_FILE: &str = "router/router_config.json";
pub const PROVIDER_SPEC_FILE: &str = "provider_spec.json";

pub const VALIDATE_CAPABILITY: &str = "validate";
/// Files the `validate` capability must declare.
pub const VALIDATE_REQUIRED_FILES: [&str; 2] = ["canonical_names", "rule_ids"];

fn default_database() -> String {
    "content.sqlite".into()
}

/// Summary of one index as declared by the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Directory of the index, relative to the pack root.
    pub root: String,
    /// Declared record count, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

/// A capability block, e.g. `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityBlock {
    pub schema_version: u32,
    pub files: BTreeMap<String, String>,
}

/// The validated manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub pack_schema_version: u32,
    pub retrieval_format_version: u32,
    /// Database path relative to the pack root.
    pub database: String,
    pub validate: CapabilityBlock,
    pub rules: IndexSummary,
    pub cards: IndexSummary,
}

#[derive(Deserialize)]
struct RawManifest {
    pack_schema_version: Option<u32>,
    retrieval_format_version: Option<u32>,
    #[serde(default = "default_database")]
    database: String,
    #[serde(default)]
    capabilities: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    indices: BTreeMap<String, IndexSummary>,
}

#[derive(Deserialize)]
struct RawCapability {
    schema_version: Option<u32>,
    #[serde(default)]
    files: BTreeMap<String, String>,
}

fn malformed(reason: impl Into<String>) -> PackError {
    PackError::MalformedManifest {
        reason: reason.into(),
    }
}

impl Manifest {
    /// Parse and validate a manifest document.
    ///
    /// Check order: syntax → schema version → retrieval format → capability
    /// present → capability version → capability files → index roots.
    pub fn parse(text: &str) -> Result<Self, PackError> {
        let raw: RawManifest = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;

        let pack_schema_version = raw
            .pack_schema_version
            .ok_or_else(|| malformed("missing pack_schema_version"))?;
        if pack_schema_version != SUPPORTED_PACK_SCHEMA_VERSION {
            return Err(PackError::UnsupportedSchemaVersion {
                found: pack_schema_version,
                supported: SUPPORTED_PACK_SCHEMA_VERSION,
            });
        }

        let retrieval_format_version = raw
            .retrieval_format_version
            .ok_or_else(|| malformed("missing retrieval_format_version"))?;
        if retrieval_format_version != SUPPORTED_RETRIEVAL_FORMAT_VERSION {
            return Err(PackError::UnsupportedRetrievalFormat {
                found: retrieval_format_version,
                supported: SUPPORTED_RETRIEVAL_FORMAT_VERSION,
            });
        }

        let validate = Self::parse_validate_capability(&raw.capabilities)?;

        let index = |name: &str| -> Result<IndexSummary, PackError> {
            let summary = raw
                .indices
                .get(name)
                .cloned()
                .ok_or_else(|| malformed(format!("missing index '{name}'")))?;
            if summary.root.trim().is_empty() {
                return Err(malformed(format!("index '{name}' has an empty root")));
            }
            Ok(summary)
        };
        let rules = index("rules")?;
        let cards = index("cards")?;

        if raw.database.trim().is_empty() {
            return Err(malformed("database path is empty"));
        }

        Ok(Self {
            pack_schema_version,
            retrieval_format_version,
            database: raw.database,
            validate,
            rules,
            cards,
        })
    }

    fn parse_validate_capability(
        capabilities: &BTreeMap<String, serde_json::Value>,
    ) -> Result<CapabilityBlock, PackError> {
        let value = capabilities
            .get(VALIDATE_CAPABILITY)
            .filter(|v| !v.is_null())
            .ok_or_else(|| PackError::MissingCapability {
                capability: VALIDATE_CAPABILITY.into(),
            })?;

        let raw: RawCapability = serde_json::from_value(value.clone())
            .map_err(|e| malformed(format!("capability '{VALIDATE_CAPABILITY}': {e}")))?;

        let schema_version = raw.schema_version.ok_or_else(|| {
            malformed(format!(
                "capability '{VALIDATE_CAPABILITY}' is missing schema_version"
            ))
        })?;
        if schema_version != SUPPORTED_VALIDATE_CAPABILITY_VERSION {
            return Err(PackError::UnsupportedCapabilityVersion {
                capability: VALIDATE_CAPABILITY.into(),
                found: schema_version,
                supported: SUPPORTED_VALIDATE_CAPABILITY_VERSION,
            });
        }

        for file in VALIDATE_REQUIRED_FILES {
            let declared = raw.files.get(file).map(|p| p.trim()).unwrap_or_default();
            if declared.is_empty() {
                return Err(PackError::MissingCapabilityFile {
                    capability: VALIDATE_CAPABILITY.into(),
                    file: file.into(),
                });
            }
        }

        Ok(CapabilityBlock {
            schema_version,
            files: raw.files,
        })
    }

    /// Path of an index's metadata document.
    pub fn index_meta_path(summary: &IndexSummary) -> String {
        join(&summary.root, INDEX_META_FILE)
    }
}

/// Distance metric declared by an index. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    L2,
    Cosine,
}

/// Per-index metadata (`<root>/index_meta.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub embedding_model_id: String,
    pub dim: usize,
    pub metric: Metric,
    pub normalize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Deserialize)]
struct RawIndexMeta {
    embedding_model_id: Option<String>,
    dim: Option<usize>,
    metric: Option<String>,
    #[serde(default)]
    normalize: bool,
    max_rows: Option<usize>,
    count: Option<usize>,
}

impl IndexMeta {
    pub fn parse(index: &str, text: &str) -> Result<Self, PackError> {
        let bad = |reason: String| PackError::MalformedIndexMeta {
            index: index.into(),
            reason,
        };

        let raw: RawIndexMeta = serde_json::from_str(text).map_err(|e| bad(e.to_string()))?;

        let embedding_model_id = raw
            .embedding_model_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| bad("missing embedding_model_id".into()))?;

        let dim = raw
            .dim
            .filter(|d| *d > 0)
            .ok_or_else(|| bad("missing or zero dim".into()))?;

        let metric = match raw.metric.as_deref().map(str::to_lowercase).as_deref() {
            Some("l2") => Metric::L2,
            Some("cosine") => Metric::Cosine,
            Some(other) => return Err(bad(format!("unsupported metric '{other}'"))),
            None => return Err(bad("missing metric".into())),
        };

        Ok(Self {
            embedding_model_id,
            dim,
            metric,
            normalize: raw.normalize,
            max_rows: raw.max_rows,
            count: raw.count,
        })
    }
}

/// Join pack-relative path segments with `/`.
pub fn join(root: &str, file: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        file.to_string()
    } else {
        format!("{root}/{file}")
    }
}
