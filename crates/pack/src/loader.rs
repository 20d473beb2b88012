//! Pack loading and validation.
//!
//! `load` reads the manifest first and stops at the first failure, so a
//! pack with an unsupported schema never has its other files touched.

use crate::manifest::{
    INDEX_META_FILE, IndexMeta, IndexSummary, MANIFEST_FILE, Manifest, PROVIDER_SPEC_FILE,
    ROUTER_CONFIG_FILE,
};
use chrono::{DateTime, Utc};
use rulebook_config::provider::ProviderSpec;
use rulebook_config::router::RouterConfig;
use rulebook_core::error::{Error, PackError};
use rulebook_core::reader::PackReader;
use rulebook_core::store::{ContentStore, StoreConnector};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// Caller-supplied load parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitParams {
    /// Embedding model the caller queries with. When set, both indices
    /// must declare the same id.
    pub embedding_model_id: Option<String>,
    /// The vector path will query both indices with one vector, so they
    /// must agree on model id and dimension.
    pub vector_path: bool,
    /// Also compare declared counts against the store's row counts.
    pub verify_store_counts: bool,
}

/// Everything loaded from one pack root. Immutable once built.
pub struct DataState {
    pub root: String,
    pub manifest: Manifest,
    pub rules_meta: IndexMeta,
    pub cards_meta: IndexMeta,
    pub router: RouterConfig,
    pub provider: Option<ProviderSpec>,
    pub store: Arc<dyn ContentStore>,
    /// SHA-256 of the manifest text, hex encoded.
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

impl std::fmt::Debug for DataState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataState")
            .field("root", &self.root)
            .field("fingerprint", &self.fingerprint)
            .field("store", &self.store.name())
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

impl DataState {
    /// Identity of an index for cache keys: fingerprint, index, model, dim.
    pub fn index_identity(&self, index: &str) -> String {
        let meta = match index {
            "cards" => &self.cards_meta,
            _ => &self.rules_meta,
        };
        format!(
            "{}:{index}:{}:{}",
            self.fingerprint, meta.embedding_model_id, meta.dim
        )
    }
}

/// Load and validate a pack through the host's reader and store connector.
pub async fn load(
    reader: &dyn PackReader,
    connector: &dyn StoreConnector,
    params: &InitParams,
) -> Result<DataState, Error> {
    let manifest_text = reader.read_text(MANIFEST_FILE).await?;
    let manifest = Manifest::parse(&manifest_text)?;
    let fingerprint = hex_digest(manifest_text.as_bytes());
    debug!(root = reader.root(), %fingerprint, "Manifest accepted");

    let rules_meta = read_index_meta(reader, "rules", &manifest.rules).await?;
    let cards_meta = read_index_meta(reader, "cards", &manifest.cards).await?;

    if params.vector_path || params.embedding_model_id.is_some() {
        check_embedding_identity(&rules_meta, &cards_meta, params.embedding_model_id.as_deref())?;
    }

    check_declared_count("rules", &manifest.rules, &rules_meta)?;
    check_declared_count("cards", &manifest.cards, &cards_meta)?;

    let router_text = reader.read_text(ROUTER_CONFIG_FILE).await?;
    let router = RouterConfig::from_json(&router_text)
        .map_err(|e| PackError::MalformedRouterConfig {
            reason: e.to_string(),
        })?;

    let provider = match reader.read_text_optional(PROVIDER_SPEC_FILE).await? {
        Some(text) => Some(ProviderSpec::from_json(&text).map_err(|e| {
            PackError::MalformedRouterConfig {
                reason: format!("{PROVIDER_SPEC_FILE}: {e}"),
            }
        })?),
        None => None,
    };

    let store = connector.open(&manifest.database).await?;

    if params.verify_store_counts {
        if let Err(error) = verify_store_counts(store.as_ref(), &manifest).await {
            store.close().await;
            return Err(error);
        }
    }

    info!(
        root = reader.root(),
        store = store.name(),
        embedding_model = %rules_meta.embedding_model_id,
        has_provider_spec = provider.is_some(),
        "Pack loaded"
    );

    Ok(DataState {
        root: reader.root().to_string(),
        manifest,
        rules_meta,
        cards_meta,
        router,
        provider,
        store,
        fingerprint,
        loaded_at: Utc::now(),
    })
}

async fn read_index_meta(
    reader: &dyn PackReader,
    index: &str,
    summary: &IndexSummary,
) -> Result<IndexMeta, Error> {
    let path = Manifest::index_meta_path(summary);
    let text = reader.read_text(&path).await?;
    let meta = IndexMeta::parse(index, &text)?;
    debug!(index, file = INDEX_META_FILE, dim = meta.dim, "Index metadata accepted");
    Ok(meta)
}

fn check_embedding_identity(
    rules: &IndexMeta,
    cards: &IndexMeta,
    configured: Option<&str>,
) -> Result<(), PackError> {
    if rules.embedding_model_id != cards.embedding_model_id || rules.dim != cards.dim {
        return Err(PackError::IndexEmbeddingMismatch {
            rules: rules.embedding_model_id.clone(),
            rules_dim: rules.dim,
            cards: cards.embedding_model_id.clone(),
            cards_dim: cards.dim,
        });
    }
    match configured {
        Some(id) if id != rules.embedding_model_id => Err(PackError::EmbeddingMismatch {
            configured: id.to_string(),
            rules: rules.embedding_model_id.clone(),
            cards: cards.embedding_model_id.clone(),
        }),
        _ => Ok(()),
    }
}

async fn verify_store_counts(store: &dyn ContentStore, manifest: &Manifest) -> Result<(), Error> {
    if let Some(declared) = manifest.rules.count {
        let found = store.rule_count().await?;
        ensure_count("rules", declared, found)?;
    }
    if let Some(declared) = manifest.cards.count {
        let found = store.entity_count().await?;
        ensure_count("cards", declared, found)?;
    }
    Ok(())
}

fn check_declared_count(
    index: &str,
    summary: &IndexSummary,
    meta: &IndexMeta,
) -> Result<(), PackError> {
    match (summary.count, meta.count) {
        (Some(declared), Some(found)) => ensure_count(index, declared, found),
        _ => Ok(()),
    }
}

fn ensure_count(index: &str, declared: usize, found: usize) -> Result<(), PackError> {
    if declared == found {
        Ok(())
    } else {
        Err(PackError::CountsMismatch {
            index: index.into(),
            declared,
            found,
        })
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
