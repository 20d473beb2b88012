//! Legacy embedding retrieval, used only when `retrieval_mode = "vector"`.
//!
//! Never mixed with the deterministic path within one answer.

use rulebook_config::EngineConfig;
use rulebook_core::bundle::{BundleEntity, BundleRule, RuleCategory};
use rulebook_core::error::Error;
use rulebook_core::model::Rule;
use rulebook_core::reader::PackReader;
use rulebook_pack::vector::fetch_chunks;
use rulebook_pack::{DataState, VectorCache};
use tracing::debug;

/// Nearest rules and entities for a query embedding.
#[derive(Debug, Default)]
pub struct VectorHits {
    pub entities: Vec<BundleEntity>,
    pub rules: Vec<BundleRule>,
}

pub async fn retrieve(
    data: &DataState,
    reader: &dyn PackReader,
    cache: &VectorCache,
    query: &[f32],
    config: &EngineConfig,
) -> Result<VectorHits, Error> {
    let rules_index = cache
        .get_or_load(
            reader,
            &data.index_identity("rules"),
            "rules",
            &data.manifest.rules.root,
            &data.rules_meta,
        )
        .await?;
    let cards_index = cache
        .get_or_load(
            reader,
            &data.index_identity("cards"),
            "cards",
            &data.manifest.cards.root,
            &data.cards_meta,
        )
        .await?;

    let rule_hits = rules_index.vectors.search(query, config.vector_top_k)?;
    let card_hits = cards_index.vectors.search(query, config.vector_entity_k)?;

    let rule_rows: Vec<usize> = rule_hits.iter().map(|n| n.row).collect();
    let card_rows: Vec<usize> = card_hits.iter().map(|n| n.row).collect();
    let rule_chunks = fetch_chunks(reader, "rules", &rules_index.chunks_path, &rule_rows).await?;
    let card_chunks = fetch_chunks(reader, "cards", &cards_index.chunks_path, &card_rows).await?;

    // distance order, not chunk-file order
    let rules = rule_hits
        .iter()
        .filter_map(|hit| rule_chunks.get(&hit.row))
        .map(|chunk| BundleRule {
            section: Rule::section_of(&chunk.id).unwrap_or_default(),
            rule_id: chunk.id.clone(),
            text: chunk.text.clone(),
            category: RuleCategory::Mechanism,
            score: None,
        })
        .collect::<Vec<_>>();

    let entities = card_hits
        .iter()
        .filter_map(|hit| card_chunks.get(&hit.row))
        .map(|chunk| BundleEntity {
            id: chunk.id.clone(),
            name: chunk.name.clone().unwrap_or_else(|| chunk.id.clone()),
            text: chunk.text.clone(),
        })
        .collect::<Vec<_>>();

    debug!(
        rules = rules.len(),
        entities = entities.len(),
        nearest = rule_hits.first().map(|n| n.distance),
        "Vector retrieval complete"
    );

    Ok(VectorHits { entities, rules })
}
