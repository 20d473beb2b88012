//! `rulebook validate`: Load a pack and report what was found.

use rulebook_pack::{DataState, FsPackReader, InitParams, SqliteConnector};
use serde_json::{Value, json};
use std::path::PathBuf;

pub async fn run(
    pack: PathBuf,
    embedding_id: Option<String>,
    verify_counts: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader = FsPackReader::new(&pack);
    let connector = SqliteConnector::new(&pack);
    let params = InitParams {
        embedding_model_id: embedding_id,
        verify_store_counts: verify_counts,
        ..Default::default()
    };

    match rulebook_pack::load(&reader, &connector, &params).await {
        Ok(state) => {
            println!("{}", serde_json::to_string_pretty(&summary(&state))?);
            state.store.close().await;
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_json())?);
            Err(e.into())
        }
    }
}

/// A JSON summary of a loaded pack.
pub fn summary(state: &DataState) -> Value {
    json!({
        "root": state.root,
        "fingerprint": state.fingerprint,
        "loaded_at": state.loaded_at,
        "pack_schema_version": state.manifest.pack_schema_version,
        "retrieval_format_version": state.manifest.retrieval_format_version,
        "router_version": state.router.version,
        "provider_spec": state.provider.is_some(),
        "store": state.store.name(),
        "indices": {
            "rules": state.rules_meta,
            "cards": state.cards_meta,
        },
    })
}
