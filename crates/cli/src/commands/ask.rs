//! `rulebook ask`: Assemble the bounded prompt for one question.

use rulebook_config::{EngineConfig, RetrievalMode};
use rulebook_engine::{AskOptions, Engine};
use rulebook_pack::{FsPackReader, InitParams, SqliteConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Inputs for the legacy vector path. Ignored in deterministic mode.
#[derive(Debug, Default)]
pub struct VectorArgs {
    pub embedding_model: Option<String>,
    pub query_vector: Option<Vec<f32>>,
}

pub async fn run(
    pack: PathBuf,
    config: Option<PathBuf>,
    json: bool,
    question: String,
    vector: VectorArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => EngineConfig::load_from(&path)?,
        None => EngineConfig::load()?,
    };

    debug!(mode = ?config.retrieval_mode, budget = config.token_budget, "Engine config loaded");
    let (params, options) = request(config.retrieval_mode, vector)?;

    info!(pack = %pack.display(), "Loading pack");
    let engine = Engine::new(config);
    let reader = Arc::new(FsPackReader::new(&pack));
    let connector = SqliteConnector::new(&pack);

    let outcome = match engine.initialize(params, reader, &connector).await {
        Ok(_) => engine.ask(&question, options).await,
        Err(e) => Err(e),
    };
    engine.release().await;

    match outcome {
        Ok(result) if json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Ok(result) => {
            for warning in &result.warnings {
                eprintln!("warning: {warning}");
            }
            println!("{}", result.prompt);
            Ok(())
        }
        Err(e) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&e.to_json())?);
            }
            Err(e.into())
        }
    }
}

/// Load parameters and per-question options for the configured mode.
fn request(
    mode: RetrievalMode,
    vector: VectorArgs,
) -> Result<(InitParams, AskOptions), Box<dyn std::error::Error>> {
    match mode {
        RetrievalMode::Deterministic => Ok((InitParams::default(), AskOptions::default())),
        RetrievalMode::Vector => {
            let query_vector = vector
                .query_vector
                .ok_or("retrieval_mode = vector needs --query-vector")?;
            let params = InitParams {
                embedding_model_id: vector.embedding_model,
                ..Default::default()
            };
            let options = AskOptions {
                query_vector: Some(query_vector),
                ..Default::default()
            };
            Ok((params, options))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_mode_ignores_vector_args() {
        let vector = VectorArgs {
            embedding_model: Some("minilm-l6".into()),
            query_vector: Some(vec![1.0, 0.0]),
        };
        let (params, options) = request(RetrievalMode::Deterministic, vector).unwrap();
        assert_eq!(params, InitParams::default());
        assert!(options.query_vector.is_none());
    }

    #[test]
    fn vector_mode_requires_query_vector() {
        let err = request(RetrievalMode::Vector, VectorArgs::default()).unwrap_err();
        assert!(err.to_string().contains("--query-vector"));
    }

    #[test]
    fn vector_mode_passes_model_and_vector() {
        let vector = VectorArgs {
            embedding_model: Some("minilm-l6".into()),
            query_vector: Some(vec![0.5, 0.5]),
        };
        let (params, options) = request(RetrievalMode::Vector, vector).unwrap();
        assert_eq!(params.embedding_model_id.as_deref(), Some("minilm-l6"));
        assert_eq!(options.query_vector, Some(vec![0.5, 0.5]));
    }
}
