//! The engine handle: owns loaded pack state and answers one question at a time.
//!
//! # Lifecycle
//!
//! `Unloaded → Loading → Loaded | Failed`. A failed load is terminal for
//! its root: initializing the same root again reports the stored failure
//! without touching the pack. `release()` returns to `Unloaded`, and so
//! does a load whose future is dropped before it completes.
//!
//! # Concurrency
//!
//! Exactly one question may be in flight. A second concurrent `ask` is
//! rejected with [`Error::Busy`] immediately; it is never queued.

use crate::analyzer::analyze;
use crate::context::{AssemblyInput, BudgetAssembler, TokenBudget};
use crate::normalize::{keyword_set, normalize, tokenize};
use crate::prompt::PromptBuilder;
use crate::router::QueryRouter;
use crate::scorer;
use crate::vector_path;
use regex_lite::Regex;
use rulebook_config::{EngineConfig, RetrievalMode};
use rulebook_core::bundle::{AskWarning, BundleEntity, ContextBundle, RoutingTrace};
use rulebook_core::error::{Error, PackError, Result};
use rulebook_core::reader::PackReader;
use rulebook_core::store::StoreConnector;
use rulebook_pack::{DataState, InitParams, VectorCache};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Per-question options.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Checked before analysis, before scoring, and before prompt building.
    pub cancel: Option<CancellationToken>,
    /// Query embedding, required in vector mode.
    pub query_vector: Option<Vec<f32>>,
}

/// The answer to one question, before any model runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResult {
    pub bundle: ContextBundle,
    pub prompt: String,
    pub prompt_char_len: usize,
    pub routing_trace: RoutingTrace,
    pub warnings: Vec<AskWarning>,
    pub mode: RetrievalMode,
}

/// Everything built once per successful load.
struct Session {
    data: Arc<DataState>,
    reader: Arc<dyn PackReader>,
    config: EngineConfig,
    patterns: Vec<Regex>,
    router: QueryRouter,
    assembler: BudgetAssembler,
    prompt: PromptBuilder,
}

enum LoadState {
    Unloaded,
    Loading { root: String },
    Loaded(Arc<Session>),
    Failed { root: String, error: Error },
}

const IDLE: u8 = 0;
const BUSY: u8 = 1;

/// Releases the question slot when dropped.
struct SlotGuard<'a>(&'a AtomicU8);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0.store(IDLE, Ordering::Release);
    }
}

/// Returns an abandoned load to `Unloaded` when dropped while armed.
struct LoadingGuard {
    state: Arc<Mutex<LoadState>>,
    root: String,
    armed: bool,
}

impl LoadingGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(root = %self.root, "Pack load abandoned");
        if let Ok(mut state) = self.state.try_lock() {
            reset_abandoned(&mut state, &self.root);
        } else if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let state = self.state.clone();
            let root = std::mem::take(&mut self.root);
            handle.spawn(async move {
                reset_abandoned(&mut *state.lock().await, &root);
            });
        }
    }
}

fn reset_abandoned(state: &mut LoadState, root: &str) {
    if matches!(state, LoadState::Loading { root: loading } if loading.as_str() == root) {
        *state = LoadState::Unloaded;
    }
}

pub struct Engine {
    config: EngineConfig,
    state: Arc<Mutex<LoadState>>,
    slot: AtomicU8,
    cache: VectorCache,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(LoadState::Unloaded)),
            slot: AtomicU8::new(IDLE),
            cache: VectorCache::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether a pack is loaded.
    pub async fn is_loaded(&self) -> bool {
        matches!(*self.state.lock().await, LoadState::Loaded(_))
    }

    /// Load a pack, or return the state already loaded from the same root.
    pub async fn initialize(
        &self,
        params: InitParams,
        reader: Arc<dyn PackReader>,
        connector: &dyn StoreConnector,
    ) -> Result<Arc<DataState>> {
        let root = reader.root().to_string();

        let previous = {
            let mut state = self.state.lock().await;
            match &*state {
                LoadState::Loaded(session) if session.data.root == root => {
                    debug!(%root, "Pack already loaded");
                    return Ok(session.data.clone());
                }
                LoadState::Failed { root: failed, error } if *failed == root => {
                    return Err(error.clone());
                }
                LoadState::Loading { root: loading } => {
                    debug!(%loading, "Load already in progress");
                    return Err(Error::Busy);
                }
                _ => {}
            }
            std::mem::replace(&mut *state, LoadState::Loading { root: root.clone() })
        };
        let guard = LoadingGuard {
            state: self.state.clone(),
            root: root.clone(),
            armed: true,
        };

        if let LoadState::Loaded(session) = previous {
            info!(old = %session.data.root, new = %root, "Replacing loaded pack");
            self.teardown(&session).await;
        }

        let outcome = self.load_session(params, reader, connector).await;

        let mut state = self.state.lock().await;
        guard.disarm();
        match outcome {
            Ok(session) => {
                let data = session.data.clone();
                *state = LoadState::Loaded(Arc::new(session));
                Ok(data)
            }
            Err(error) => {
                warn!(%root, kind = %error.kind(), %error, "Pack load failed");
                *state = LoadState::Failed {
                    root,
                    error: error.clone(),
                };
                Err(error)
            }
        }
    }

    async fn load_session(
        &self,
        mut params: InitParams,
        reader: Arc<dyn PackReader>,
        connector: &dyn StoreConnector,
    ) -> Result<Session> {
        // embedding identity is only checked on the vector path
        params.vector_path = self.config.retrieval_mode == RetrievalMode::Vector;
        if !params.vector_path {
            params.embedding_model_id = None;
        }

        let data = rulebook_pack::load(reader.as_ref(), connector, &params).await?;
        let (config, patterns, router) = match self.prepare(&data) {
            Ok(prepared) => prepared,
            Err(error) => {
                data.store.close().await;
                return Err(error);
            }
        };

        let assembler = BudgetAssembler::new(TokenBudget {
            total: config.token_budget,
            chars_per_token: config.chars_per_token,
        });
        let prompt = PromptBuilder::new(
            config.chat_template,
            config.system_instruction.clone(),
            config.prompt_char_limit(),
            config.chars_per_token,
        );

        Ok(Session {
            data: Arc::new(data),
            reader,
            config,
            patterns,
            router,
            assembler,
            prompt,
        })
    }

    /// Apply the pack's provider spec to the engine config and compile
    /// the per-load matchers.
    fn prepare(&self, data: &DataState) -> Result<(EngineConfig, Vec<Regex>, QueryRouter)> {
        let mut config = self.config.clone();
        let mut patterns = Vec::new();

        if let Some(provider) = &data.provider {
            if let Some(instruction) = &provider.system_instruction {
                config.system_instruction = instruction.clone();
            }
            if let Some(template) = provider.chat_template {
                config.chat_template = template;
            }
            if let Some(window) = provider.context_window_tokens {
                config.context_window_tokens = window;
            }
            patterns = provider
                .compile_patterns()
                .map_err(|e| PackError::MalformedRouterConfig {
                    reason: e.to_string(),
                })?;
        }

        config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        let router = QueryRouter::new().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        Ok((config, patterns, router))
    }

    async fn teardown(&self, session: &Session) {
        session.data.store.close().await;
        self.cache.clear().await;
    }

    /// Drop all loaded state: close the store and clear the vector cache.
    pub async fn release(&self) {
        let previous = std::mem::replace(&mut *self.state.lock().await, LoadState::Unloaded);
        if let LoadState::Loaded(session) = previous {
            self.teardown(&session).await;
            info!(root = %session.data.root, "Pack released");
        }
    }

    async fn session(&self) -> Result<Arc<Session>> {
        match &*self.state.lock().await {
            LoadState::Loaded(session) => Ok(session.clone()),
            _ => Err(Error::NotInitialized),
        }
    }

    fn acquire_slot(&self) -> Result<SlotGuard<'_>> {
        self.slot
            .compare_exchange(IDLE, BUSY, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| SlotGuard(&self.slot))
            .map_err(|_| Error::Busy)
    }

    /// Answer one question: analyze, route, score, assemble, render.
    pub async fn ask(&self, question: &str, options: AskOptions) -> Result<AskResult> {
        let _slot = self.acquire_slot()?;
        let session = self.session().await?;
        let request_id = Uuid::new_v4();

        let span = info_span!("ask", %request_id, mode = ?session.config.retrieval_mode);
        async move {
            let result = match session.config.retrieval_mode {
                RetrievalMode::Deterministic => {
                    self.ask_deterministic(&session, question, &options).await
                }
                RetrievalMode::Vector => self.ask_vector(&session, question, &options).await,
            };
            match &result {
                Ok(r) => info!(
                    entities = r.bundle.entities.len(),
                    rules = r.bundle.rules.len(),
                    prompt_chars = r.prompt_char_len,
                    "Question answered"
                ),
                Err(e) => warn!(kind = %e.kind(), error = %e, "Question failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn ask_deterministic(
        &self,
        session: &Session,
        question: &str,
        options: &AskOptions,
    ) -> Result<AskResult> {
        let data = &session.data;
        let config = &session.config;

        check_cancelled(options)?;
        let analysis =
            analyze(question, &data.router, &session.patterns, data.store.as_ref()).await?;
        let plan = session.router.plan(question, &analysis, &data.router, config);

        check_cancelled(options)?;
        let collected =
            scorer::collect(data.store.as_ref(), &analysis, &plan, &data.router, config).await?;

        let trace = RoutingTrace {
            resolution_step: analysis.resolution_step,
            sections_considered: plan.sections_considered,
            sections_selected: plan.section_intents,
            keyword_section_gated: plan.keyword_section_gated,
            hard_include_prefixes: plan.hard_include_prefixes,
            concept_default_rule_ids: plan.concept_default_rule_ids,
            definition_rule_ids: plan.definition_rule_ids,
            sections_defaulted: collected.sections_defaulted,
            ..Default::default()
        };
        let entities = analysis
            .resolved_entity
            .iter()
            .map(|e| BundleEntity {
                id: e.id.clone(),
                name: e.name.clone(),
                text: e.body_text.clone(),
            })
            .collect();

        let bundle = session.assembler.assemble(AssemblyInput {
            entities,
            rules: collected.rules,
            keywords: Some(&analysis.keyword_tokens),
            trace,
        });

        check_cancelled(options)?;
        Ok(finish(session, question, bundle, RetrievalMode::Deterministic))
    }

    async fn ask_vector(
        &self,
        session: &Session,
        question: &str,
        options: &AskOptions,
    ) -> Result<AskResult> {
        check_cancelled(options)?;
        let query = options.query_vector.as_deref().ok_or_else(|| Error::Config {
            message: "vector retrieval requires a query vector".into(),
        })?;

        check_cancelled(options)?;
        let hits = vector_path::retrieve(
            &session.data,
            session.reader.as_ref(),
            &self.cache,
            query,
            &session.config,
        )
        .await?;

        let keywords = keyword_set(&tokenize(&normalize(question)), &session.data.router);
        let bundle = session.assembler.assemble(AssemblyInput {
            entities: hits.entities,
            rules: hits.rules,
            keywords: Some(&keywords),
            trace: RoutingTrace::default(),
        });

        check_cancelled(options)?;
        Ok(finish(session, question, bundle, RetrievalMode::Vector))
    }
}

fn check_cancelled(options: &AskOptions) -> Result<()> {
    match &options.cancel {
        Some(token) if token.is_cancelled() => Err(Error::Cancelled),
        _ => Ok(()),
    }
}

fn finish(
    session: &Session,
    question: &str,
    mut bundle: ContextBundle,
    mode: RetrievalMode,
) -> AskResult {
    let built = session.prompt.build(question, &mut bundle);
    AskResult {
        routing_trace: bundle.routing_trace.clone(),
        bundle,
        prompt: built.prompt,
        prompt_char_len: built.char_len,
        warnings: built.warning.into_iter().collect(),
        mode,
    }
}
