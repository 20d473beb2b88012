//! Query analysis and entity resolution.
//!
//! Resolution tries, in order, stopping at the first hit:
//! 1. provider extraction patterns (capture group 1)
//! 2. the whole normalized query
//! 3. n-grams anchored at the query start, longest first (n ≥ 2)
//! 4. n-grams at any position, longest first, then leftmost
//! 5. the leading token alone
//!
//! Every candidate goes through the `name_prefix` index and then an exact
//! normalized-name comparison. Nothing is fuzzy: a hit is unique or absent.

use crate::normalize::{entity_tokens, keyword_set, normalize, tokenize};
use regex_lite::Regex;
use rulebook_config::{ResolverThresholds, RouterConfig};
use rulebook_core::error::StoreError;
use rulebook_core::model::Entity;
use rulebook_core::query::{QueryAnalysis, ResolutionStep};
use rulebook_core::store::ContentStore;
use std::collections::BTreeMap;
use tracing::debug;

/// Looks up candidate names, memoizing prefix queries for one question.
pub struct EntityResolver<'a> {
    store: &'a dyn ContentStore,
    thresholds: &'a ResolverThresholds,
    by_prefix: BTreeMap<String, Vec<Entity>>,
}

impl<'a> EntityResolver<'a> {
    pub fn new(store: &'a dyn ContentStore, thresholds: &'a ResolverThresholds) -> Self {
        Self {
            store,
            thresholds,
            by_prefix: BTreeMap::new(),
        }
    }

    /// Exact lookup of one normalized candidate name.
    pub async fn lookup(&mut self, candidate: &str) -> Result<Option<Entity>, StoreError> {
        if candidate.chars().count() < self.thresholds.min_name_len {
            return Ok(None);
        }
        let prefix: String = candidate.chars().take(self.thresholds.prefix_len).collect();

        if !self.by_prefix.contains_key(&prefix) {
            let found = self.store.entities_with_prefix(&prefix).await?;
            self.by_prefix.insert(prefix.clone(), found);
        }

        Ok(self
            .by_prefix
            .get(&prefix)
            .and_then(|entities| entities.iter().find(|e| e.normalized_name == candidate))
            .cloned())
    }

    /// Number of distinct prefix queries issued so far.
    pub fn prefix_queries(&self) -> usize {
        self.by_prefix.len()
    }

    /// Run the resolution steps over an analyzed query.
    pub async fn resolve(
        &mut self,
        normalized_query: &str,
        tokens: &[String],
        patterns: &[Regex],
    ) -> Result<Option<(Entity, ResolutionStep)>, StoreError> {
        for pattern in patterns {
            let Some(captured) = pattern.captures(normalized_query).and_then(|c| c.get(1)) else {
                continue;
            };
            let candidate = normalize(captured.as_str());
            if let Some(entity) = self.lookup(&candidate).await? {
                return Ok(Some((entity, ResolutionStep::Pattern)));
            }
        }

        if let Some(entity) = self.lookup(normalized_query).await? {
            return Ok(Some((entity, ResolutionStep::ExactQuery)));
        }

        let longest = self.thresholds.max_ngram.min(tokens.len());

        for n in (2..=longest).rev() {
            let candidate = tokens[..n].join(" ");
            if let Some(entity) = self.lookup(&candidate).await? {
                return Ok(Some((entity, ResolutionStep::AnchoredNgram)));
            }
        }

        for n in (2..=longest).rev() {
            // start 0 was covered by the anchored pass
            for start in 1..=tokens.len() - n {
                let candidate = tokens[start..start + n].join(" ");
                if let Some(entity) = self.lookup(&candidate).await? {
                    return Ok(Some((entity, ResolutionStep::WindowNgram)));
                }
            }
        }

        if let Some(first) = tokens.first() {
            if let Some(entity) = self.lookup(first).await? {
                return Ok(Some((entity, ResolutionStep::AnchoredUnigram)));
            }
        }

        Ok(None)
    }
}

/// Normalize, tokenize, and resolve at most one entity.
pub async fn analyze(
    question: &str,
    router: &RouterConfig,
    patterns: &[Regex],
    store: &dyn ContentStore,
) -> Result<QueryAnalysis, StoreError> {
    let normalized_query = normalize(question);
    let tokens = tokenize(&normalized_query);
    let keyword_tokens = keyword_set(&tokens, router);

    let mut resolver = EntityResolver::new(store, &router.resolver);
    let resolved = resolver.resolve(&normalized_query, &tokens, patterns).await?;

    let (resolved_entity, resolution_step, entity_tokens) = match resolved {
        Some((entity, step)) => {
            let tokens = entity_tokens(&entity.normalized_name, &entity.body_text, router);
            (Some(entity), Some(step), tokens)
        }
        None => (None, None, Default::default()),
    };

    debug!(
        keywords = keyword_tokens.len(),
        entity = resolved_entity.as_ref().map(|e| e.id.as_str()),
        step = ?resolution_step,
        prefix_queries = resolver.prefix_queries(),
        "Query analyzed"
    );

    Ok(QueryAnalysis {
        normalized_query,
        tokens,
        keyword_tokens,
        resolved_entity,
        entity_tokens,
        resolution_step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers;
    use rulebook_pack::InMemoryStore;

    async fn run(question: &str, patterns: &[Regex]) -> QueryAnalysis {
        let store = test_helpers::store();
        analyze(question, &test_helpers::router(), patterns, &store)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn resolves_entity_inside_question() {
        let analysis = run("What does Lightning Bolt do?", &[]).await;
        assert_eq!(analysis.resolved_entity_name(), Some("Lightning Bolt"));
        assert_eq!(analysis.resolution_step, Some(ResolutionStep::WindowNgram));
        assert!(analysis.entity_tokens.contains("damage"));
        assert!(analysis.keyword_tokens.contains("bolt"));
        assert!(!analysis.keyword_tokens.contains("what"));
    }

    #[tokio::test]
    async fn exact_query_wins_over_ngrams() {
        let analysis = run("  LIGHTNING   bolt ", &[]).await;
        assert_eq!(analysis.resolution_step, Some(ResolutionStep::ExactQuery));
    }

    #[tokio::test]
    async fn anchored_ngram_before_window() {
        let analysis = run("Llanowar Elves and Lightning Bolt", &[]).await;
        assert_eq!(analysis.resolved_entity_name(), Some("Llanowar Elves"));
        assert_eq!(analysis.resolution_step, Some(ResolutionStep::AnchoredNgram));
    }

    #[tokio::test]
    async fn pattern_runs_first() {
        let patterns = vec![Regex::new(r"^rulings for (.+?) and").unwrap()];
        let analysis = run("Rulings for Lightning Bolt and Llanowar Elves", &patterns).await;
        assert_eq!(analysis.resolved_entity_name(), Some("Lightning Bolt"));
        assert_eq!(analysis.resolution_step, Some(ResolutionStep::Pattern));
    }

    #[tokio::test]
    async fn anchored_unigram_is_last_resort() {
        let store = InMemoryStore::new(3).with_entity(Entity {
            id: "c9".into(),
            name: "Fog".into(),
            normalized_name: "fog".into(),
            body_text: "Prevent all combat damage.".into(),
        });
        let analysis = analyze("fog during combat", &test_helpers::router(), &[], &store)
            .await
            .unwrap();
        assert_eq!(analysis.resolution_step, Some(ResolutionStep::AnchoredUnigram));
    }

    #[tokio::test]
    async fn no_entity_is_not_an_error() {
        let analysis = run("How does trample work with deathtouch?", &[]).await;
        assert!(analysis.resolved_entity.is_none());
        assert!(analysis.entity_tokens.is_empty());
        assert!(analysis.keyword_tokens.contains("trample"));
        assert!(analysis.keyword_tokens.contains("deathtouch"));
    }

    #[tokio::test]
    async fn prefix_queries_are_memoized() {
        let store = test_helpers::store();
        let router = test_helpers::router();
        let mut resolver = EntityResolver::new(&store, &router.resolver);
        resolver.lookup("lightning bolt").await.unwrap();
        resolver.lookup("lightning helix").await.unwrap();
        resolver.lookup("li").await.unwrap();
        assert_eq!(resolver.prefix_queries(), 1);
        assert_eq!(store.query_count(), 1);
    }
}
