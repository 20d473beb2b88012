//! Candidate scoring and rule collection.
//!
//! A rule's score is its token overlap with the query keywords plus its
//! overlap with the resolved entity's tokens. Collection order is
//! definitions, then mechanism rules (routed sections), then supporting
//! rules; a rule id keeps the first category it was seen in.

use futures::future::join_all;
use rulebook_config::{EngineConfig, RouterConfig};
use rulebook_core::bundle::{BundleRule, RuleCategory};
use rulebook_core::error::StoreError;
use rulebook_core::model::Rule;
use rulebook_core::query::{QueryAnalysis, RoutingPlan};
use rulebook_core::store::ContentStore;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// A rule that passed the score threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredRule {
    pub rule: Rule,
    pub score: u32,
    pub entity_overlap: u32,
}

/// Score one rule against the query and entity token sets.
pub fn score_rule(
    rule: &Rule,
    keywords: &BTreeSet<String>,
    entity_tokens: &BTreeSet<String>,
) -> (u32, u32) {
    let query_overlap = rule.tokens.intersection(keywords).count() as u32;
    let entity_overlap = rule.tokens.intersection(entity_tokens).count() as u32;
    (query_overlap + entity_overlap, entity_overlap)
}

/// Score, filter, and keep the top rules of one section.
pub fn rank_section(
    rules: Vec<Rule>,
    analysis: &QueryAnalysis,
    config: &EngineConfig,
) -> Vec<ScoredRule> {
    let entity_resolved = analysis.resolved_entity.is_some();

    let mut scored: Vec<ScoredRule> = rules
        .into_iter()
        .filter_map(|rule| {
            let (score, entity_overlap) =
                score_rule(&rule, &analysis.keyword_tokens, &analysis.entity_tokens);
            if score < config.min_rule_score || (entity_resolved && entity_overlap == 0) {
                return None;
            }
            Some(ScoredRule {
                rule,
                score,
                entity_overlap,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.rule.rule_id.cmp(&b.rule.rule_id))
    });
    scored.truncate(config.rules_per_section);
    scored
}

/// Rules chosen for a question, in bundle order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Collected {
    pub rules: Vec<BundleRule>,
    /// Sections that scored nothing and contributed their default rule.
    pub sections_defaulted: Vec<u32>,
}

struct SectionOutcome {
    scored: Vec<ScoredRule>,
    default: Option<Rule>,
}

async fn score_section(
    store: &dyn ContentStore,
    section: u32,
    analysis: &QueryAnalysis,
    router: &RouterConfig,
    config: &EngineConfig,
) -> Result<SectionOutcome, StoreError> {
    let rules = store.rules_in_section(section).await?;
    let candidates = rules.len();
    let scored = rank_section(rules, analysis, config);
    debug!(section, candidates, kept = scored.len(), "Section scored");

    if !scored.is_empty() {
        return Ok(SectionOutcome {
            scored,
            default: None,
        });
    }

    let default = match router.section_default(section) {
        Some(id) => store.rules_by_id(&[id.to_string()]).await?.into_iter().next(),
        None => None,
    };
    Ok(SectionOutcome { scored, default })
}

/// Collects rules in category order, skipping ids already taken.
struct Collector {
    seen: HashSet<String>,
    rules: Vec<BundleRule>,
}

impl Collector {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            rules: Vec::new(),
        }
    }

    fn push(&mut self, rule: Rule, category: RuleCategory, score: Option<u32>) -> bool {
        if !self.seen.insert(rule.rule_id.clone()) {
            return false;
        }
        self.rules.push(BundleRule {
            rule_id: rule.rule_id,
            section: rule.section,
            text: rule.text,
            category,
            score,
        });
        true
    }
}

/// Fetch and score everything the routing plan asks for.
pub async fn collect(
    store: &dyn ContentStore,
    analysis: &QueryAnalysis,
    plan: &RoutingPlan,
    router: &RouterConfig,
    config: &EngineConfig,
) -> Result<Collected, StoreError> {
    let mut collector = Collector::new();

    if !plan.definition_rule_ids.is_empty() {
        for rule in store.rules_by_id(&plan.definition_rule_ids).await? {
            collector.push(rule, RuleCategory::Definition, None);
        }
    }

    // join_all preserves input order
    let outcomes = join_all(
        plan.section_intents
            .iter()
            .map(|section| score_section(store, *section, analysis, router, config)),
    )
    .await;

    let mut sections_defaulted = Vec::new();
    for (section, outcome) in plan.section_intents.iter().zip(outcomes) {
        let outcome = outcome?;
        for scored in outcome.scored {
            collector.push(scored.rule, RuleCategory::Mechanism, Some(scored.score));
        }
        if let Some(rule) = outcome.default {
            sections_defaulted.push(*section);
            collector.push(rule, RuleCategory::Mechanism, None);
        }
    }

    let mut extra: Vec<Rule> = Vec::new();
    for prefix in &plan.hard_include_prefixes {
        extra.extend(
            store
                .rules_with_prefix(prefix, config.max_supporting_rules)
                .await?,
        );
    }
    if !plan.concept_default_rule_ids.is_empty() {
        extra.extend(store.rules_by_id(&plan.concept_default_rule_ids).await?);
    }

    let selected: BTreeSet<u32> = plan.section_intents.iter().copied().collect();
    let (in_routed, outside): (Vec<Rule>, Vec<Rule>) = extra
        .into_iter()
        .partition(|r| selected.contains(&r.section));

    for rule in in_routed {
        collector.push(rule, RuleCategory::Mechanism, None);
    }
    let mut supporting = 0;
    for rule in outside {
        if supporting >= config.max_supporting_rules {
            break;
        }
        if collector.push(rule, RuleCategory::Supporting, None) {
            supporting += 1;
        }
    }

    Ok(Collected {
        rules: collector.rules,
        sections_defaulted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::router::QueryRouter;
    use crate::test_helpers;

    async fn collect_for(question: &str, config: &EngineConfig) -> (RoutingPlan, Collected) {
        let store = test_helpers::store();
        let router = test_helpers::router();
        let analysis = analyze(question, &router, &[], &store).await.unwrap();
        let plan = QueryRouter::new()
            .unwrap()
            .plan(question, &analysis, &router, config);
        let collected = collect(&store, &analysis, &plan, &router, config)
            .await
            .unwrap();
        (plan, collected)
    }

    fn ids(collected: &Collected) -> Vec<&str> {
        collected.rules.iter().map(|r| r.rule_id.as_str()).collect()
    }

    fn analysis(keywords: &[&str], entity: &[&str]) -> QueryAnalysis {
        QueryAnalysis {
            normalized_query: keywords.join(" "),
            tokens: keywords.iter().map(|s| s.to_string()).collect(),
            keyword_tokens: keywords.iter().map(|s| s.to_string()).collect(),
            resolved_entity: (!entity.is_empty()).then(test_helpers::lightning_bolt),
            entity_tokens: entity.iter().map(|s| s.to_string()).collect(),
            resolution_step: None,
        }
    }

    #[test]
    fn score_sums_query_and_entity_overlap() {
        let rule = Rule::new("510.1", 510, "", "combat damage power");
        let a = analysis(&["combat"], &["damage", "power", "bolt"]);
        assert_eq!(score_rule(&rule, &a.keyword_tokens, &a.entity_tokens), (3, 2));
    }

    #[test]
    fn ties_break_by_rule_id_and_top_n_kept() {
        let rules = vec![
            Rule::new("510.2", 510, "", "combat damage"),
            Rule::new("510.1c", 510, "", "combat damage"),
            Rule::new("510.1", 510, "", "combat damage"),
            Rule::new("510.3", 510, "", "combat damage blocked"),
            Rule::new("510.4", 510, "", "combat"),
        ];
        let config = EngineConfig::default();
        let ranked = rank_section(rules, &analysis(&["combat", "damage", "blocked"], &[]), &config);
        let got: Vec<_> = ranked.iter().map(|s| s.rule.rule_id.as_str()).collect();
        assert_eq!(got, vec!["510.3", "510.1", "510.1c"]);
        assert_eq!(ranked[0].score, 3);
    }

    #[test]
    fn resolved_entity_requires_entity_overlap() {
        let rules = vec![
            Rule::new("510.1", 510, "", "combat damage"),
            Rule::new("120.3", 120, "", "damage player"),
        ];
        let a = analysis(&["combat", "damage"], &["player"]);
        let ranked = rank_section(rules, &a, &EngineConfig::default());
        let got: Vec<_> = ranked.iter().map(|s| s.rule.rule_id.as_str()).collect();
        assert_eq!(got, vec!["120.3"]);
    }

    #[tokio::test]
    async fn definitions_then_mechanism_with_defaults() {
        let config = EngineConfig::default();
        let (_, collected) =
            collect_for("What keyword abilities affect combat damage?", &config).await;
        // 120 scores nothing; its default 120.1 is already a definition
        assert_eq!(ids(&collected), vec!["120.1", "510.1", "510.1c", "510.2"]);
        assert_eq!(collected.rules[0].category, RuleCategory::Definition);
        assert_eq!(collected.sections_defaulted, vec![120]);
        assert!(
            collected.rules[1..]
                .iter()
                .all(|r| r.category == RuleCategory::Mechanism)
        );
    }

    #[tokio::test]
    async fn ability_rules_follow_scored_rules() {
        let config = EngineConfig::default();
        let (_, collected) = collect_for("How does trample work with deathtouch?", &config).await;
        assert_eq!(ids(&collected), vec!["702.2c", "702.2b", "702.19b"]);
        assert_eq!(collected.rules[0].score, Some(2));
        assert_eq!(collected.rules[1].score, None);
    }

    #[tokio::test]
    async fn entity_only_sections_use_defaults() {
        let config = EngineConfig::default();
        let (_, collected) = collect_for("What does Lightning Bolt do?", &config).await;
        assert_eq!(ids(&collected), vec!["115.1", "120.1", "510.1"]);
        assert_eq!(collected.sections_defaulted, vec![115, 120, 510]);
    }

    #[tokio::test]
    async fn citations_outside_routed_sections_are_supporting() {
        let config = EngineConfig {
            max_supporting_rules: 2,
            ..Default::default()
        };
        let (_, collected) = collect_for("Explain rule 702.19 and 510.1c", &config).await;
        // section 100 routes by fallback and declares no default rule
        assert_eq!(ids(&collected), vec!["702.19b", "702.19c"]);
        assert!(
            collected
                .rules
                .iter()
                .all(|r| r.category == RuleCategory::Supporting)
        );
    }
}
