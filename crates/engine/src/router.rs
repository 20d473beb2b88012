//! Maps an analyzed query to sections, hard includes, and concept defaults.

use crate::normalize::contains_phrase;
use regex_lite::Regex;
use rulebook_config::{EngineConfig, RouterConfig};
use rulebook_core::query::{QueryAnalysis, RoutingPlan};
use std::collections::{BTreeMap, BTreeSet};

/// Explicit rule citations in a question, e.g. `702.19b`.
const CITATION_PATTERN: &str = r"\b\d{3}\.\d+[a-z]?\b";

pub struct QueryRouter {
    citation: Regex,
}

impl QueryRouter {
    pub fn new() -> Result<Self, regex_lite::Error> {
        Ok(Self {
            citation: Regex::new(CITATION_PATTERN)?,
        })
    }

    /// Build the routing plan for one question.
    pub fn plan(
        &self,
        question: &str,
        analysis: &QueryAnalysis,
        router: &RouterConfig,
        config: &EngineConfig,
    ) -> RoutingPlan {
        let signal: BTreeSet<&String> = analysis
            .keyword_tokens
            .iter()
            .chain(analysis.entity_tokens.iter())
            .collect();

        let abilities: Vec<&str> = signal
            .iter()
            .filter_map(|t| router.ability_rule(t).map(|_| t.as_str()))
            .collect();

        let mut hits: BTreeMap<u32, usize> = BTreeMap::new();
        for token in &signal {
            let mut sections: BTreeSet<u32> = router
                .section_keywords
                .get(*token)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default();
            if router.ability_rule(token).is_some() {
                sections.insert(router.keyword_section);
            }
            for section in sections {
                *hits.entry(section).or_default() += 1;
            }
        }

        let mut ranked: Vec<(u32, usize)> = hits.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let sections_considered: Vec<u32> = ranked.iter().map(|(s, _)| *s).collect();

        let keyword_section_gated =
            abilities.is_empty() && sections_considered.contains(&router.keyword_section);

        let mut section_intents: Vec<u32> = sections_considered
            .iter()
            .copied()
            .filter(|s| !(keyword_section_gated && *s == router.keyword_section))
            .take(config.max_sections)
            .collect();
        if section_intents.is_empty() {
            section_intents = router
                .fallback_sections
                .iter()
                .copied()
                .take(config.max_sections)
                .collect();
        }

        let mut concept_default_rule_ids = Vec::new();
        for (phrase, ids) in &router.concepts {
            if contains_phrase(&analysis.normalized_query, phrase) {
                push_unique(&mut concept_default_rule_ids, ids.iter().cloned());
            }
        }
        // ability rules bypass min_rule_score by riding along as concept defaults
        for ability in &abilities {
            push_unique(
                &mut concept_default_rule_ids,
                router.ability_rule(ability).map(str::to_string),
            );
        }

        let mut definition_rule_ids = Vec::new();
        for token in &analysis.keyword_tokens {
            if let Some(ids) = router.definitions.get(token) {
                push_unique(&mut definition_rule_ids, ids.iter().cloned());
            }
        }
        definition_rule_ids.truncate(config.max_definitions);

        RoutingPlan {
            section_intents,
            sections_considered,
            keyword_section_gated,
            hard_include_prefixes: self.hard_includes(question),
            concept_default_rule_ids,
            definition_rule_ids,
        }
    }

    /// Citations found in the lowercased raw question, first-seen order.
    pub fn hard_includes(&self, question: &str) -> Vec<String> {
        let lowered = question.to_lowercase();
        let mut prefixes = Vec::new();
        push_unique(
            &mut prefixes,
            self.citation
                .find_iter(&lowered)
                .map(|m| m.as_str().to_string()),
        );
        prefixes
    }
}

fn push_unique(into: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::test_helpers;

    async fn plan_for(question: &str) -> RoutingPlan {
        let store = test_helpers::store();
        let router = test_helpers::router();
        let analysis = analyze(question, &router, &[], &store).await.unwrap();
        QueryRouter::new()
            .unwrap()
            .plan(question, &analysis, &router, &EngineConfig::default())
    }

    #[tokio::test]
    async fn keyword_section_gated_without_ability() {
        let plan = plan_for("What keyword abilities affect combat damage?").await;
        assert!(plan.keyword_section_gated);
        assert!(plan.sections_considered.contains(&702));
        assert!(!plan.section_intents.contains(&702));
        assert_eq!(plan.section_intents, vec![510, 120]);
        assert_eq!(plan.definition_rule_ids, vec!["120.1"]);
        assert_eq!(plan.concept_default_rule_ids, vec!["510.1"]);
    }

    #[tokio::test]
    async fn ability_token_opens_keyword_section() {
        let plan = plan_for("How does trample work with deathtouch?").await;
        assert!(!plan.keyword_section_gated);
        assert_eq!(plan.section_intents, vec![702]);
        // ability rule ids follow token order
        assert_eq!(plan.concept_default_rule_ids, vec!["702.2b", "702.19b"]);
    }

    #[tokio::test]
    async fn entity_tokens_route_sections() {
        let plan = plan_for("What does Lightning Bolt do?").await;
        // damage → 120, 510; target → 115, 608; ties broken by section number
        assert_eq!(plan.sections_considered, vec![115, 120, 510, 608]);
        assert_eq!(plan.section_intents, vec![115, 120, 510]);
        assert!(plan.definition_rule_ids.is_empty());
    }

    #[tokio::test]
    async fn falls_back_when_nothing_routes() {
        let plan = plan_for("Explain rule 702.19b and 510.1c, then 702.19b again").await;
        assert_eq!(plan.section_intents, vec![100]);
        assert!(plan.sections_considered.is_empty());
        assert_eq!(plan.hard_include_prefixes, vec!["702.19b", "510.1c"]);
    }

    #[test]
    fn citation_pattern_needs_three_digit_section() {
        let router = QueryRouter::new().unwrap();
        assert!(router.hard_includes("see 70.1 or 7021.3").is_empty());
        assert_eq!(router.hard_includes("Per 510.2, ..."), vec!["510.2"]);
    }
}
