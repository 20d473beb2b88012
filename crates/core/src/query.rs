//! Per-question values: the analyzed query and the routing plan.
//!
//! Both are created fresh for every question and discarded once the
//! prompt is built.

use crate::model::Entity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which resolver step produced the entity hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStep {
    /// An explicit extraction pattern captured the name.
    Pattern,
    /// The whole normalized query is an entity name.
    ExactQuery,
    /// Longest n-gram (n ≥ 2) anchored at the query start.
    AnchoredNgram,
    /// Longest n-gram (n ≥ 2) at any window position.
    WindowNgram,
    /// Single leading token.
    AnchoredUnigram,
}

/// The analyzed question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Lowercased, diacritic-folded, whitespace-collapsed question.
    pub normalized_query: String,

    /// All tokens of the normalized query, in order.
    pub tokens: Vec<String>,

    /// Tokens surviving the length and stopword filters; used for scoring.
    pub keyword_tokens: BTreeSet<String>,

    /// The resolved entity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_entity: Option<Entity>,

    /// Keyword tokens of the resolved entity's name and body.
    #[serde(default)]
    pub entity_tokens: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_step: Option<ResolutionStep>,
}

impl QueryAnalysis {
    pub fn resolved_entity_name(&self) -> Option<&str> {
        self.resolved_entity.as_ref().map(|e| e.name.as_str())
    }
}

/// Output of the router: what to score and what to always include.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPlan {
    /// Sections to score, highest priority first.
    pub section_intents: Vec<u32>,

    /// Every section that received a routing signal (superset of `section_intents`).
    pub sections_considered: Vec<u32>,

    /// True when the keyword-ability section was routed but gated off.
    pub keyword_section_gated: bool,

    /// Rule-id prefixes that are always included (explicit citations).
    pub hard_include_prefixes: Vec<String>,

    /// Exact rule ids attached to detected concepts and abilities.
    pub concept_default_rule_ids: Vec<String>,

    /// Definition rule ids (already capped).
    pub definition_rule_ids: Vec<String>,
}
