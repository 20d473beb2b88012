//! The context bundle handed to the prompt builder, and its routing trace.
//!
//! # Ordering
//!
//! Entities come first, then rules in category order
//! (definition → mechanism → supporting). Items are appended in that
//! order, so the "last appended" item is the last rule when any rule is
//! present, otherwise the last entity.

use crate::query::ResolutionStep;
use serde::{Deserialize, Serialize};

/// Why a rule was collected. Variant order is precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Fetched directly through the definitions map.
    Definition,
    /// Belongs to a routed section.
    Mechanism,
    /// Found through a hard include or concept default outside routed sections.
    Supporting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRule {
    pub rule_id: String,
    pub section: u32,
    pub text: String,
    pub category: RuleCategory,
    /// Overlap score, for rules that went through the scorer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntity {
    pub id: String,
    pub name: String,
    pub text: String,
}

/// An item removed from the bundle by [`ContextBundle::pop_last`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleItem {
    Entity(BundleEntity),
    Rule(BundleRule),
}

/// Parity trace of the routing and packing decisions for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_step: Option<ResolutionStep>,
    pub sections_considered: Vec<u32>,
    pub sections_selected: Vec<u32>,
    pub keyword_section_gated: bool,
    pub hard_include_prefixes: Vec<String>,
    pub concept_default_rule_ids: Vec<String>,
    pub definition_rule_ids: Vec<String>,
    /// Sections that scored nothing and contributed their default rule.
    pub sections_defaulted: Vec<u32>,
    /// Item ids that did not fit the token budget.
    pub dropped_for_budget: Vec<String>,
    /// Item ids removed by the prompt preflight loop.
    pub trimmed_for_prompt: Vec<String>,
}

/// The final ordered set of excerpts for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub entities: Vec<BundleEntity>,
    pub rules: Vec<BundleRule>,
    /// Query keyword tokens, sorted.
    pub keywords: Vec<String>,
    pub routing_trace: RoutingTrace,
    /// Running token estimate of all included items.
    pub estimated_tokens: usize,
    /// The budget this bundle was assembled against.
    pub budget: usize,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.rules.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.entities.len() + self.rules.len()
    }

    /// Remove the most recently appended item.
    pub fn pop_last(&mut self) -> Option<BundleItem> {
        if let Some(rule) = self.rules.pop() {
            return Some(BundleItem::Rule(rule));
        }
        self.entities.pop().map(BundleItem::Entity)
    }
}

impl BundleItem {
    /// Citation id of the item (`rule_id` or `card:<id>`).
    pub fn citation(&self) -> String {
        match self {
            Self::Entity(e) => format!("card:{}", e.id),
            Self::Rule(r) => r.rule_id.clone(),
        }
    }
}

/// Non-fatal conditions surfaced alongside a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AskWarning {
    /// The bundle was emptied and the bare prompt still exceeds the cap.
    PromptOverflow { prompt_chars: usize, cap: usize },
}

impl std::fmt::Display for AskWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PromptOverflow { prompt_chars, cap } => write!(
                f,
                "prompt is {prompt_chars} chars with an empty bundle (cap {cap})"
            ),
        }
    }
}
