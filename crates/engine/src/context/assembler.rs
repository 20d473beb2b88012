//! Budget assembly: pack entities and rules into a bounded bundle.
//!
//! Items are appended in fixed priority order:
//!
//! 1. **Entities** (resolved card text)
//! 2. **Definition rules**
//! 3. **Mechanism rules** (routed sections)
//! 4. **Supporting rules** (hard includes and concept defaults elsewhere)
//!
//! Each item is appended only while the running estimate stays within the
//! budget. Assembly stops at the first item that does not fit, even if a
//! later, smaller item would. The greedy order is part of the output
//! contract: changing it changes which rules reach the model.
//!
//! # Determinism
//!
//! Identical inputs always produce identical bundles. No random or
//! time-dependent logic is used during assembly.

use crate::context::token;
use rulebook_core::bundle::{BundleEntity, BundleItem, BundleRule, ContextBundle, RoutingTrace};
use std::collections::BTreeSet;
use tracing::debug;

// ── Types ─────────────────────────────────────────────────────────────────

/// Token budget configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    /// Total estimated tokens the bundle may occupy.
    pub total: usize,
    /// Divisor for the character heuristic.
    pub chars_per_token: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            total: 700,
            chars_per_token: 4,
        }
    }
}

/// Everything the assembler packs for a single question.
#[derive(Debug, Default)]
pub struct AssemblyInput<'a> {
    pub entities: Vec<BundleEntity>,
    /// Rules in category order.
    pub rules: Vec<BundleRule>,
    pub keywords: Option<&'a BTreeSet<String>>,
    pub trace: RoutingTrace,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The budget assembler. Stateless; build one per loaded config.
pub struct BudgetAssembler {
    budget: TokenBudget,
}

impl BudgetAssembler {
    pub fn new(budget: TokenBudget) -> Self {
        Self { budget }
    }

    /// Estimated cost of one bundle item.
    pub fn cost(&self, item: &BundleItem) -> usize {
        let text = match item {
            BundleItem::Entity(e) => &e.text,
            BundleItem::Rule(r) => &r.text,
        };
        token::estimate_tokens(text, self.budget.chars_per_token)
    }

    /// Pack items greedily under the budget.
    pub fn assemble(&self, input: AssemblyInput<'_>) -> ContextBundle {
        let mut rules = input.rules;
        // stable: keeps the collection order within a category
        rules.sort_by_key(|r| r.category);

        let items = input
            .entities
            .into_iter()
            .map(BundleItem::Entity)
            .chain(rules.into_iter().map(BundleItem::Rule));

        let mut bundle = ContextBundle {
            keywords: input
                .keywords
                .map(|k| k.iter().cloned().collect())
                .unwrap_or_default(),
            routing_trace: input.trace,
            budget: self.budget.total,
            ..Default::default()
        };

        let mut full = false;
        for item in items {
            let cost = self.cost(&item);
            if full || bundle.estimated_tokens + cost > self.budget.total {
                full = true;
                bundle.routing_trace.dropped_for_budget.push(item.citation());
                continue;
            }
            bundle.estimated_tokens += cost;
            match item {
                BundleItem::Entity(e) => bundle.entities.push(e),
                BundleItem::Rule(r) => bundle.rules.push(r),
            }
        }

        debug!(
            items = bundle.item_count(),
            dropped = bundle.routing_trace.dropped_for_budget.len(),
            tokens = bundle.estimated_tokens,
            budget = self.budget.total,
            "Bundle assembled"
        );
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulebook_core::bundle::RuleCategory;
    use rulebook_core::model::Rule;

    fn rule(id: &str, chars: usize, category: RuleCategory) -> BundleRule {
        BundleRule {
            rule_id: id.into(),
            section: Rule::section_of(id).unwrap(),
            text: "x".repeat(chars),
            category,
            score: None,
        }
    }

    fn entity(chars: usize) -> BundleEntity {
        BundleEntity {
            id: "c1".into(),
            name: "Lightning Bolt".into(),
            text: "x".repeat(chars),
        }
    }

    fn assembler(total: usize) -> BudgetAssembler {
        BudgetAssembler::new(TokenBudget {
            total,
            chars_per_token: 4,
        })
    }

    #[test]
    fn everything_fits() {
        let bundle = assembler(100).assemble(AssemblyInput {
            entities: vec![entity(40)],
            rules: vec![
                rule("120.1", 40, RuleCategory::Definition),
                rule("510.1", 40, RuleCategory::Mechanism),
            ],
            ..Default::default()
        });
        assert_eq!(bundle.item_count(), 3);
        assert_eq!(bundle.estimated_tokens, 30);
        assert!(bundle.routing_trace.dropped_for_budget.is_empty());
    }

    #[test]
    fn stops_at_first_overflow() {
        let bundle = assembler(25).assemble(AssemblyInput {
            entities: vec![entity(40)],
            rules: vec![
                rule("120.1", 40, RuleCategory::Definition),
                rule("510.1", 80, RuleCategory::Mechanism),
                // would fit on its own, but assembly already stopped
                rule("510.2", 4, RuleCategory::Mechanism),
            ],
            ..Default::default()
        });
        assert_eq!(bundle.item_count(), 2);
        assert_eq!(bundle.estimated_tokens, 20);
        assert_eq!(bundle.routing_trace.dropped_for_budget, vec!["510.1", "510.2"]);
    }

    #[test]
    fn estimate_never_exceeds_budget() {
        for total in [0, 1, 9, 10, 11, 33, 700] {
            let bundle = assembler(total).assemble(AssemblyInput {
                entities: vec![entity(37)],
                rules: (0..10)
                    .map(|i| rule(&format!("510.{i}"), 13 * i + 1, RuleCategory::Mechanism))
                    .collect(),
                ..Default::default()
            });
            assert!(bundle.estimated_tokens <= total, "budget {total}");
            assert_eq!(bundle.budget, total);
        }
    }

    #[test]
    fn rules_ordered_by_category_stably() {
        let bundle = assembler(700).assemble(AssemblyInput {
            rules: vec![
                rule("702.19b", 4, RuleCategory::Supporting),
                rule("510.2", 4, RuleCategory::Mechanism),
                rule("120.1", 4, RuleCategory::Definition),
                rule("510.1", 4, RuleCategory::Mechanism),
            ],
            ..Default::default()
        });
        let ids: Vec<_> = bundle.rules.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["120.1", "510.2", "510.1", "702.19b"]);
    }

    #[test]
    fn keywords_copied_sorted() {
        let keywords: BTreeSet<String> =
            ["trample", "deathtouch"].iter().map(|s| s.to_string()).collect();
        let bundle = assembler(10).assemble(AssemblyInput {
            keywords: Some(&keywords),
            ..Default::default()
        });
        assert_eq!(bundle.keywords, vec!["deathtouch", "trample"]);
        assert!(bundle.is_empty());
    }
}
