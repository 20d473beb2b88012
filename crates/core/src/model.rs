//! Read-only records stored in a pack: rules and named entities (cards).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single rule passage, e.g. `702.19a`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique stable key.
    pub rule_id: String,

    /// Section number the rule belongs to (`702` for `702.19a`).
    pub section: u32,

    /// Canonical rule text.
    pub text: String,

    /// Precomputed normalized token set (from the `token_index` column).
    #[serde(default)]
    pub tokens: BTreeSet<String>,
}

impl Rule {
    /// Build a rule from its stored columns. `token_index` is a
    /// whitespace-separated list of normalized tokens.
    pub fn new(
        rule_id: impl Into<String>,
        section: u32,
        text: impl Into<String>,
        token_index: &str,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            section,
            text: text.into(),
            tokens: token_index.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Parse the section number out of a rule id (`"702.19a"` → `702`).
    pub fn section_of(rule_id: &str) -> Option<u32> {
        let digits: String = rule_id.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }
}

/// A named game object with canonical text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    /// Unique lookup key, produced by the same normalization as queries.
    pub normalized_name: String,
    pub body_text: String,
}
