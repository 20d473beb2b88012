//! Router configuration: the versioned, externally supplied routing asset.
//!
//! Shipped inside a pack as `router/router_config.json`. The engine only
//! consumes it: stopwords, resolver thresholds, keyword→ability map,
//! definitions, section keywords, section defaults, and concept phrases.

use crate::DocumentError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Thresholds for the query analyzer and entity resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverThresholds {
    /// Tokens shorter than this never become keywords.
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,

    /// Candidate names shorter than this are never looked up.
    #[serde(default = "default_min_name_len")]
    pub min_name_len: usize,

    /// Length of the keys in the `name_prefix` table.
    #[serde(default = "default_prefix_len")]
    pub prefix_len: usize,

    /// Longest n-gram tried during resolution.
    #[serde(default = "default_max_ngram")]
    pub max_ngram: usize,
}

fn default_min_token_len() -> usize {
    3
}
fn default_min_name_len() -> usize {
    3
}
fn default_prefix_len() -> usize {
    3
}
fn default_max_ngram() -> usize {
    4
}

impl Default for ResolverThresholds {
    fn default() -> Self {
        Self {
            min_token_len: default_min_token_len(),
            min_name_len: default_min_name_len(),
            prefix_len: default_prefix_len(),
            max_ngram: default_max_ngram(),
        }
    }
}

/// The routing asset. Ordered maps keep every lookup deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Asset version, echoed in logs.
    pub version: String,

    #[serde(default)]
    pub stopwords: BTreeSet<String>,

    #[serde(default)]
    pub resolver: ResolverThresholds,

    /// The large keyword-ability section, scored only when an ability is detected.
    #[serde(default = "default_keyword_section")]
    pub keyword_section: u32,

    /// Ability keyword → its defining rule id (e.g. `trample` → `702.19a`).
    #[serde(default)]
    pub keyword_abilities: BTreeMap<String, String>,

    /// Token → definition rule ids.
    #[serde(default)]
    pub definitions: BTreeMap<String, Vec<String>>,

    /// Token → sections it routes to.
    #[serde(default)]
    pub section_keywords: BTreeMap<String, Vec<u32>>,

    /// Section number (as string key) → default rule ids; the first is used.
    #[serde(default)]
    pub section_defaults: BTreeMap<String, Vec<String>>,

    /// Concept phrase (normalized) → rule ids always included when present.
    #[serde(default)]
    pub concepts: BTreeMap<String, Vec<String>>,

    /// Sections used when nothing else routes.
    #[serde(default)]
    pub fallback_sections: Vec<u32>,
}

fn default_keyword_section() -> u32 {
    702
}

fn invalid(field: &str, reason: &str) -> DocumentError {
    DocumentError::InvalidField {
        field: field.into(),
        reason: reason.into(),
    }
}

impl RouterConfig {
    /// Parse and validate the JSON document.
    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| DocumentError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.version.trim().is_empty() {
            return Err(invalid("version", "must not be empty"));
        }
        if self.resolver.prefix_len == 0 {
            return Err(invalid("resolver.prefix_len", "must be >= 1"));
        }
        if self.resolver.max_ngram == 0 {
            return Err(invalid("resolver.max_ngram", "must be >= 1"));
        }
        for key in self.section_defaults.keys() {
            if key.parse::<u32>().is_err() {
                return Err(invalid(
                    "section_defaults",
                    &format!("key '{key}' is not a section number"),
                ));
            }
        }
        Ok(())
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// The single default rule declared for a section.
    pub fn section_default(&self, section: u32) -> Option<&str> {
        self.section_defaults
            .get(&section.to_string())
            .and_then(|ids| ids.first())
            .map(String::as_str)
    }

    pub fn ability_rule(&self, token: &str) -> Option<&str> {
        self.keyword_abilities.get(token).map(String::as_str)
    }
}
