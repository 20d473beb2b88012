//! Optional provider spec (`provider_spec.json`) shipped with a pack.
//!
//! Carries model-facing settings that travel with the data rather than the
//! app: entity extraction patterns, a system instruction, the chat template,
//! and the model's context window.

use crate::{ChatTemplate, DocumentError};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Regexes applied to the normalized query; capture group 1 is a
    /// candidate entity name.
    #[serde(default)]
    pub entity_patterns: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_template: Option<ChatTemplate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window_tokens: Option<usize>,
}

impl ProviderSpec {
    /// Parse the JSON document and check every pattern compiles with a capture group.
    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        let spec: Self =
            serde_json::from_str(text).map_err(|e| DocumentError::Parse(e.to_string()))?;
        spec.compile_patterns()?;
        Ok(spec)
    }

    /// Compile the extraction patterns in declaration order.
    pub fn compile_patterns(&self) -> Result<Vec<Regex>, DocumentError> {
        self.entity_patterns
            .iter()
            .map(|p| {
                let re = Regex::new(p).map_err(|e| DocumentError::Pattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })?;
                if re.captures_len() < 2 {
                    return Err(DocumentError::Pattern {
                        pattern: p.clone(),
                        reason: "no capture group".into(),
                    });
                }
                Ok(re)
            })
            .collect()
    }
}
