//! Prompt rendering and the preflight trim loop.

use crate::context::token;
use rulebook_config::ChatTemplate;
use rulebook_core::bundle::{AskWarning, BundleItem, ContextBundle};
use tracing::{debug, warn};

/// A rendered prompt plus what the preflight loop had to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub prompt: String,
    /// Length of `prompt` in chars.
    pub char_len: usize,
    pub warning: Option<AskWarning>,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: ChatTemplate,
    system_instruction: String,
    char_cap: usize,
    chars_per_token: usize,
}

impl PromptBuilder {
    pub fn new(
        template: ChatTemplate,
        system_instruction: impl Into<String>,
        char_cap: usize,
        chars_per_token: usize,
    ) -> Self {
        Self {
            template,
            system_instruction: system_instruction.into(),
            char_cap,
            chars_per_token,
        }
    }

    /// The user turn: labeled excerpt sections and the literal question.
    pub fn render_user(question: &str, bundle: &ContextBundle) -> String {
        let mut out = String::from("RULES:\n");
        if bundle.rules.is_empty() {
            out.push_str("(none)\n");
        }
        for rule in &bundle.rules {
            out.push_str(&format!("[{}] {}\n", rule.rule_id, rule.text));
        }

        out.push_str("\nENTITIES:\n");
        if bundle.entities.is_empty() {
            out.push_str("(none)\n");
        }
        for entity in &bundle.entities {
            out.push_str(&format!("[card:{}] {}: {}\n", entity.id, entity.name, entity.text));
        }

        out.push_str("\nQUESTION: ");
        out.push_str(question);
        out
    }

    /// Wrap system and user content in the chat template.
    pub fn render(&self, question: &str, bundle: &ContextBundle) -> String {
        let user = Self::render_user(question, bundle);
        let system = &self.system_instruction;
        match self.template {
            ChatTemplate::ChatMl => format!(
                "<|im_start|>system\n{system}<|im_end|>\n<|im_start|>user\n{user}<|im_end|>\n<|im_start|>assistant\n"
            ),
            ChatTemplate::Llama3 => format!(
                "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\n{system}<|eot_id|><|start_header_id|>user<|end_header_id|>\n\n{user}<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n"
            ),
            // no system role; the instruction leads the user turn
            ChatTemplate::Gemma => format!(
                "<start_of_turn>user\n{system}\n\n{user}<end_of_turn>\n<start_of_turn>model\n"
            ),
            ChatTemplate::Phi3 => {
                format!("<|system|>\n{system}<|end|>\n<|user|>\n{user}<|end|>\n<|assistant|>\n")
            }
        }
    }

    /// Render, dropping the last-appended bundle item until the prompt fits.
    ///
    /// Trimmed item ids are recorded in the bundle's routing trace. If the
    /// bundle empties and the prompt still exceeds the cap, the bare prompt
    /// is returned with a [`AskWarning::PromptOverflow`].
    pub fn build(&self, question: &str, bundle: &mut ContextBundle) -> BuiltPrompt {
        loop {
            let prompt = self.render(question, bundle);
            let char_len = prompt.chars().count();
            if char_len <= self.char_cap {
                return BuiltPrompt {
                    prompt,
                    char_len,
                    warning: None,
                };
            }

            let Some(item) = bundle.pop_last() else {
                warn!(prompt_chars = char_len, cap = self.char_cap, "Prompt exceeds cap with empty bundle");
                return BuiltPrompt {
                    prompt,
                    char_len,
                    warning: Some(AskWarning::PromptOverflow {
                        prompt_chars: char_len,
                        cap: self.char_cap,
                    }),
                };
            };

            let text = match &item {
                BundleItem::Entity(e) => &e.text,
                BundleItem::Rule(r) => &r.text,
            };
            bundle.estimated_tokens = bundle
                .estimated_tokens
                .saturating_sub(token::estimate_tokens(text, self.chars_per_token));
            debug!(item = %item.citation(), prompt_chars = char_len, "Trimmed bundle item for prompt cap");
            bundle.routing_trace.trimmed_for_prompt.push(item.citation());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulebook_core::bundle::{BundleEntity, BundleRule, RuleCategory};

    fn bundle() -> ContextBundle {
        ContextBundle {
            entities: vec![BundleEntity {
                id: "c1".into(),
                name: "Lightning Bolt".into(),
                text: "Lightning Bolt deals 3 damage to any target.".into(),
            }],
            rules: vec![
                BundleRule {
                    rule_id: "120.1".into(),
                    section: 120,
                    text: "Objects can deal damage.".into(),
                    category: RuleCategory::Definition,
                    score: None,
                },
                BundleRule {
                    rule_id: "510.1".into(),
                    section: 510,
                    text: "Creatures assign combat damage equal to their power.".into(),
                    category: RuleCategory::Mechanism,
                    score: Some(2),
                },
            ],
            estimated_tokens: 31,
            budget: 700,
            ..Default::default()
        }
    }

    fn builder(cap: usize) -> PromptBuilder {
        PromptBuilder::new(ChatTemplate::ChatMl, "Answer from the excerpts.", cap, 4)
    }

    #[test]
    fn renders_citations_in_both_sections() {
        let prompt = builder(10_000).render("What does Lightning Bolt do?", &bundle());
        assert!(prompt.starts_with("<|im_start|>system\nAnswer from the excerpts."));
        assert!(prompt.contains("RULES:\n[120.1] Objects can deal damage.\n[510.1]"));
        assert!(prompt.contains("ENTITIES:\n[card:c1] Lightning Bolt: Lightning Bolt deals"));
        assert!(prompt.contains("QUESTION: What does Lightning Bolt do?"));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn every_template_wraps_question() {
        for template in [
            ChatTemplate::ChatMl,
            ChatTemplate::Llama3,
            ChatTemplate::Gemma,
            ChatTemplate::Phi3,
        ] {
            let builder = PromptBuilder::new(template, "sys", 10_000, 4);
            let prompt = builder.render("why?", &ContextBundle::default());
            assert!(prompt.contains("QUESTION: why?"), "{template:?}");
            assert!(prompt.contains("sys"), "{template:?}");
            assert!(prompt.contains("(none)"), "{template:?}");
        }
    }

    #[test]
    fn fits_without_trimming() {
        let mut b = bundle();
        let built = builder(10_000).build("q", &mut b);
        assert!(built.warning.is_none());
        assert_eq!(built.char_len, built.prompt.chars().count());
        assert_eq!(b.item_count(), 3);
    }

    #[test]
    fn trims_last_appended_until_under_cap() {
        let full = builder(10_000).render("q", &bundle()).chars().count();
        let mut b = bundle();
        // just short of the full render: dropping the last rule is enough
        let built = builder(full - 1).build("q", &mut b);
        assert!(built.warning.is_none());
        assert!(built.char_len < full);
        assert_eq!(b.routing_trace.trimmed_for_prompt, vec!["510.1"]);
        assert_eq!(b.rules.len(), 1);
        assert_eq!(b.entities.len(), 1);
        assert!(b.estimated_tokens < 31);
    }

    #[test]
    fn overflow_with_empty_bundle_is_a_warning() {
        let mut b = bundle();
        let built = builder(20).build("What does Lightning Bolt do?", &mut b);
        assert!(b.is_empty());
        assert_eq!(b.routing_trace.trimmed_for_prompt, vec!["510.1", "120.1", "card:c1"]);
        assert_eq!(
            built.warning,
            Some(AskWarning::PromptOverflow {
                prompt_chars: built.char_len,
                cap: 20,
            })
        );
        assert!(built.prompt.contains("QUESTION: What does Lightning Bolt do?"));
    }
}
