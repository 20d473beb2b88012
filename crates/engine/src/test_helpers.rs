//! Shared fixtures for engine tests: a small rules corpus, two cards,
//! and a router configuration that exercises every routing path.

use rulebook_config::RouterConfig;
use rulebook_core::model::{Entity, Rule};
use rulebook_pack::{InMemoryConnector, InMemoryStore, MemoryReader};
use serde_json::json;
use std::sync::Arc;

pub const RULES: &[(&str, u32, &str, &str)] = &[
    ("100.1", 100, "These rules apply to any game.", "rules apply game"),
    ("106.1", 106, "Mana is the primary resource in the game.", "mana primary resource game"),
    (
        "115.1",
        115,
        "Some spells and abilities require their controller to choose targets for them.",
        "spells abilities require controller choose targets target",
    ),
    (
        "120.1",
        120,
        "Objects can deal damage to creatures, planeswalkers, battles, and players.",
        "objects deal damage creatures planeswalkers battles players",
    ),
    (
        "120.3",
        120,
        "Damage dealt to a player causes that player to lose that much life.",
        "damage dealt player causes lose life",
    ),
    (
        "510.1",
        510,
        "Each attacking and blocking creature assigns combat damage equal to its power.",
        "attacking creature blocking assigns combat damage equal power",
    ),
    (
        "510.1c",
        510,
        "A blocked creature assigns its combat damage to the creatures blocking it.",
        "blocked creature assigns combat damage creatures blocking",
    ),
    ("510.2", 510, "All combat damage is dealt simultaneously.", "combat damage dealt simultaneously"),
    (
        "608.2",
        608,
        "If the spell or ability specifies targets, it checks whether they are still legal.",
        "spell ability specifies targets checks legal",
    ),
    ("702.1", 702, "This section contains keyword abilities.", "section contains keyword abilities"),
    (
        "702.2b",
        702,
        "A creature dealt damage by a source with deathtouch is destroyed.",
        "creature dealt damage source deathtouch destroyed",
    ),
    (
        "702.2c",
        702,
        "A creature with deathtouch and trample needs to assign only one damage to each blocker.",
        "creature deathtouch trample assign one damage blocker lethal",
    ),
    (
        "702.19b",
        702,
        "An attacking creature with trample assigns excess damage to the player.",
        "attacking creature trample assigns excess damage player",
    ),
    (
        "702.19c",
        702,
        "Assigning lethal damage to blockers is required before trample damage.",
        "assigning lethal damage blockers required trample",
    ),
];

pub fn lightning_bolt() -> Entity {
    Entity {
        id: "c1".into(),
        name: "Lightning Bolt".into(),
        normalized_name: "lightning bolt".into(),
        body_text: "Lightning Bolt deals 3 damage to any target.".into(),
    }
}

pub fn llanowar_elves() -> Entity {
    Entity {
        id: "c2".into(),
        name: "Llanowar Elves".into(),
        normalized_name: "llanowar elves".into(),
        body_text: "T: Add G.".into(),
    }
}

pub fn store() -> InMemoryStore {
    let mut store = InMemoryStore::new(3)
        .with_entity(lightning_bolt())
        .with_entity(llanowar_elves());
    for (id, section, text, tokens) in RULES {
        store = store.with_rule(Rule::new(*id, *section, *text, tokens));
    }
    store
}

pub fn router_json() -> serde_json::Value {
    json!({
        "version": "2024.06",
        "stopwords": ["what", "does", "the", "how", "with", "and", "any", "can", "when", "which", "this", "that", "work", "explain", "rule", "much"],
        "resolver": {"min_token_len": 3, "min_name_len": 3, "prefix_len": 3, "max_ngram": 4},
        "keyword_section": 702,
        "keyword_abilities": {"trample": "702.19b", "deathtouch": "702.2b"},
        "definitions": {"damage": ["120.1"], "mana": ["106.1"]},
        "section_keywords": {
            "damage": [120, 510],
            "combat": [510],
            "target": [115, 608],
            "targets": [115, 608],
            "keyword": [702],
            "abilities": [702]
        },
        "section_defaults": {
            "115": ["115.1"],
            "120": ["120.1"],
            "510": ["510.1"],
            "608": ["608.2"],
            "702": ["702.1"]
        },
        "concepts": {"combat damage": ["510.1"]},
        "fallback_sections": [100]
    })
}

pub fn router() -> RouterConfig {
    RouterConfig::from_json(&router_json().to_string()).unwrap()
}

pub fn manifest_json() -> serde_json::Value {
    json!({
        "pack_schema_version": 1,
        "retrieval_format_version": 1,
        "database": "content.sqlite",
        "capabilities": {
            "validate": {
                "schema_version": 1,
                "files": {
                    "canonical_names": "validate/canonical_names.json",
                    "rule_ids": "validate/rule_ids.json"
                }
            }
        },
        "indices": {
            "rules": {"root": "rules", "count": RULES.len()},
            "cards": {"root": "cards", "count": 2}
        }
    })
}

fn index_meta(dim: usize) -> String {
    json!({"embedding_model_id": "minilm-l6", "dim": dim, "metric": "l2", "normalize": false})
        .to_string()
}

fn f16_blob(rows: &[[f32; 2]]) -> Vec<u8> {
    rows.iter()
        .flatten()
        .flat_map(|v| half::f16::from_f32(*v).to_le_bytes())
        .collect()
}

/// A complete pack in memory, including legacy vector files (dim 2).
pub fn reader() -> MemoryReader {
    MemoryReader::new("mem://fixture")
        .with_file("manifest.json", manifest_json().to_string())
        .with_file("rules/index_meta.json", index_meta(2))
        .with_file("cards/index_meta.json", index_meta(2))
        .with_file("router/router_config.json", router_json().to_string())
        .with_file(
            "rules/vectors.f16",
            f16_blob(&[[1.0, 0.0], [0.0, 1.0], [0.7, 0.7]]),
        )
        .with_file("rules/rowmap.json", r#"["702.19b", "510.1", "702.2c"]"#)
        .with_file(
            "rules/chunks.jsonl",
            [
                r#"{"id": "702.19b", "text": "An attacking creature with trample assigns excess damage to the player."}"#,
                r#"{"id": "510.1", "text": "Each attacking and blocking creature assigns combat damage equal to its power."}"#,
                r#"{"id": "702.2c", "text": "A creature with deathtouch and trample needs to assign only one damage to each blocker."}"#,
            ]
            .join("\n"),
        )
        .with_file("cards/vectors.f16", f16_blob(&[[1.0, 0.1], [-1.0, 0.0]]))
        .with_file("cards/rowmap.json", r#"["c1", "c2"]"#)
        .with_file(
            "cards/chunks.jsonl",
            [
                r#"{"id": "c1", "name": "Lightning Bolt", "text": "Lightning Bolt deals 3 damage to any target."}"#,
                r#"{"id": "c2", "name": "Llanowar Elves", "text": "T: Add G."}"#,
            ]
            .join("\n"),
        )
}

pub fn connector() -> InMemoryConnector {
    InMemoryConnector::new(Arc::new(store()))
}
