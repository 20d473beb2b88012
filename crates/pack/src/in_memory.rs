//! In-memory store and reader, for tests and for hosts that
//! already hold the pack in memory.

use async_trait::async_trait;
use rulebook_core::error::{ReadError, StoreError};
use rulebook_core::model::{Entity, Rule};
use rulebook_core::reader::PackReader;
use rulebook_core::store::{ContentStore, StoreConnector};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A store that keeps rules and entities in ordered maps.
pub struct InMemoryStore {
    rules: BTreeMap<String, Rule>,
    entities: BTreeMap<String, Entity>,
    name_prefix: BTreeMap<String, Vec<String>>,
    prefix_len: usize,
    queries: AtomicUsize,
    closed: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store whose `name_prefix` keys are `prefix_len` chars.
    pub fn new(prefix_len: usize) -> Self {
        Self {
            rules: BTreeMap::new(),
            entities: BTreeMap::new(),
            name_prefix: BTreeMap::new(),
            prefix_len,
            queries: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.insert(rule.rule_id.clone(), rule);
        self
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        let prefix: String = entity.normalized_name.chars().take(self.prefix_len).collect();
        self.name_prefix
            .entry(prefix)
            .or_default()
            .push(entity.id.clone());
        self.entities.insert(entity.id.clone(), entity);
        self
    }

    /// Number of queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn rules_in_section(&self, section: u32) -> Result<Vec<Rule>, StoreError> {
        self.begin()?;
        Ok(self
            .rules
            .values()
            .filter(|r| r.section == section)
            .cloned()
            .collect())
    }

    async fn rules_with_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Rule>, StoreError> {
        self.begin()?;
        Ok(self
            .rules
            .range(prefix.to_string()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn rules_by_id(&self, ids: &[String]) -> Result<Vec<Rule>, StoreError> {
        self.begin()?;
        Ok(ids.iter().filter_map(|id| self.rules.get(id).cloned()).collect())
    }

    async fn entities_with_prefix(&self, prefix: &str) -> Result<Vec<Entity>, StoreError> {
        self.begin()?;
        let mut found: Vec<Entity> = self
            .name_prefix
            .get(prefix)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.entities.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by(|a, b| {
            a.normalized_name
                .cmp(&b.normalized_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(found)
    }

    async fn rule_count(&self) -> Result<usize, StoreError> {
        self.begin()?;
        Ok(self.rules.len())
    }

    async fn entity_count(&self) -> Result<usize, StoreError> {
        self.begin()?;
        Ok(self.entities.len())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector that hands out one shared in-memory store.
pub struct InMemoryConnector {
    store: Arc<InMemoryStore>,
}

impl InMemoryConnector {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    async fn open(&self, _database: &str) -> Result<Arc<dyn ContentStore>, StoreError> {
        let store: Arc<dyn ContentStore> = self.store.clone();
        Ok(store)
    }
}

/// A pack reader over an in-memory file map. Records every path read.
pub struct MemoryReader {
    root: String,
    files: BTreeMap<String, Vec<u8>>,
    reads: Mutex<Vec<String>>,
}

impl MemoryReader {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            files: BTreeMap::new(),
            reads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.to_string(), contents.into());
        self
    }

    /// Paths read so far, in order.
    pub fn reads(&self) -> Vec<String> {
        self.reads
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn fetch(&self, path: &str) -> Result<Vec<u8>, ReadError> {
        if let Ok(mut reads) = self.reads.lock() {
            reads.push(path.to_string());
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| ReadError::NotFound { path: path.into() })
    }
}

#[async_trait]
impl PackReader for MemoryReader {
    fn root(&self) -> &str {
        &self.root
    }

    async fn read_text(&self, path: &str) -> Result<String, ReadError> {
        let bytes = self.fetch(path)?;
        String::from_utf8(bytes).map_err(|e| ReadError::Io {
            path: path.into(),
            reason: e.to_string(),
        })
    }

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, ReadError> {
        self.fetch(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryStore {
        InMemoryStore::new(3)
            .with_rule(Rule::new("702.19b", 702, "b", "trample"))
            .with_rule(Rule::new("702.19a", 702, "a", "trample"))
            .with_rule(Rule::new("702.2a", 702, "c", "deathtouch"))
            .with_rule(Rule::new("510.1", 510, "d", "combat damage"))
            .with_entity(Entity {
                id: "c1".into(),
                name: "Lightning Bolt".into(),
                normalized_name: "lightning bolt".into(),
                body_text: "Lightning Bolt deals 3 damage to any target.".into(),
            })
            .with_entity(Entity {
                id: "c2".into(),
                name: "Lightning Helix".into(),
                normalized_name: "lightning helix".into(),
                body_text: "Deals 3 damage and you gain 3 life.".into(),
            })
    }

    #[tokio::test]
    async fn section_rules_ordered_by_id() {
        let s = store();
        let rules = s.rules_in_section(702).await.unwrap();
        let ids: Vec<_> = rules.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["702.19a", "702.19b", "702.2a"]);
    }

    #[tokio::test]
    async fn prefix_lookup_respects_limit() {
        let s = store();
        let rules = s.rules_with_prefix("702.19", 10).await.unwrap();
        assert_eq!(rules.len(), 2);
        let rules = s.rules_with_prefix("702", 1).await.unwrap();
        assert_eq!(rules[0].rule_id, "702.19a");
    }

    #[tokio::test]
    async fn rules_by_id_keeps_request_order() {
        let s = store();
        let ids = vec!["510.1".to_string(), "missing".to_string(), "702.19a".to_string()];
        let rules = s.rules_by_id(&ids).await.unwrap();
        let got: Vec<_> = rules.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(got, vec!["510.1", "702.19a"]);
    }

    #[tokio::test]
    async fn entity_prefix_index() {
        let s = store();
        let found = s.entities_with_prefix("lig").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].normalized_name, "lightning bolt");
        assert!(s.entities_with_prefix("zzz").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_store_rejects_queries() {
        let s = store();
        s.close().await;
        assert!(matches!(s.rule_count().await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn reader_records_reads_and_reports_missing() {
        let reader = MemoryReader::new("mem://pack").with_file("manifest.json", "{}");
        assert_eq!(reader.read_text("manifest.json").await.unwrap(), "{}");
        assert!(matches!(
            reader.read_text("nope.json").await,
            Err(ReadError::NotFound { .. })
        ));
        assert_eq!(reader.read_text_optional("nope.json").await.unwrap(), None);
        assert_eq!(reader.reads(), vec!["manifest.json", "nope.json", "nope.json"]);
    }
}
