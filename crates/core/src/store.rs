//! Storage port: read-only, parameterized access to the pack tables.
//!
//! The engine depends only on these traits, never on a concrete driver.
//! Implementations: SQLite (sqlx), in-memory (for testing).

use crate::error::StoreError;
use crate::model::{Entity, Rule};
use async_trait::async_trait;
use std::sync::Arc;

/// Read-only queries over `rules`, `cards`, and `name_prefix`.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// All rules of one section, ordered by rule id.
    async fn rules_in_section(&self, section: u32) -> Result<Vec<Rule>, StoreError>;

    /// Rules whose id starts with `prefix`, ordered by rule id, at most `limit`.
    async fn rules_with_prefix(&self, prefix: &str, limit: usize)
    -> Result<Vec<Rule>, StoreError>;

    /// Rules with the given ids, in the order requested. Unknown ids are skipped.
    async fn rules_by_id(&self, ids: &[String]) -> Result<Vec<Rule>, StoreError>;

    /// Entities registered under a name prefix in `name_prefix`.
    async fn entities_with_prefix(&self, prefix: &str) -> Result<Vec<Entity>, StoreError>;

    /// Total rule count.
    async fn rule_count(&self) -> Result<usize, StoreError>;

    /// Total entity count.
    async fn entity_count(&self) -> Result<usize, StoreError>;

    /// Release underlying handles. Later queries fail with [`StoreError::Closed`].
    async fn close(&self);
}

/// Opens a store for a database path relative to the pack root.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn open(&self, database: &str) -> Result<Arc<dyn ContentStore>, StoreError>;
}
