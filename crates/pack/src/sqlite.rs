//! SQLite content store (read-only).
//!
//! The pack database holds three tables:
//! - `rules(rule_id PK, section, text, token_index)`
//! - `cards(id PK, name, normalized_name UNIQUE, body_text)`
//! - `name_prefix(prefix, id)`: bounded lookup into `cards`
//!
//! The connection opens once at load time in read-only mode; the engine
//! never writes to it.

use crate::fs_reader::resolve_within;
use async_trait::async_trait;
use rulebook_core::error::StoreError;
use rulebook_core::model::{Entity, Rule};
use rulebook_core::store::{ContentStore, StoreConnector};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// A read-only SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
    closed: AtomicBool,
}

impl SqliteStore {
    /// Open an existing pack database read-only.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::Open(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open SQLite: {e}")))?;

        info!("SQLite content store opened at {}", path.display());
        Ok(Self {
            pool,
            closed: AtomicBool::new(false),
        })
    }

    /// Wrap an existing pool (useful for testing).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Parse a `Rule` from a SQLite row.
    fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<Rule, StoreError> {
        let rule_id: String = row
            .try_get("rule_id")
            .map_err(|e| StoreError::QueryFailed(format!("rule_id column: {e}")))?;
        let section: i64 = row
            .try_get("section")
            .map_err(|e| StoreError::QueryFailed(format!("section column: {e}")))?;
        let text: String = row
            .try_get("text")
            .map_err(|e| StoreError::QueryFailed(format!("text column: {e}")))?;
        let token_index: Option<String> = row
            .try_get("token_index")
            .map_err(|e| StoreError::QueryFailed(format!("token_index column: {e}")))?;

        let section = u32::try_from(section)
            .map_err(|_| StoreError::QueryFailed(format!("rule {rule_id}: bad section {section}")))?;

        Ok(Rule::new(
            rule_id,
            section,
            text,
            token_index.as_deref().unwrap_or_default(),
        ))
    }

    /// Parse an `Entity` from a SQLite row.
    fn row_to_entity(row: &sqlx::sqlite::SqliteRow) -> Result<Entity, StoreError> {
        let get = |col: &str| -> Result<String, StoreError> {
            row.try_get(col)
                .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
        };
        Ok(Entity {
            id: get("id")?,
            name: get("name")?,
            normalized_name: get("normalized_name")?,
            body_text: get("body_text")?,
        })
    }

    async fn count(&self, sql: &str) -> Result<usize, StoreError> {
        self.ensure_open()?;
        let row = sqlx::query(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT: {e}")))?;
        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(cnt.max(0) as usize)
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn rules_in_section(&self, section: u32) -> Result<Vec<Rule>, StoreError> {
        self.ensure_open()?;
        let rows = sqlx::query(
            "SELECT rule_id, section, text, token_index FROM rules WHERE section = ?1 ORDER BY rule_id",
        )
        .bind(i64::from(section))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("section {section}: {e}")))?;

        debug!(section, rows = rows.len(), "Fetched section rules");
        rows.iter().map(Self::row_to_rule).collect()
    }

    async fn rules_with_prefix(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Rule>, StoreError> {
        self.ensure_open()?;
        // substr comparison sidesteps LIKE wildcard escaping for ids such as "100.1_".
        let rows = sqlx::query(
            r#"
            SELECT rule_id, section, text, token_index FROM rules
            WHERE substr(rule_id, 1, length(?1)) = ?1
            ORDER BY rule_id
            LIMIT ?2
            "#,
        )
        .bind(prefix)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("prefix {prefix}: {e}")))?;

        rows.iter().map(Self::row_to_rule).collect()
    }

    async fn rules_by_id(&self, ids: &[String]) -> Result<Vec<Rule>, StoreError> {
        self.ensure_open()?;
        let mut rules = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query(
                "SELECT rule_id, section, text, token_index FROM rules WHERE rule_id = ?1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("rule {id}: {e}")))?;

            if let Some(ref r) = row {
                rules.push(Self::row_to_rule(r)?);
            }
        }
        Ok(rules)
    }

    async fn entities_with_prefix(&self, prefix: &str) -> Result<Vec<Entity>, StoreError> {
        self.ensure_open()?;
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.normalized_name, c.body_text
            FROM name_prefix p
            JOIN cards c ON c.id = p.id
            WHERE p.prefix = ?1
            ORDER BY c.normalized_name, c.id
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("name prefix {prefix}: {e}")))?;

        rows.iter().map(Self::row_to_entity).collect()
    }

    async fn rule_count(&self) -> Result<usize, StoreError> {
        self.count("SELECT COUNT(*) AS cnt FROM rules").await
    }

    async fn entity_count(&self) -> Result<usize, StoreError> {
        self.count("SELECT COUNT(*) AS cnt FROM cards").await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.pool.close().await;
            debug!("SQLite content store closed");
        }
    }
}

/// Opens pack databases under a root directory.
pub struct SqliteConnector {
    root: PathBuf,
}

impl SqliteConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StoreConnector for SqliteConnector {
    async fn open(&self, database: &str) -> Result<Arc<dyn ContentStore>, StoreError> {
        let path = resolve_within(&self.root, database).map_err(|e| StoreError::Open(e.to_string()))?;
        let store: Arc<dyn ContentStore> = Arc::new(SqliteStore::open(&path).await?);
        Ok(store)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write a small pack database to `path`.
    pub(crate) async fn write_fixture_db(path: &Path) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        for stmt in [
            "CREATE TABLE rules (rule_id TEXT PRIMARY KEY, section INTEGER NOT NULL, text TEXT NOT NULL, token_index TEXT)",
            "CREATE TABLE cards (id TEXT PRIMARY KEY, name TEXT NOT NULL, normalized_name TEXT NOT NULL UNIQUE, body_text TEXT NOT NULL)",
            "CREATE TABLE name_prefix (prefix TEXT NOT NULL, id TEXT NOT NULL)",
        ] {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }

        for (id, section, text, tokens) in [
            ("702.19a", 702, "Trample is a static ability.", "trample static ability"),
            ("702.19b", 702, "Assign lethal damage, rest to player.", "trample assign lethal damage player"),
            ("702.2b", 702, "Any damage from deathtouch is lethal.", "deathtouch damage lethal"),
            ("510.1", 510, "Combat damage step.", "combat damage step"),
        ] {
            sqlx::query("INSERT INTO rules VALUES (?1, ?2, ?3, ?4)")
                .bind(id)
                .bind(section as i64)
                .bind(text)
                .bind(tokens)
                .execute(&pool)
                .await
                .unwrap();
        }

        sqlx::query("INSERT INTO cards VALUES ('c1', 'Lightning Bolt', 'lightning bolt', 'Lightning Bolt deals 3 damage to any target.')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO name_prefix VALUES ('lig', 'c1')")
            .execute(&pool)
            .await
            .unwrap();

        pool.close().await;
    }

    async fn open_fixture() -> (tempfile::TempDir, Arc<dyn ContentStore>) {
        let dir = tempfile::tempdir().unwrap();
        write_fixture_db(&dir.path().join("content.sqlite")).await;
        let store = SqliteConnector::new(dir.path())
            .open("content.sqlite")
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn section_query_orders_by_rule_id() {
        let (_dir, store) = open_fixture().await;
        let rules = store.rules_in_section(702).await.unwrap();
        let ids: Vec<_> = rules.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["702.19a", "702.19b", "702.2b"]);
        assert!(rules[1].tokens.contains("lethal"));
    }

    #[tokio::test]
    async fn prefix_and_id_lookups() {
        let (_dir, store) = open_fixture().await;
        let rules = store.rules_with_prefix("702.19", 10).await.unwrap();
        assert_eq!(rules.len(), 2);

        let rules = store
            .rules_by_id(&["510.1".into(), "999.9".into()])
            .await
            .unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].section, 510);
    }

    #[tokio::test]
    async fn name_prefix_join() {
        let (_dir, store) = open_fixture().await;
        let found = store.entities_with_prefix("lig").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Lightning Bolt");
        assert_eq!(store.entity_count().await.unwrap(), 1);
        assert_eq!(store.rule_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn store_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.sqlite");
        write_fixture_db(&path).await;
        let store = SqliteStore::open(&path).await.unwrap();
        let result = sqlx::query("DELETE FROM rules").execute(&store.pool).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_database_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let result = SqliteConnector::new(dir.path()).open("content.sqlite").await;
        assert!(matches!(result, Err(StoreError::Open(_))));
    }

    #[tokio::test]
    async fn close_rejects_later_queries() {
        let (_dir, store) = open_fixture().await;
        store.close().await;
        assert!(matches!(
            store.rules_in_section(702).await,
            Err(StoreError::Closed)
        ));
    }
}
