//! Database - the shared store handle
//!
//! SQLite allows a single writer at a time. Every write (and every
//! transaction) takes the writer lock first, so concurrent writers queue in
//! the process instead of failing with `SQLITE_BUSY`. Reads go straight to the
//! pool and proceed in parallel.
//!
//! Cancellation follows the usual async contract: dropping a future aborts
//! the in-flight statement, and a dropped [`crate::Tx`] is rolled back.

use crate::config::StoreConfig;
use crate::migrate::{MigrationReport, MigrationSource, Migrator};
use fabula_core::{Error, Result};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteQueryResult, SqliteRow,
};
use sqlx::{Row, Sqlite};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// A prepared query with its bound arguments
pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Tables created by the bundled migrations
pub const SCHEMA_TABLES: &[&str] = &[
    "tenants",
    "worlds",
    "archetypes",
    "traits",
    "archetype_traits",
    "characters",
    "character_traits",
    "character_relationships",
    "locations",
    "factions",
    "lores",
    "artifacts",
    "events",
    "faction_references",
    "lore_references",
    "artifact_references",
    "event_references",
    "event_characters",
    "event_artifacts",
    "event_locations",
    "stories",
    "chapters",
    "scenes",
    "beats",
    "content_blocks",
    "scene_references",
    "content_anchors",
    "content_block_references",
    "entity_relations",
];

/// Presence and size of one schema table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStat {
    /// Table name
    pub name: &'static str,
    /// Row count, `None` when the table is missing
    pub rows: Option<i64>,
}

/// Shared handle to the embedded database
///
/// Cloning is cheap; all clones share one pool and one writer lock.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    pub(crate) writer: Arc<Mutex<()>>,
}

impl Database {
    /// Wrap an existing pool (migrations are not run)
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Open the configured store and apply migrations
    ///
    /// Migrations come from `config.migrations_dir` when set, otherwise from
    /// the set embedded in this crate.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let db = Self::open(config).await?;
        let source = match &config.migrations_dir {
            Some(dir) => MigrationSource::Directory(dir.clone()),
            None => MigrationSource::Embedded,
        };
        db.migrate(source).await?;
        Ok(db)
    }

    /// Open the configured store without touching the schema
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        if config.is_in_memory() {
            return Self::open_in_memory().await;
        }

        let path = Path::new(&config.path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::internal(format!("failed to create directory: {e}")))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(Error::internal)?;

        info!("SQLite store opened at {}", path.display());
        Ok(Self::new(pool))
    }

    /// Open a file-backed store with default settings and apply migrations
    pub async fn from_path(db_path: &Path) -> Result<Self> {
        Self::connect(&StoreConfig::file(db_path.display().to_string())).await
    }

    /// Create a migrated in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        let db = Self::open_in_memory().await?;
        db.migrate(MigrationSource::Embedded).await?;
        debug!("In-memory SQLite store initialized");
        Ok(db)
    }

    async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(Error::internal)?
            .foreign_keys(true);

        // Every connection to `:memory:` is a separate database, so the pool
        // must hold exactly one connection and never recycle it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(Error::internal)?;

        Ok(Self::new(pool))
    }

    /// Apply migrations from `source`
    pub async fn migrate(&self, source: MigrationSource) -> Result<MigrationReport> {
        Migrator::new(source).run(self).await
    }

    /// Get a reference to the underlying connection pool
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run a write statement under the writer lock
    #[instrument(level = "trace", skip_all)]
    pub async fn execute<'q>(&self, query: SqliteQuery<'q>) -> sqlx::Result<SqliteQueryResult> {
        let _writer = self.writer.lock().await;
        query.execute(&self.pool).await
    }

    /// Run a read query and collect every row
    pub async fn fetch_all<'q>(&self, query: SqliteQuery<'q>) -> sqlx::Result<Vec<SqliteRow>> {
        query.fetch_all(&self.pool).await
    }

    /// Run a read query expecting at most one row
    pub async fn fetch_optional<'q>(
        &self,
        query: SqliteQuery<'q>,
    ) -> sqlx::Result<Option<SqliteRow>> {
        query.fetch_optional(&self.pool).await
    }

    /// Run a read query expecting exactly one row (`RowNotFound` otherwise)
    pub async fn fetch_one<'q>(&self, query: SqliteQuery<'q>) -> sqlx::Result<SqliteRow> {
        query.fetch_one(&self.pool).await
    }

    /// Row count of every table in [`SCHEMA_TABLES`]
    pub async fn table_stats(&self) -> Result<Vec<TableStat>> {
        let rows = self
            .fetch_all(sqlx::query(
                "SELECT name FROM sqlite_master WHERE type = 'table'",
            ))
            .await
            .map_err(Error::internal)?;
        let present = rows
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<std::result::Result<HashSet<_>, _>>()
            .map_err(Error::internal)?;

        let mut stats = Vec::with_capacity(SCHEMA_TABLES.len());
        for &name in SCHEMA_TABLES {
            let rows = if present.contains(name) {
                let sql = format!("SELECT COUNT(*) FROM {name}");
                let row = self
                    .fetch_one(sqlx::query(&sql))
                    .await
                    .map_err(Error::internal)?;
                Some(row.try_get::<i64, _>(0).map_err(Error::internal)?)
            } else {
                None
            };
            stats.push(TableStat { name, rows });
        }
        Ok(stats)
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_is_migrated() {
        let db = Database::in_memory().await.unwrap();
        let row = db
            .fetch_one(sqlx::query(
                "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = 'tenants'",
            ))
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 1);
    }

    #[tokio::test]
    async fn test_table_stats_cover_schema() {
        let db = Database::in_memory().await.unwrap();
        let stats = db.table_stats().await.unwrap();
        assert_eq!(stats.len(), SCHEMA_TABLES.len());
        assert!(stats.iter().all(|s| s.rows == Some(0)));

        db.execute(sqlx::query("DROP TABLE entity_relations"))
            .await
            .unwrap();
        let stats = db.table_stats().await.unwrap();
        let relations = stats.iter().find(|s| s.name == "entity_relations").unwrap();
        assert_eq!(relations.rows, None);
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::in_memory().await.unwrap();
        let row = db
            .fetch_one(sqlx::query("PRAGMA foreign_keys"))
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>(0), 1);
    }

    #[tokio::test]
    async fn test_from_path_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fabula.db");
        let db = Database::from_path(&path).await.unwrap();
        assert!(path.exists());

        let result = db
            .execute(
                sqlx::query("INSERT INTO tenants (id, name, status, created_at, updated_at) VALUES (?1, ?2, 'active', ?3, ?3)")
                    .bind(uuid::Uuid::new_v4().to_string())
                    .bind("acme")
                    .bind("2024-01-01T00:00:00Z"),
            )
            .await
            .unwrap();
        assert_eq!(result.rows_affected(), 1);
        db.close().await;
    }
}
