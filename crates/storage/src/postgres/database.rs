//! PostgreSQL database connection and configuration.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, instrument};

use chronicle_core::error::{StorageError, StorageResult};

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection acquisition timeout.
    pub acquire_timeout: Duration,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum connection lifetime.
    pub max_lifetime: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/chronicle".to_string(),
            max_connections: 20,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DatabaseConfig {
    /// Create a configuration optimized for the indexer.
    pub fn for_indexer(url: &str) -> Self {
        Self {
            url: url.to_string(),
            max_connections: 10,
            min_connections: 3,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database with the given configuration.
    #[instrument(skip_all)]
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        debug!(
            max_conn = config.max_connections,
            min_conn = config.min_connections,
            "Creating connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        debug!("Connection pool created");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> StorageResult<()> {
        debug!("Running migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationError(e.to_string()))?;

        debug!("Migrations completed");

        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Purge all indexed data from the database.
    ///
    /// Truncates every data table, cursor included, and keeps the schema and
    /// the migration history. Indexing restarts from the configured start
    /// block afterwards.
    #[instrument(skip(self))]
    pub async fn purge(&self) -> StorageResult<PurgeStats> {
        debug!("Starting database purge");

        let blocks_removed = self.count("blocks").await?;
        let extrinsics_removed = self.count("extrinsics").await?;
        let events_removed = self.count("events").await?;
        let accounts_removed = self.count("accounts").await?;

        sqlx::query(&format!("TRUNCATE {} CASCADE", DATA_TABLES.join(", ")))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        debug!(tables = DATA_TABLES.len(), "Database purge completed");

        Ok(PurgeStats {
            blocks_removed,
            extrinsics_removed,
            events_removed,
            accounts_removed,
        })
    }

    async fn count(&self, table: &str) -> StorageResult<u64> {
        let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;
        Ok(row.0 as u64)
    }
}

/// Every table holding indexed data.
const DATA_TABLES: &[&str] = &[
    "blocks",
    "extrinsics",
    "events",
    "block_totals",
    "logs",
    "audits",
    "contracts",
    "contract_instances",
    "sessions",
    "session_validators",
    "session_nominators",
    "session_totals",
    "search_index",
    "account_info_snapshots",
    "accounts",
    "account_indices",
    "identity_judgements",
    "indexer_cursor",
];

/// Statistics from a database purge operation.
#[derive(Debug, Clone)]
pub struct PurgeStats {
    /// Number of blocks removed.
    pub blocks_removed: u64,
    /// Number of extrinsics removed.
    pub extrinsics_removed: u64,
    /// Number of events removed.
    pub events_removed: u64,
    /// Number of accounts removed.
    pub accounts_removed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexer_config_uses_url() {
        let config = DatabaseConfig::for_indexer("postgres://db/chain");
        assert_eq!(config.url, "postgres://db/chain");
        assert!(config.max_connections >= config.min_connections);
    }

    // Test critique: la purge doit couvrir toutes les tables du schéma
    #[test]
    fn test_purge_covers_every_schema_table() {
        let schema = include_str!("../../migrations/0001_initial.sql");
        let created = schema
            .lines()
            .filter_map(|l| l.strip_prefix("CREATE TABLE "))
            .filter_map(|l| l.split_whitespace().next())
            .collect::<Vec<_>>();

        assert_eq!(created.len(), DATA_TABLES.len());
        for table in created {
            assert!(DATA_TABLES.contains(&table), "{table} not purged");
        }
    }
}
