//! PostgreSQL storage adapter.
//!
//! This module implements the repository traits defined in `chronicle-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool, migrations and purge
//! - [`PgRepositories`] - Composite repository implementing `Repositories`
//! - [`PgStateTransaction`] - One transaction per block
//! - Read-side repos: `PgBlockRepository`, `PgAccountRepository`, ...
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_indexer(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = PgRepositories::new(Arc::new(db));
//! ```

mod account_repo;
mod block_repo;
mod cursor_repo;
mod database;
mod helpers;
mod rows;
mod search_repo;
mod transaction;

pub use account_repo::PgAccountRepository;
pub use block_repo::PgBlockRepository;
pub use cursor_repo::PgCursorRepository;
pub use database::{Database, DatabaseConfig, PurgeStats};
pub use search_repo::PgSearchIndexRepository;
pub use transaction::PgStateTransaction;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use chronicle_core::error::StorageResult;
use chronicle_core::ports::{
    AccountRepository, BlockRepository, CursorRepository, Repositories, SearchIndexRepository,
    StateTransaction,
};

// =============================================================================
// Composite Repository
// =============================================================================

/// Aggregated PostgreSQL repositories implementing the `Repositories` trait.
///
/// Reads go straight to the pool; block work goes through
/// [`PgStateTransaction`], one at a time.
pub struct PgRepositories {
    db: Arc<Database>,
    writer: Arc<Mutex<()>>,
    blocks: PgBlockRepository,
    accounts: PgAccountRepository,
    search: PgSearchIndexRepository,
    cursor: PgCursorRepository,
}

impl PgRepositories {
    /// Create a new repository aggregate from a database connection.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            blocks: PgBlockRepository::new(&db),
            accounts: PgAccountRepository::new(&db),
            search: PgSearchIndexRepository::new(&db),
            cursor: PgCursorRepository::new(&db),
            writer: Arc::new(Mutex::new(())),
            db,
        }
    }
}

#[async_trait]
impl Repositories for PgRepositories {
    fn blocks(&self) -> &dyn BlockRepository {
        &self.blocks
    }

    fn accounts(&self) -> &dyn AccountRepository {
        &self.accounts
    }

    fn search(&self) -> &dyn SearchIndexRepository {
        &self.search
    }

    fn cursor(&self) -> &dyn CursorRepository {
        &self.cursor
    }

    async fn begin(&self) -> StorageResult<Box<dyn StateTransaction>> {
        let tx = PgStateTransaction::begin(&self.db, self.writer.clone()).await?;
        Ok(Box::new(tx))
    }
}
