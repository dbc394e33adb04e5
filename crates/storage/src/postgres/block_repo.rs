//! Block repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use chronicle_core::error::StorageResult;
use chronicle_core::models::{Block, BlockTotal};
use chronicle_core::ports::BlockRepository;

use super::database::Database;
use super::helpers::query_err;
use super::rows::{BLOCK_COLUMNS, BLOCK_TOTAL_COLUMNS, BlockRow, BlockTotalRow};

/// PostgreSQL implementation of BlockRepository.
pub struct PgBlockRepository {
    pool: PgPool,
}

impl PgBlockRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl BlockRepository for PgBlockRepository {
    async fn get_block(&self, number: u64) -> StorageResult<Option<Block>> {
        let row = sqlx::query_as::<_, BlockRow>(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks WHERE number = $1"
        ))
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        row.map(BlockRow::into_block).transpose()
    }

    async fn get_block_total(&self, number: u64) -> StorageResult<Option<BlockTotal>> {
        let row = sqlx::query_as::<_, BlockTotalRow>(&format!(
            "SELECT {BLOCK_TOTAL_COLUMNS} FROM block_totals WHERE number = $1"
        ))
        .bind(number as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        row.map(BlockTotalRow::into_total).transpose()
    }

    async fn latest_block_number(&self) -> StorageResult<Option<u64>> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(number) FROM blocks")
            .fetch_one(&self.pool)
            .await
            .map_err(query_err)?;

        Ok(row.0.map(|n| n as u64))
    }
}
