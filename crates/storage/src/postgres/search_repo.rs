//! Search index repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use chronicle_core::error::StorageResult;
use chronicle_core::models::{AccountId, SearchIndex, SearchIndexType};
use chronicle_core::ports::SearchIndexRepository;

use super::database::Database;
use super::helpers::query_err;
use super::rows::{SEARCH_INDEX_COLUMNS, SearchIndexRow};

/// PostgreSQL implementation of SearchIndexRepository.
pub struct PgSearchIndexRepository {
    pool: PgPool,
}

impl PgSearchIndexRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl SearchIndexRepository for PgSearchIndexRepository {
    async fn latest_for_account(
        &self,
        account: &AccountId,
        index_type: Option<SearchIndexType>,
        limit: usize,
    ) -> StorageResult<Vec<SearchIndex>> {
        let rows = sqlx::query_as::<_, SearchIndexRow>(&format!(
            r#"
            SELECT {SEARCH_INDEX_COLUMNS}
            FROM search_index
            WHERE account_id = $1 AND ($2::TEXT IS NULL OR index_type = $2)
            ORDER BY block_number DESC, COALESCE(event_idx, extrinsic_idx, 0) DESC
            LIMIT $3
            "#
        ))
        .bind(&account.0[..])
        .bind(index_type.map(|t| t.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.into_iter().map(SearchIndexRow::into_entry).collect()
    }
}
