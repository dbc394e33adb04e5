//! Account repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use chronicle_core::error::StorageResult;
use chronicle_core::models::{Account, AccountId, AccountIndex};
use chronicle_core::ports::AccountRepository;

use super::database::Database;
use super::helpers::query_err;
use super::rows::{ACCOUNT_COLUMNS, ACCOUNT_INDEX_COLUMNS, AccountIndexRow, AccountRow};

/// PostgreSQL implementation of AccountRepository.
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn get_account(&self, id: &AccountId) -> StorageResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(&id.0[..])
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        row.map(AccountRow::into_account).transpose()
    }

    async fn get_account_index(&self, id: u64) -> StorageResult<Option<AccountIndex>> {
        let row = sqlx::query_as::<_, AccountIndexRow>(&format!(
            "SELECT {ACCOUNT_INDEX_COLUMNS} FROM account_indices WHERE id = $1"
        ))
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        row.map(AccountIndexRow::into_index).transpose()
    }
}
