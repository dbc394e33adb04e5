//! Port traits for data repositories.
//!
//! These traits define the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (`chronicle-storage`).
//!
//! Reads outside of block processing go through the repository traits;
//! everything the pipeline does for one block (accumulation and sequencing,
//! or the revert of one block) goes through a single [`StateTransaction`].

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{
    Account, AccountId, AccountIndex, AccountInfoSnapshot, AccountRole, AuditEntry, Block,
    BlockTotal, Contract, ContractInstance, Event, Extrinsic, IdentityJudgement, IndexerCursor,
    Log, SearchIndex, SearchIndexType, Session, SessionSnapshot, SessionTotal, SessionValidator,
};

/// Tables whose rows are keyed by the block that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockScopedTable {
    Logs,
    Audits,
    Contracts,
    ContractInstances,
    /// Sessions with their validators and nominators.
    Sessions,
    SearchIndex,
    AccountInfoSnapshots,
}

// =============================================================================
// Repository Traits
// =============================================================================

/// Repository for block data.
#[async_trait]
pub trait BlockRepository: Send + Sync {
    /// Get block by number.
    async fn get_block(&self, number: u64) -> StorageResult<Option<Block>>;

    /// Get the sequenced aggregate of a block.
    async fn get_block_total(&self, number: u64) -> StorageResult<Option<BlockTotal>>;

    /// Get latest indexed block number.
    async fn latest_block_number(&self) -> StorageResult<Option<u64>>;
}

/// Repository for derived account state.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get_account(&self, id: &AccountId) -> StorageResult<Option<Account>>;

    async fn get_account_index(&self, id: u64) -> StorageResult<Option<AccountIndex>>;
}

/// Repository for search index lookups.
#[async_trait]
pub trait SearchIndexRepository: Send + Sync {
    /// Most recent entries for an account, newest block first.
    async fn latest_for_account(
        &self,
        account: &AccountId,
        index_type: Option<SearchIndexType>,
        limit: usize,
    ) -> StorageResult<Vec<SearchIndex>>;
}

/// Repository for indexer cursor state.
#[async_trait]
pub trait CursorRepository: Send + Sync {
    /// Get current cursor for a chain.
    async fn get_cursor(&self, chain_id: &str) -> StorageResult<Option<IndexerCursor>>;

    /// Get any existing cursor (for chain mismatch detection).
    async fn get_any_cursor(&self) -> StorageResult<Option<IndexerCursor>>;
}

// =============================================================================
// Transaction
// =============================================================================

/// All reads and writes for one block, committed atomically.
///
/// Dropping a transaction without calling [`StateTransaction::commit`]
/// discards every write.
#[async_trait]
pub trait StateTransaction: Send {
    // --- accumulation writes -------------------------------------------------

    async fn insert_block(
        &mut self,
        block: &Block,
        extrinsics: &[Extrinsic],
        events: &[Event],
    ) -> StorageResult<()>;

    async fn insert_logs(&mut self, logs: &[Log]) -> StorageResult<()>;

    async fn insert_audits(&mut self, entries: &[AuditEntry]) -> StorageResult<()>;

    /// First block storing a code hash wins; later inserts are ignored.
    async fn insert_contracts(&mut self, contracts: &[Contract]) -> StorageResult<()>;

    async fn insert_contract_instances(&mut self, instances: &[ContractInstance]) -> StorageResult<()>;

    async fn insert_session(&mut self, snapshot: &SessionSnapshot) -> StorageResult<()>;

    async fn insert_search_index(&mut self, entries: &[SearchIndex]) -> StorageResult<()>;

    async fn insert_account_infos(&mut self, infos: &[AccountInfoSnapshot]) -> StorageResult<()>;

    // --- reads ----------------------------------------------------------------

    async fn block(&mut self, number: u64) -> StorageResult<Option<Block>>;

    async fn block_total(&mut self, number: u64) -> StorageResult<Option<BlockTotal>>;

    async fn extrinsics(&mut self, block_number: u64) -> StorageResult<Vec<Extrinsic>>;

    async fn events(&mut self, block_number: u64) -> StorageResult<Vec<Event>>;

    async fn logs(&mut self, block_number: u64) -> StorageResult<Vec<Log>>;

    /// Audit entries of a block in ordinal order.
    async fn audits(&mut self, block_number: u64) -> StorageResult<Vec<AuditEntry>>;

    async fn account(&mut self, id: &AccountId) -> StorageResult<Option<Account>>;

    /// Accounts whose `parent_identity` is `parent`.
    async fn sub_identities(&mut self, parent: &AccountId) -> StorageResult<Vec<Account>>;

    async fn account_index(&mut self, id: u64) -> StorageResult<Option<AccountIndex>>;

    /// Index rows currently linked to `account`.
    async fn account_indices_of(&mut self, account: &AccountId) -> StorageResult<Vec<AccountIndex>>;

    async fn identity_judgement(
        &mut self,
        account: &AccountId,
        registrar_index: u32,
    ) -> StorageResult<Option<IdentityJudgement>>;

    async fn session(&mut self, id: u64) -> StorageResult<Option<Session>>;

    async fn session_validator(
        &mut self,
        session_id: u64,
        rank: u32,
    ) -> StorageResult<Option<SessionValidator>>;

    async fn count_session_validators(&mut self, session_id: u64) -> StorageResult<u32>;

    // --- sequencing writes ----------------------------------------------------

    async fn save_account(&mut self, account: &Account) -> StorageResult<()>;

    async fn save_account_index(&mut self, index: &AccountIndex) -> StorageResult<()>;

    async fn save_identity_judgement(&mut self, judgement: &IdentityJudgement) -> StorageResult<()>;

    /// Apply a role's membership to the whole account population.
    ///
    /// Three passes, in this order: raise `was_*` for members, clear `is_*`
    /// for non-members, set `is_*` for members. Accounts that do not exist
    /// are not created.
    async fn update_role_membership(
        &mut self,
        role: AccountRole,
        members: &[AccountId],
        block_number: u64,
    ) -> StorageResult<()>;

    async fn save_session_total(&mut self, total: &SessionTotal) -> StorageResult<()>;

    async fn save_block_total(&mut self, total: &BlockTotal) -> StorageResult<()>;

    async fn set_cursor(&mut self, cursor: &IndexerCursor) -> StorageResult<()>;

    // --- revert ---------------------------------------------------------------

    /// Delete rows of `table` created by block `block_number`.
    async fn delete_created_at(&mut self, block_number: u64, table: BlockScopedTable) -> StorageResult<u64>;

    /// Delete the block row with its extrinsics, events and block total.
    async fn delete_block(&mut self, block_number: u64) -> StorageResult<()>;

    /// Make every write of this transaction durable.
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}

// =============================================================================
// Composite Repository
// =============================================================================

/// Combined repository access for the indexer.
#[async_trait]
pub trait Repositories: Send + Sync {
    /// Access the block repository.
    fn blocks(&self) -> &dyn BlockRepository;

    /// Access the account repository.
    fn accounts(&self) -> &dyn AccountRepository;

    /// Access the search index repository.
    fn search(&self) -> &dyn SearchIndexRepository;

    /// Access the cursor repository.
    fn cursor(&self) -> &dyn CursorRepository;

    /// Open a transaction for one block.
    ///
    /// Only one transaction is open at a time; a second call waits.
    async fn begin(&self) -> StorageResult<Box<dyn StateTransaction>>;
}
