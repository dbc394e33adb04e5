//! In-memory storage adapter.
//!
//! Every transaction works on a private copy of the state and swaps it in on
//! commit, so a dropped transaction leaves nothing behind. A single writer
//! lock serializes transactions. Used by the end-to-end tests and by
//! `--dry-run`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use chronicle_core::error::StorageResult;
use chronicle_core::models::{
    Account, AccountId, AccountIndex, AccountInfoSnapshot, AccountRole, AuditEntry, Block,
    BlockTotal, CodeHash, Contract, ContractInstance, Event, Extrinsic, IdentityJudgement,
    IndexerCursor, Log, SearchIndex, SearchIndexType, Session, SessionNominator, SessionSnapshot,
    SessionTotal, SessionValidator,
};
use chronicle_core::ports::{
    AccountRepository, BlockRepository, BlockScopedTable, CursorRepository, Repositories,
    SearchIndexRepository, StateTransaction,
};

/// Full contents of the in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub blocks: BTreeMap<u64, Block>,
    pub extrinsics: BTreeMap<u64, Vec<Extrinsic>>,
    pub events: BTreeMap<u64, Vec<Event>>,
    pub block_totals: BTreeMap<u64, BlockTotal>,
    pub logs: Vec<Log>,
    pub audits: Vec<AuditEntry>,
    pub contracts: BTreeMap<CodeHash, Contract>,
    pub contract_instances: Vec<ContractInstance>,
    pub sessions: BTreeMap<u64, Session>,
    pub session_validators: BTreeMap<(u64, u32), SessionValidator>,
    pub session_nominators: BTreeMap<(u64, u32, u32), SessionNominator>,
    pub session_totals: BTreeMap<u64, SessionTotal>,
    pub search_index: Vec<SearchIndex>,
    pub account_infos: Vec<AccountInfoSnapshot>,
    pub accounts: BTreeMap<AccountId, Account>,
    pub account_indices: BTreeMap<u64, AccountIndex>,
    pub identity_judgements: BTreeMap<(AccountId, u32), IdentityJudgement>,
    pub cursors: BTreeMap<String, IndexerCursor>,
}

impl MemoryState {
    fn delete_created_at(&mut self, block_number: u64, table: BlockScopedTable) -> u64 {
        fn retain<T>(rows: &mut Vec<T>, keep: impl Fn(&T) -> bool) -> u64 {
            let before = rows.len();
            rows.retain(keep);
            (before - rows.len()) as u64
        }

        match table {
            BlockScopedTable::Logs => retain(&mut self.logs, |l| l.block_number != block_number),
            BlockScopedTable::Audits => {
                retain(&mut self.audits, |a| a.block_number != block_number)
            }
            BlockScopedTable::Contracts => {
                let before = self.contracts.len();
                self.contracts
                    .retain(|_, c| c.created_at_block != block_number);
                (before - self.contracts.len()) as u64
            }
            BlockScopedTable::ContractInstances => retain(&mut self.contract_instances, |c| {
                c.created_at_block != block_number
            }),
            BlockScopedTable::Sessions => {
                let doomed: HashSet<u64> = self
                    .sessions
                    .values()
                    .filter(|s| s.created_at_block == block_number)
                    .map(|s| s.id)
                    .collect();
                self.sessions.retain(|id, _| !doomed.contains(id));
                self.session_validators
                    .retain(|(session, _), _| !doomed.contains(session));
                self.session_nominators
                    .retain(|(session, _, _), _| !doomed.contains(session));
                doomed.len() as u64
            }
            BlockScopedTable::SearchIndex => {
                retain(&mut self.search_index, |s| s.block_number != block_number)
            }
            BlockScopedTable::AccountInfoSnapshots => {
                retain(&mut self.account_infos, |a| a.block_number != block_number)
            }
        }
    }
}

/// In-memory implementation of [`Repositories`].
#[derive(Clone, Default)]
pub struct MemoryRepositories {
    state: Arc<RwLock<MemoryState>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.read().await.clone()
    }

    /// Drop every row, keeping nothing but an empty store.
    pub async fn purge(&self) {
        let _writer = self.writer.lock().await;
        *self.state.write().await = MemoryState::default();
    }
}

#[async_trait]
impl BlockRepository for MemoryRepositories {
    async fn get_block(&self, number: u64) -> StorageResult<Option<Block>> {
        Ok(self.state.read().await.blocks.get(&number).cloned())
    }

    async fn get_block_total(&self, number: u64) -> StorageResult<Option<BlockTotal>> {
        Ok(self.state.read().await.block_totals.get(&number).cloned())
    }

    async fn latest_block_number(&self) -> StorageResult<Option<u64>> {
        Ok(self.state.read().await.blocks.keys().next_back().copied())
    }
}

#[async_trait]
impl AccountRepository for MemoryRepositories {
    async fn get_account(&self, id: &AccountId) -> StorageResult<Option<Account>> {
        Ok(self.state.read().await.accounts.get(id).cloned())
    }

    async fn get_account_index(&self, id: u64) -> StorageResult<Option<AccountIndex>> {
        Ok(self.state.read().await.account_indices.get(&id).cloned())
    }
}

#[async_trait]
impl SearchIndexRepository for MemoryRepositories {
    async fn latest_for_account(
        &self,
        account: &AccountId,
        index_type: Option<SearchIndexType>,
        limit: usize,
    ) -> StorageResult<Vec<SearchIndex>> {
        let state = self.state.read().await;
        let mut rows: Vec<SearchIndex> = state
            .search_index
            .iter()
            .filter(|s| &s.account_id == account)
            .filter(|s| index_type.is_none_or(|t| s.index_type == t))
            .cloned()
            .collect();
        rows.sort_by_key(|s| std::cmp::Reverse((s.block_number, s.item_idx())));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl CursorRepository for MemoryRepositories {
    async fn get_cursor(&self, chain_id: &str) -> StorageResult<Option<IndexerCursor>> {
        Ok(self.state.read().await.cursors.get(chain_id).cloned())
    }

    async fn get_any_cursor(&self) -> StorageResult<Option<IndexerCursor>> {
        Ok(self.state.read().await.cursors.values().next().cloned())
    }
}

#[async_trait]
impl Repositories for MemoryRepositories {
    fn blocks(&self) -> &dyn BlockRepository {
        self
    }

    fn accounts(&self) -> &dyn AccountRepository {
        self
    }

    fn search(&self) -> &dyn SearchIndexRepository {
        self
    }

    fn cursor(&self) -> &dyn CursorRepository {
        self
    }

    async fn begin(&self) -> StorageResult<Box<dyn StateTransaction>> {
        let guard = self.writer.clone().lock_owned().await;
        let working = self.state.read().await.clone();
        Ok(Box::new(MemoryTransaction {
            working,
            shared: self.state.clone(),
            _writer: guard,
        }))
    }
}

/// Transaction over a private copy of the state.
pub struct MemoryTransaction {
    working: MemoryState,
    shared: Arc<RwLock<MemoryState>>,
    _writer: OwnedMutexGuard<()>,
}

#[async_trait]
impl StateTransaction for MemoryTransaction {
    async fn insert_block(
        &mut self,
        block: &Block,
        extrinsics: &[Extrinsic],
        events: &[Event],
    ) -> StorageResult<()> {
        self.working.blocks.insert(block.number, block.clone());
        self.working
            .extrinsics
            .insert(block.number, extrinsics.to_vec());
        self.working.events.insert(block.number, events.to_vec());
        Ok(())
    }

    async fn insert_logs(&mut self, logs: &[Log]) -> StorageResult<()> {
        self.working.logs.extend_from_slice(logs);
        Ok(())
    }

    async fn insert_audits(&mut self, entries: &[AuditEntry]) -> StorageResult<()> {
        self.working.audits.extend_from_slice(entries);
        Ok(())
    }

    async fn insert_contracts(&mut self, contracts: &[Contract]) -> StorageResult<()> {
        for contract in contracts {
            self.working
                .contracts
                .entry(contract.code_hash.clone())
                .or_insert_with(|| contract.clone());
        }
        Ok(())
    }

    async fn insert_contract_instances(&mut self, instances: &[ContractInstance]) -> StorageResult<()> {
        self.working.contract_instances.extend_from_slice(instances);
        Ok(())
    }

    async fn insert_session(&mut self, snapshot: &SessionSnapshot) -> StorageResult<()> {
        let id = snapshot.session.id;
        self.working.sessions.insert(id, snapshot.session.clone());
        for v in &snapshot.validators {
            self.working
                .session_validators
                .insert((id, v.rank_validator), v.clone());
        }
        for n in &snapshot.nominators {
            self.working
                .session_nominators
                .insert((id, n.rank_validator, n.rank_nominator), n.clone());
        }
        Ok(())
    }

    async fn insert_search_index(&mut self, entries: &[SearchIndex]) -> StorageResult<()> {
        self.working.search_index.extend_from_slice(entries);
        Ok(())
    }

    async fn insert_account_infos(&mut self, infos: &[AccountInfoSnapshot]) -> StorageResult<()> {
        self.working.account_infos.extend_from_slice(infos);
        Ok(())
    }

    async fn block(&mut self, number: u64) -> StorageResult<Option<Block>> {
        Ok(self.working.blocks.get(&number).cloned())
    }

    async fn block_total(&mut self, number: u64) -> StorageResult<Option<BlockTotal>> {
        Ok(self.working.block_totals.get(&number).cloned())
    }

    async fn extrinsics(&mut self, block_number: u64) -> StorageResult<Vec<Extrinsic>> {
        Ok(self
            .working
            .extrinsics
            .get(&block_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn events(&mut self, block_number: u64) -> StorageResult<Vec<Event>> {
        Ok(self
            .working
            .events
            .get(&block_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn logs(&mut self, block_number: u64) -> StorageResult<Vec<Log>> {
        Ok(self
            .working
            .logs
            .iter()
            .filter(|l| l.block_number == block_number)
            .cloned()
            .collect())
    }

    async fn audits(&mut self, block_number: u64) -> StorageResult<Vec<AuditEntry>> {
        let mut entries: Vec<AuditEntry> = self
            .working
            .audits
            .iter()
            .filter(|a| a.block_number == block_number)
            .cloned()
            .collect();
        entries.sort_by_key(|a| a.ordinal);
        Ok(entries)
    }

    async fn account(&mut self, id: &AccountId) -> StorageResult<Option<Account>> {
        Ok(self.working.accounts.get(id).cloned())
    }

    async fn sub_identities(&mut self, parent: &AccountId) -> StorageResult<Vec<Account>> {
        Ok(self
            .working
            .accounts
            .values()
            .filter(|a| a.parent_identity.as_ref() == Some(parent))
            .cloned()
            .collect())
    }

    async fn account_index(&mut self, id: u64) -> StorageResult<Option<AccountIndex>> {
        Ok(self.working.account_indices.get(&id).cloned())
    }

    async fn account_indices_of(&mut self, account: &AccountId) -> StorageResult<Vec<AccountIndex>> {
        Ok(self
            .working
            .account_indices
            .values()
            .filter(|i| i.account_id.as_ref() == Some(account))
            .cloned()
            .collect())
    }

    async fn identity_judgement(
        &mut self,
        account: &AccountId,
        registrar_index: u32,
    ) -> StorageResult<Option<IdentityJudgement>> {
        Ok(self
            .working
            .identity_judgements
            .get(&(account.clone(), registrar_index))
            .cloned())
    }

    async fn session(&mut self, id: u64) -> StorageResult<Option<Session>> {
        Ok(self.working.sessions.get(&id).cloned())
    }

    async fn session_validator(
        &mut self,
        session_id: u64,
        rank: u32,
    ) -> StorageResult<Option<SessionValidator>> {
        Ok(self
            .working
            .session_validators
            .get(&(session_id, rank))
            .cloned())
    }

    async fn count_session_validators(&mut self, session_id: u64) -> StorageResult<u32> {
        Ok(self
            .working
            .session_validators
            .range((session_id, 0)..=(session_id, u32::MAX))
            .count() as u32)
    }

    async fn save_account(&mut self, account: &Account) -> StorageResult<()> {
        self.working
            .accounts
            .insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn save_account_index(&mut self, index: &AccountIndex) -> StorageResult<()> {
        self.working.account_indices.insert(index.id, index.clone());
        Ok(())
    }

    async fn save_identity_judgement(&mut self, judgement: &IdentityJudgement) -> StorageResult<()> {
        self.working.identity_judgements.insert(
            (judgement.account_id.clone(), judgement.registrar_index),
            judgement.clone(),
        );
        Ok(())
    }

    async fn update_role_membership(
        &mut self,
        role: AccountRole,
        members: &[AccountId],
        block_number: u64,
    ) -> StorageResult<()> {
        let members: HashSet<&AccountId> = members.iter().collect();
        let accounts = &mut self.working.accounts;

        for account in accounts.values_mut() {
            if members.contains(&account.id) && !account.roles.was(role) {
                account.roles.mark_was(role);
                account.updated_at_block = block_number;
            }
        }
        for account in accounts.values_mut() {
            if !members.contains(&account.id) && account.roles.is(role) {
                account.roles.set_current(role, false);
                account.updated_at_block = block_number;
            }
        }
        for account in accounts.values_mut() {
            if members.contains(&account.id) && !account.roles.is(role) {
                account.roles.set_current(role, true);
                account.updated_at_block = block_number;
            }
        }
        Ok(())
    }

    async fn save_session_total(&mut self, total: &SessionTotal) -> StorageResult<()> {
        self.working.session_totals.insert(total.id, total.clone());
        Ok(())
    }

    async fn save_block_total(&mut self, total: &BlockTotal) -> StorageResult<()> {
        self.working.block_totals.insert(total.number, total.clone());
        Ok(())
    }

    async fn set_cursor(&mut self, cursor: &IndexerCursor) -> StorageResult<()> {
        self.working
            .cursors
            .insert(cursor.chain_id.clone(), cursor.clone());
        Ok(())
    }

    async fn delete_created_at(&mut self, block_number: u64, table: BlockScopedTable) -> StorageResult<u64> {
        Ok(self.working.delete_created_at(block_number, table))
    }

    async fn delete_block(&mut self, block_number: u64) -> StorageResult<()> {
        self.working.blocks.remove(&block_number);
        self.working.extrinsics.remove(&block_number);
        self.working.events.remove(&block_number);
        self.working.block_totals.remove(&block_number);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let MemoryTransaction {
            working, shared, ..
        } = *self;
        *shared.write().await = working;
        Ok(())
    }
}
