//! Row types and column lists shared by the repositories and the transaction.

use chrono::{DateTime, Utc};
use sqlx::types::Json;

use chronicle_core::error::{StorageError, StorageResult};
use chronicle_core::models::{
    Account, AccountIndex, AppliedAuditLog, AuditEntry, AuditRecord, Block, BlockCounters,
    BlockHash, BlockTotal, Event, Extrinsic, IdentityFields, IdentityJudgement, IndexerCursor,
    Judgement, Log, RoleFlags, RunningTotals, SearchIndex, SearchIndexType, Session, SessionValidator,
};

use super::helpers::{
    bytes_to_account, bytes_to_hash32, bytes_to_hash32_strict, bytes_to_optional_account,
    numeric_to_u128, phase_from_columns,
};

pub const BLOCK_COLUMNS: &str = "number, hash, parent_hash, spec_version, datetime, slot_number, \
     authority_index, counters, indexed_at";

pub const BLOCK_TOTAL_COLUMNS: &str =
    "number, session_id, author, blocktime, parent_datetime, totals";

pub const ACCOUNT_COLUMNS: &str = "id, address, index_address, is_reaped, count_reaped, \
     is_validator, was_validator, is_nominator, was_nominator, \
     is_council_member, was_council_member, is_tech_comm_member, was_tech_comm_member, \
     is_registrar, was_registrar, is_sudo, was_sudo, is_treasury, \
     balance_free::TEXT AS balance_free, balance_reserved::TEXT AS balance_reserved, \
     balance_total::TEXT AS balance_total, nonce, identity, has_identity, has_subidentity, \
     parent_identity, subidentity_display, identity_judgement_good, identity_judgement_bad, \
     created_at_block, updated_at_block, applied_audits";

pub const ACCOUNT_INDEX_COLUMNS: &str =
    "id, account_id, short_address, is_reclaimable, created_at_block, updated_at_block";

pub const SEARCH_INDEX_COLUMNS: &str = "block_number, extrinsic_idx, event_idx, account_id, \
     index_type, sorting_value::TEXT AS sorting_value";

pub const SESSION_VALIDATOR_COLUMNS: &str = "session_id, rank_validator, validator_stash, \
     validator_controller, validator_session, bonded_total::TEXT AS bonded_total, \
     bonded_own::TEXT AS bonded_own, bonded_nominators::TEXT AS bonded_nominators, \
     count_nominators, commission";

// =============================================================================
// Blocks
// =============================================================================

#[derive(sqlx::FromRow)]
pub struct BlockRow {
    number: i64,
    hash: Vec<u8>,
    parent_hash: Vec<u8>,
    spec_version: i32,
    datetime: Option<DateTime<Utc>>,
    slot_number: Option<i64>,
    authority_index: Option<i32>,
    counters: Json<BlockCounters>,
    indexed_at: DateTime<Utc>,
}

impl BlockRow {
    pub fn into_block(self) -> StorageResult<Block> {
        Ok(Block {
            number: self.number as u64,
            hash: BlockHash(bytes_to_hash32_strict(self.hash, "block.hash")?),
            parent_hash: BlockHash(bytes_to_hash32(self.parent_hash, "block.parent_hash")?),
            spec_version: self.spec_version as u32,
            datetime: self.datetime,
            slot_number: self.slot_number.map(|s| s as u64),
            authority_index: self.authority_index.map(|i| i as u32),
            counters: self.counters.0,
            indexed_at: self.indexed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct BlockTotalRow {
    number: i64,
    session_id: i64,
    author: Option<Vec<u8>>,
    blocktime: i64,
    parent_datetime: Option<DateTime<Utc>>,
    totals: Json<RunningTotals>,
}

impl BlockTotalRow {
    pub fn into_total(self) -> StorageResult<BlockTotal> {
        Ok(BlockTotal {
            number: self.number as u64,
            session_id: self.session_id as u64,
            author: bytes_to_optional_account(self.author, "block_total.author")?,
            blocktime: self.blocktime as u64,
            parent_datetime: self.parent_datetime,
            totals: self.totals.0,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct ExtrinsicRow {
    block_number: i64,
    idx: i32,
    module_id: String,
    call_id: String,
    signer: Option<Vec<u8>>,
    success: bool,
    params: serde_json::Value,
}

impl ExtrinsicRow {
    pub fn into_extrinsic(self) -> StorageResult<Extrinsic> {
        Ok(Extrinsic {
            block_number: self.block_number as u64,
            index: self.idx as u32,
            module_id: self.module_id,
            call_id: self.call_id,
            signer: bytes_to_optional_account(self.signer, "extrinsic.signer")?,
            success: self.success,
            params: self.params,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct EventRow {
    block_number: i64,
    idx: i32,
    phase: String,
    extrinsic_idx: Option<i32>,
    module_id: String,
    event_id: String,
    attributes: serde_json::Value,
}

impl EventRow {
    pub fn into_event(self) -> StorageResult<Event> {
        Ok(Event {
            block_number: self.block_number as u64,
            index: self.idx as u32,
            phase: phase_from_columns(&self.phase, self.extrinsic_idx)?,
            module_id: self.module_id,
            event_id: self.event_id,
            attributes: self.attributes,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct LogRow {
    block_number: i64,
    idx: i32,
    kind: String,
    engine: Option<String>,
    data: serde_json::Value,
}

impl LogRow {
    pub fn into_log(self) -> Log {
        Log {
            block_number: self.block_number as u64,
            index: self.idx as u32,
            kind: self.kind,
            engine: self.engine,
            data: self.data,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct AuditRow {
    block_number: i64,
    ordinal: i32,
    record: Json<AuditRecord>,
}

impl AuditRow {
    pub fn into_entry(self) -> AuditEntry {
        AuditEntry {
            block_number: self.block_number as u64,
            ordinal: self.ordinal as u32,
            record: self.record.0,
        }
    }
}

// =============================================================================
// Accounts
// =============================================================================

#[derive(sqlx::FromRow)]
pub struct AccountRow {
    id: Vec<u8>,
    address: String,
    index_address: Option<String>,
    is_reaped: bool,
    count_reaped: i32,
    is_validator: bool,
    was_validator: bool,
    is_nominator: bool,
    was_nominator: bool,
    is_council_member: bool,
    was_council_member: bool,
    is_tech_comm_member: bool,
    was_tech_comm_member: bool,
    is_registrar: bool,
    was_registrar: bool,
    is_sudo: bool,
    was_sudo: bool,
    is_treasury: bool,
    balance_free: Option<String>,
    balance_reserved: Option<String>,
    balance_total: Option<String>,
    nonce: Option<i64>,
    identity: Json<IdentityFields>,
    has_identity: bool,
    has_subidentity: bool,
    parent_identity: Option<Vec<u8>>,
    subidentity_display: Option<String>,
    identity_judgement_good: i32,
    identity_judgement_bad: i32,
    created_at_block: i64,
    updated_at_block: i64,
    applied_audits: Json<AppliedAuditLog>,
}

impl AccountRow {
    pub fn into_account(self) -> StorageResult<Account> {
        Ok(Account {
            id: bytes_to_account(self.id, "account.id")?,
            address: self.address,
            index_address: self.index_address,
            is_reaped: self.is_reaped,
            count_reaped: self.count_reaped as u32,
            roles: RoleFlags {
                is_validator: self.is_validator,
                was_validator: self.was_validator,
                is_nominator: self.is_nominator,
                was_nominator: self.was_nominator,
                is_council_member: self.is_council_member,
                was_council_member: self.was_council_member,
                is_tech_comm_member: self.is_tech_comm_member,
                was_tech_comm_member: self.was_tech_comm_member,
                is_registrar: self.is_registrar,
                was_registrar: self.was_registrar,
                is_sudo: self.is_sudo,
                was_sudo: self.was_sudo,
            },
            is_treasury: self.is_treasury,
            balance_free: numeric_to_u128(self.balance_free, "account.balance_free")?,
            balance_reserved: numeric_to_u128(self.balance_reserved, "account.balance_reserved")?,
            balance_total: numeric_to_u128(self.balance_total, "account.balance_total")?,
            nonce: self.nonce.map(|n| n as u32),
            identity: self.identity.0,
            has_identity: self.has_identity,
            has_subidentity: self.has_subidentity,
            parent_identity: bytes_to_optional_account(
                self.parent_identity,
                "account.parent_identity",
            )?,
            subidentity_display: self.subidentity_display,
            identity_judgement_good: self.identity_judgement_good as u32,
            identity_judgement_bad: self.identity_judgement_bad as u32,
            created_at_block: self.created_at_block as u64,
            updated_at_block: self.updated_at_block as u64,
            applied_audits: self.applied_audits.0,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct AccountIndexRow {
    id: i64,
    account_id: Option<Vec<u8>>,
    short_address: String,
    is_reclaimable: bool,
    created_at_block: i64,
    updated_at_block: i64,
}

impl AccountIndexRow {
    pub fn into_index(self) -> StorageResult<AccountIndex> {
        Ok(AccountIndex {
            id: self.id as u64,
            account_id: bytes_to_optional_account(self.account_id, "account_index.account_id")?,
            short_address: self.short_address,
            is_reclaimable: self.is_reclaimable,
            created_at_block: self.created_at_block as u64,
            updated_at_block: self.updated_at_block as u64,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct JudgementRow {
    account_id: Vec<u8>,
    registrar_index: i32,
    judgement: String,
    created_at_block: i64,
    updated_at_block: i64,
}

impl JudgementRow {
    pub fn into_judgement(self) -> StorageResult<IdentityJudgement> {
        let judgement = Judgement::from_name(&self.judgement).ok_or_else(|| {
            StorageError::SerializationError(format!("unknown judgement: {}", self.judgement))
        })?;
        Ok(IdentityJudgement {
            account_id: bytes_to_account(self.account_id, "identity_judgement.account_id")?,
            registrar_index: self.registrar_index as u32,
            judgement,
            created_at_block: self.created_at_block as u64,
            updated_at_block: self.updated_at_block as u64,
        })
    }
}

// =============================================================================
// Sessions
// =============================================================================

#[derive(sqlx::FromRow)]
pub struct SessionRow {
    id: i64,
    start_at_block: i64,
    era: Option<i32>,
    count_validators: i32,
    count_nominators: i32,
    created_at_block: i64,
    created_at_extrinsic: Option<i32>,
    created_at_event: i32,
}

impl SessionRow {
    pub fn into_session(self) -> Session {
        Session {
            id: self.id as u64,
            start_at_block: self.start_at_block as u64,
            era: self.era.map(|e| e as u32),
            count_validators: self.count_validators as u32,
            count_nominators: self.count_nominators as u32,
            created_at_block: self.created_at_block as u64,
            created_at_extrinsic: self.created_at_extrinsic.map(|i| i as u32),
            created_at_event: self.created_at_event as u32,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct SessionValidatorRow {
    session_id: i64,
    rank_validator: i32,
    validator_stash: Vec<u8>,
    validator_controller: Option<Vec<u8>>,
    validator_session: Option<String>,
    bonded_total: Option<String>,
    bonded_own: Option<String>,
    bonded_nominators: Option<String>,
    count_nominators: i32,
    commission: Option<i32>,
}

impl SessionValidatorRow {
    pub fn into_validator(self) -> StorageResult<SessionValidator> {
        Ok(SessionValidator {
            session_id: self.session_id as u64,
            rank_validator: self.rank_validator as u32,
            validator_stash: bytes_to_account(self.validator_stash, "validator.stash")?,
            validator_controller: bytes_to_optional_account(
                self.validator_controller,
                "validator.controller",
            )?,
            validator_session: self.validator_session,
            bonded_total: numeric_to_u128(self.bonded_total, "validator.bonded_total")?,
            bonded_own: numeric_to_u128(self.bonded_own, "validator.bonded_own")?,
            bonded_nominators: numeric_to_u128(
                self.bonded_nominators,
                "validator.bonded_nominators",
            )?,
            count_nominators: self.count_nominators as u32,
            commission: self.commission.map(|c| c as u32),
        })
    }
}

// =============================================================================
// Search & cursor
// =============================================================================

#[derive(sqlx::FromRow)]
pub struct SearchIndexRow {
    block_number: i64,
    extrinsic_idx: Option<i32>,
    event_idx: Option<i32>,
    account_id: Vec<u8>,
    index_type: String,
    sorting_value: Option<String>,
}

impl SearchIndexRow {
    pub fn into_entry(self) -> StorageResult<SearchIndex> {
        let index_type = SearchIndexType::from_name(&self.index_type).ok_or_else(|| {
            StorageError::SerializationError(format!("unknown index type: {}", self.index_type))
        })?;
        Ok(SearchIndex {
            block_number: self.block_number as u64,
            extrinsic_idx: self.extrinsic_idx.map(|i| i as u32),
            event_idx: self.event_idx.map(|i| i as u32),
            account_id: bytes_to_account(self.account_id, "search_index.account_id")?,
            index_type,
            sorting_value: numeric_to_u128(self.sorting_value, "search_index.sorting_value")?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct CursorRow {
    chain_id: String,
    last_indexed_block: i64,
    last_indexed_hash: Vec<u8>,
    updated_at: DateTime<Utc>,
}

impl CursorRow {
    pub fn into_cursor(self) -> StorageResult<IndexerCursor> {
        Ok(IndexerCursor {
            chain_id: self.chain_id,
            last_indexed_block: self.last_indexed_block as u64,
            last_indexed_hash: BlockHash(bytes_to_hash32(
                self.last_indexed_hash,
                "cursor.last_indexed_hash",
            )?),
            updated_at: self.updated_at,
        })
    }
}
