//! Per-block PostgreSQL transaction.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use chronicle_core::error::{StorageError, StorageResult};
use chronicle_core::models::{
    Account, AccountId, AccountIndex, AccountInfoSnapshot, AccountRole, AuditEntry, Block,
    BlockTotal, Contract, ContractInstance, Event, Extrinsic, IdentityJudgement, IndexerCursor,
    Log, SearchIndex, Session, SessionSnapshot, SessionTotal, SessionValidator,
};
use chronicle_core::ports::{BlockScopedTable, StateTransaction};

use super::database::Database;
use super::helpers::{phase_to_columns, query_err, u128_to_numeric};
use super::rows::{
    ACCOUNT_COLUMNS, ACCOUNT_INDEX_COLUMNS, AccountIndexRow, AccountRow, AuditRow, BLOCK_COLUMNS,
    BLOCK_TOTAL_COLUMNS, BlockRow, BlockTotalRow, EventRow, ExtrinsicRow, JudgementRow, LogRow,
    SESSION_VALIDATOR_COLUMNS, SessionRow, SessionValidatorRow,
};

/// One database transaction per block, serialized by a writer lock.
pub struct PgStateTransaction {
    tx: Transaction<'static, Postgres>,
    _writer: OwnedMutexGuard<()>,
}

impl PgStateTransaction {
    pub(crate) async fn begin(db: &Database, writer: Arc<Mutex<()>>) -> StorageResult<Self> {
        let guard = writer.lock_owned().await;
        let tx = db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;
        Ok(Self { tx, _writer: guard })
    }
}

#[async_trait]
impl StateTransaction for PgStateTransaction {
    // -------------------------------------------------------------------------
    // Accumulation writes
    // -------------------------------------------------------------------------

    async fn insert_block(
        &mut self,
        block: &Block,
        extrinsics: &[Extrinsic],
        events: &[Event],
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO blocks (
                number, hash, parent_hash, spec_version, datetime, slot_number,
                authority_index, counters, indexed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(block.number as i64)
        .bind(&block.hash.0[..])
        .bind(&block.parent_hash.0[..])
        .bind(block.spec_version as i32)
        .bind(block.datetime)
        .bind(block.slot_number.map(|s| s as i64))
        .bind(block.authority_index.map(|i| i as i32))
        .bind(Json(&block.counters))
        .bind(block.indexed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;

        for ext in extrinsics {
            sqlx::query(
                r#"
                INSERT INTO extrinsics (
                    block_number, idx, module_id, call_id, signer, success, params
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(ext.block_number as i64)
            .bind(ext.index as i32)
            .bind(&ext.module_id)
            .bind(&ext.call_id)
            .bind(ext.signer.as_ref().map(|s| &s.0[..]))
            .bind(ext.success)
            .bind(&ext.params)
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;
        }

        for event in events {
            let (phase, extrinsic_idx) = phase_to_columns(event.phase);
            sqlx::query(
                r#"
                INSERT INTO events (
                    block_number, idx, phase, extrinsic_idx, module_id, event_id, attributes
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event.block_number as i64)
            .bind(event.index as i32)
            .bind(phase)
            .bind(extrinsic_idx)
            .bind(&event.module_id)
            .bind(&event.event_id)
            .bind(&event.attributes)
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;
        }

        Ok(())
    }

    async fn insert_logs(&mut self, logs: &[Log]) -> StorageResult<()> {
        for log in logs {
            sqlx::query(
                "INSERT INTO logs (block_number, idx, kind, engine, data) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(log.block_number as i64)
            .bind(log.index as i32)
            .bind(&log.kind)
            .bind(&log.engine)
            .bind(&log.data)
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;
        }
        Ok(())
    }

    async fn insert_audits(&mut self, entries: &[AuditEntry]) -> StorageResult<()> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO audits (block_number, ordinal, event_idx, extrinsic_idx, domain, record)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(entry.block_number as i64)
            .bind(entry.ordinal as i32)
            .bind(entry.record.event_idx() as i32)
            .bind(entry.record.extrinsic_idx().map(|i| i as i32))
            .bind(entry.record.domain().as_str())
            .bind(Json(&entry.record))
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;
        }
        Ok(())
    }

    async fn insert_contracts(&mut self, contracts: &[Contract]) -> StorageResult<()> {
        for contract in contracts {
            sqlx::query(
                r#"
                INSERT INTO contracts (
                    code_hash, bytecode, created_at_block, created_at_extrinsic, created_at_event
                )
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (code_hash) DO NOTHING
                "#,
            )
            .bind(&contract.code_hash.0[..])
            .bind(&contract.bytecode)
            .bind(contract.created_at_block as i64)
            .bind(contract.created_at_extrinsic.map(|i| i as i32))
            .bind(contract.created_at_event as i32)
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;
        }
        Ok(())
    }

    async fn insert_contract_instances(&mut self, instances: &[ContractInstance]) -> StorageResult<()> {
        for instance in instances {
            sqlx::query(
                r#"
                INSERT INTO contract_instances (
                    address, owner, code_hash, created_at_block, created_at_extrinsic,
                    created_at_event
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&instance.address.0[..])
            .bind(&instance.owner.0[..])
            .bind(instance.code_hash.as_ref().map(|h| &h.0[..]))
            .bind(instance.created_at_block as i64)
            .bind(instance.created_at_extrinsic.map(|i| i as i32))
            .bind(instance.created_at_event as i32)
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;
        }
        Ok(())
    }

    async fn insert_session(&mut self, snapshot: &SessionSnapshot) -> StorageResult<()> {
        let session = &snapshot.session;
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, start_at_block, era, count_validators, count_nominators,
                created_at_block, created_at_extrinsic, created_at_event
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id as i64)
        .bind(session.start_at_block as i64)
        .bind(session.era.map(|e| e as i32))
        .bind(session.count_validators as i32)
        .bind(session.count_nominators as i32)
        .bind(session.created_at_block as i64)
        .bind(session.created_at_extrinsic.map(|i| i as i32))
        .bind(session.created_at_event as i32)
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;

        for v in &snapshot.validators {
            sqlx::query(
                r#"
                INSERT INTO session_validators (
                    session_id, rank_validator, validator_stash, validator_controller,
                    validator_session, bonded_total, bonded_own, bonded_nominators,
                    count_nominators, commission
                )
                VALUES ($1, $2, $3, $4, $5, $6::NUMERIC, $7::NUMERIC, $8::NUMERIC, $9, $10)
                "#,
            )
            .bind(v.session_id as i64)
            .bind(v.rank_validator as i32)
            .bind(&v.validator_stash.0[..])
            .bind(v.validator_controller.as_ref().map(|c| &c.0[..]))
            .bind(&v.validator_session)
            .bind(u128_to_numeric(v.bonded_total))
            .bind(u128_to_numeric(v.bonded_own))
            .bind(u128_to_numeric(v.bonded_nominators))
            .bind(v.count_nominators as i32)
            .bind(v.commission.map(|c| c as i32))
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;
        }

        for n in &snapshot.nominators {
            sqlx::query(
                r#"
                INSERT INTO session_nominators (
                    session_id, rank_validator, rank_nominator, nominator_stash,
                    nominator_controller, bonded
                )
                VALUES ($1, $2, $3, $4, $5, $6::NUMERIC)
                "#,
            )
            .bind(n.session_id as i64)
            .bind(n.rank_validator as i32)
            .bind(n.rank_nominator as i32)
            .bind(&n.nominator_stash.0[..])
            .bind(n.nominator_controller.as_ref().map(|c| &c.0[..]))
            .bind(u128_to_numeric(n.bonded))
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;
        }

        Ok(())
    }

    async fn insert_search_index(&mut self, entries: &[SearchIndex]) -> StorageResult<()> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO search_index (
                    block_number, extrinsic_idx, event_idx, account_id, index_type, sorting_value
                )
                VALUES ($1, $2, $3, $4, $5, $6::NUMERIC)
                "#,
            )
            .bind(entry.block_number as i64)
            .bind(entry.extrinsic_idx.map(|i| i as i32))
            .bind(entry.event_idx.map(|i| i as i32))
            .bind(&entry.account_id.0[..])
            .bind(entry.index_type.as_str())
            .bind(u128_to_numeric(entry.sorting_value))
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;
        }
        Ok(())
    }

    async fn insert_account_infos(&mut self, infos: &[AccountInfoSnapshot]) -> StorageResult<()> {
        for info in infos {
            sqlx::query(
                r#"
                INSERT INTO account_info_snapshots (
                    block_number, account_id, balance_free, balance_reserved, nonce
                )
                VALUES ($1, $2, $3::NUMERIC, $4::NUMERIC, $5)
                "#,
            )
            .bind(info.block_number as i64)
            .bind(&info.account_id.0[..])
            .bind(info.balance_free.to_string())
            .bind(info.balance_reserved.to_string())
            .bind(i64::from(info.nonce))
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    async fn block(&mut self, number: u64) -> StorageResult<Option<Block>> {
        let row = sqlx::query_as::<_, BlockRow>(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks WHERE number = $1"
        ))
        .bind(number as i64)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_err)?;

        row.map(BlockRow::into_block).transpose()
    }

    async fn block_total(&mut self, number: u64) -> StorageResult<Option<BlockTotal>> {
        let row = sqlx::query_as::<_, BlockTotalRow>(&format!(
            "SELECT {BLOCK_TOTAL_COLUMNS} FROM block_totals WHERE number = $1"
        ))
        .bind(number as i64)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_err)?;

        row.map(BlockTotalRow::into_total).transpose()
    }

    async fn extrinsics(&mut self, block_number: u64) -> StorageResult<Vec<Extrinsic>> {
        let rows = sqlx::query_as::<_, ExtrinsicRow>(
            r#"
            SELECT block_number, idx, module_id, call_id, signer, success, params
            FROM extrinsics
            WHERE block_number = $1
            ORDER BY idx
            "#,
        )
        .bind(block_number as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(query_err)?;

        rows.into_iter().map(ExtrinsicRow::into_extrinsic).collect()
    }

    async fn events(&mut self, block_number: u64) -> StorageResult<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT block_number, idx, phase, extrinsic_idx, module_id, event_id, attributes
            FROM events
            WHERE block_number = $1
            ORDER BY idx
            "#,
        )
        .bind(block_number as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(query_err)?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    async fn logs(&mut self, block_number: u64) -> StorageResult<Vec<Log>> {
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT block_number, idx, kind, engine, data FROM logs WHERE block_number = $1 ORDER BY idx",
        )
        .bind(block_number as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(query_err)?;

        Ok(rows.into_iter().map(LogRow::into_log).collect())
    }

    async fn audits(&mut self, block_number: u64) -> StorageResult<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT block_number, ordinal, record FROM audits WHERE block_number = $1 ORDER BY ordinal",
        )
        .bind(block_number as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(query_err)?;

        Ok(rows.into_iter().map(AuditRow::into_entry).collect())
    }

    async fn account(&mut self, id: &AccountId) -> StorageResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(&id.0[..])
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_err)?;

        row.map(AccountRow::into_account).transpose()
    }

    async fn sub_identities(&mut self, parent: &AccountId) -> StorageResult<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE parent_identity = $1 ORDER BY id"
        ))
        .bind(&parent.0[..])
        .fetch_all(&mut *self.tx)
        .await
        .map_err(query_err)?;

        rows.into_iter().map(AccountRow::into_account).collect()
    }

    async fn account_index(&mut self, id: u64) -> StorageResult<Option<AccountIndex>> {
        let row = sqlx::query_as::<_, AccountIndexRow>(&format!(
            "SELECT {ACCOUNT_INDEX_COLUMNS} FROM account_indices WHERE id = $1"
        ))
        .bind(id as i64)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_err)?;

        row.map(AccountIndexRow::into_index).transpose()
    }

    async fn account_indices_of(&mut self, account: &AccountId) -> StorageResult<Vec<AccountIndex>> {
        let rows = sqlx::query_as::<_, AccountIndexRow>(&format!(
            "SELECT {ACCOUNT_INDEX_COLUMNS} FROM account_indices WHERE account_id = $1 ORDER BY id"
        ))
        .bind(&account.0[..])
        .fetch_all(&mut *self.tx)
        .await
        .map_err(query_err)?;

        rows.into_iter().map(AccountIndexRow::into_index).collect()
    }

    async fn identity_judgement(
        &mut self,
        account: &AccountId,
        registrar_index: u32,
    ) -> StorageResult<Option<IdentityJudgement>> {
        let row = sqlx::query_as::<_, JudgementRow>(
            r#"
            SELECT account_id, registrar_index, judgement, created_at_block, updated_at_block
            FROM identity_judgements
            WHERE account_id = $1 AND registrar_index = $2
            "#,
        )
        .bind(&account.0[..])
        .bind(registrar_index as i32)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_err)?;

        row.map(JudgementRow::into_judgement).transpose()
    }

    async fn session(&mut self, id: u64) -> StorageResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, start_at_block, era, count_validators, count_nominators,
                   created_at_block, created_at_extrinsic, created_at_event
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id as i64)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_err)?;

        Ok(row.map(SessionRow::into_session))
    }

    async fn session_validator(
        &mut self,
        session_id: u64,
        rank: u32,
    ) -> StorageResult<Option<SessionValidator>> {
        let row = sqlx::query_as::<_, SessionValidatorRow>(&format!(
            "SELECT {SESSION_VALIDATOR_COLUMNS} FROM session_validators \
             WHERE session_id = $1 AND rank_validator = $2"
        ))
        .bind(session_id as i64)
        .bind(rank as i32)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(query_err)?;

        row.map(SessionValidatorRow::into_validator).transpose()
    }

    async fn count_session_validators(&mut self, session_id: u64) -> StorageResult<u32> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM session_validators WHERE session_id = $1")
                .bind(session_id as i64)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(query_err)?;

        Ok(count.0 as u32)
    }

    // -------------------------------------------------------------------------
    // Sequencing writes
    // -------------------------------------------------------------------------

    async fn save_account(&mut self, a: &Account) -> StorageResult<()> {
        let r = &a.roles;
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, address, index_address, is_reaped, count_reaped,
                is_validator, was_validator, is_nominator, was_nominator,
                is_council_member, was_council_member, is_tech_comm_member, was_tech_comm_member,
                is_registrar, was_registrar, is_sudo, was_sudo, is_treasury,
                balance_free, balance_reserved, balance_total, nonce,
                identity, has_identity, has_subidentity, parent_identity, subidentity_display,
                identity_judgement_good, identity_judgement_bad,
                created_at_block, updated_at_block, applied_audits
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                $19::NUMERIC, $20::NUMERIC, $21::NUMERIC, $22,
                $23, $24, $25, $26, $27, $28, $29, $30, $31, $32
            )
            ON CONFLICT (id) DO UPDATE SET
                address = EXCLUDED.address,
                index_address = EXCLUDED.index_address,
                is_reaped = EXCLUDED.is_reaped,
                count_reaped = EXCLUDED.count_reaped,
                is_validator = EXCLUDED.is_validator,
                was_validator = EXCLUDED.was_validator,
                is_nominator = EXCLUDED.is_nominator,
                was_nominator = EXCLUDED.was_nominator,
                is_council_member = EXCLUDED.is_council_member,
                was_council_member = EXCLUDED.was_council_member,
                is_tech_comm_member = EXCLUDED.is_tech_comm_member,
                was_tech_comm_member = EXCLUDED.was_tech_comm_member,
                is_registrar = EXCLUDED.is_registrar,
                was_registrar = EXCLUDED.was_registrar,
                is_sudo = EXCLUDED.is_sudo,
                was_sudo = EXCLUDED.was_sudo,
                is_treasury = EXCLUDED.is_treasury,
                balance_free = EXCLUDED.balance_free,
                balance_reserved = EXCLUDED.balance_reserved,
                balance_total = EXCLUDED.balance_total,
                nonce = EXCLUDED.nonce,
                identity = EXCLUDED.identity,
                has_identity = EXCLUDED.has_identity,
                has_subidentity = EXCLUDED.has_subidentity,
                parent_identity = EXCLUDED.parent_identity,
                subidentity_display = EXCLUDED.subidentity_display,
                identity_judgement_good = EXCLUDED.identity_judgement_good,
                identity_judgement_bad = EXCLUDED.identity_judgement_bad,
                updated_at_block = EXCLUDED.updated_at_block,
                applied_audits = EXCLUDED.applied_audits
            "#,
        )
        .bind(&a.id.0[..])
        .bind(&a.address)
        .bind(&a.index_address)
        .bind(a.is_reaped)
        .bind(a.count_reaped as i32)
        .bind(r.is_validator)
        .bind(r.was_validator)
        .bind(r.is_nominator)
        .bind(r.was_nominator)
        .bind(r.is_council_member)
        .bind(r.was_council_member)
        .bind(r.is_tech_comm_member)
        .bind(r.was_tech_comm_member)
        .bind(r.is_registrar)
        .bind(r.was_registrar)
        .bind(r.is_sudo)
        .bind(r.was_sudo)
        .bind(a.is_treasury)
        .bind(u128_to_numeric(a.balance_free))
        .bind(u128_to_numeric(a.balance_reserved))
        .bind(u128_to_numeric(a.balance_total))
        .bind(a.nonce.map(i64::from))
        .bind(Json(&a.identity))
        .bind(a.has_identity)
        .bind(a.has_subidentity)
        .bind(a.parent_identity.as_ref().map(|p| &p.0[..]))
        .bind(&a.subidentity_display)
        .bind(a.identity_judgement_good as i32)
        .bind(a.identity_judgement_bad as i32)
        .bind(a.created_at_block as i64)
        .bind(a.updated_at_block as i64)
        .bind(Json(&a.applied_audits))
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn save_account_index(&mut self, index: &AccountIndex) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO account_indices (
                id, account_id, short_address, is_reclaimable, created_at_block, updated_at_block
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                account_id = EXCLUDED.account_id,
                short_address = EXCLUDED.short_address,
                is_reclaimable = EXCLUDED.is_reclaimable,
                created_at_block = EXCLUDED.created_at_block,
                updated_at_block = EXCLUDED.updated_at_block
            "#,
        )
        .bind(index.id as i64)
        .bind(index.account_id.as_ref().map(|a| &a.0[..]))
        .bind(&index.short_address)
        .bind(index.is_reclaimable)
        .bind(index.created_at_block as i64)
        .bind(index.updated_at_block as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn save_identity_judgement(&mut self, j: &IdentityJudgement) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO identity_judgements (
                account_id, registrar_index, judgement, created_at_block, updated_at_block
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (account_id, registrar_index) DO UPDATE SET
                judgement = EXCLUDED.judgement,
                updated_at_block = EXCLUDED.updated_at_block
            "#,
        )
        .bind(&j.account_id.0[..])
        .bind(j.registrar_index as i32)
        .bind(j.judgement.as_str())
        .bind(j.created_at_block as i64)
        .bind(j.updated_at_block as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn update_role_membership(
        &mut self,
        role: AccountRole,
        members: &[AccountId],
        block_number: u64,
    ) -> StorageResult<()> {
        let (is_col, was_col) = role.columns();
        let ids: Vec<Vec<u8>> = members.iter().map(|m| m.0.to_vec()).collect();
        let block = block_number as i64;

        let raised = sqlx::query(&format!(
            "UPDATE accounts SET {was_col} = TRUE, updated_at_block = $2 \
             WHERE id = ANY($1) AND NOT {was_col}"
        ))
        .bind(&ids)
        .bind(block)
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;

        let cleared = sqlx::query(&format!(
            "UPDATE accounts SET {is_col} = FALSE, updated_at_block = $2 \
             WHERE {is_col} AND NOT (id = ANY($1))"
        ))
        .bind(&ids)
        .bind(block)
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;

        let set = sqlx::query(&format!(
            "UPDATE accounts SET {is_col} = TRUE, updated_at_block = $2 \
             WHERE id = ANY($1) AND NOT {is_col}"
        ))
        .bind(&ids)
        .bind(block)
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;

        debug!(
            role = is_col,
            raised = raised.rows_affected(),
            cleared = cleared.rows_affected(),
            set = set.rows_affected(),
            "Role membership updated"
        );

        Ok(())
    }

    async fn save_session_total(&mut self, total: &SessionTotal) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO session_totals (id, end_at_block, count_blocks)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                end_at_block = EXCLUDED.end_at_block,
                count_blocks = EXCLUDED.count_blocks
            "#,
        )
        .bind(total.id as i64)
        .bind(total.end_at_block as i64)
        .bind(total.count_blocks as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn save_block_total(&mut self, total: &BlockTotal) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO block_totals (number, session_id, author, blocktime, parent_datetime, totals)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (number) DO UPDATE SET
                session_id = EXCLUDED.session_id,
                author = EXCLUDED.author,
                blocktime = EXCLUDED.blocktime,
                parent_datetime = EXCLUDED.parent_datetime,
                totals = EXCLUDED.totals
            "#,
        )
        .bind(total.number as i64)
        .bind(total.session_id as i64)
        .bind(total.author.as_ref().map(|a| &a.0[..]))
        .bind(total.blocktime as i64)
        .bind(total.parent_datetime)
        .bind(Json(&total.totals))
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn set_cursor(&mut self, cursor: &IndexerCursor) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO indexer_cursor (chain_id, last_indexed_block, last_indexed_hash, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (chain_id) DO UPDATE SET
                last_indexed_block = EXCLUDED.last_indexed_block,
                last_indexed_hash = EXCLUDED.last_indexed_hash,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&cursor.chain_id)
        .bind(cursor.last_indexed_block as i64)
        .bind(&cursor.last_indexed_hash.0[..])
        .bind(cursor.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Revert
    // -------------------------------------------------------------------------

    async fn delete_created_at(&mut self, block_number: u64, table: BlockScopedTable) -> StorageResult<u64> {
        // Validators and nominators go with their session (ON DELETE CASCADE).
        let sql = match table {
            BlockScopedTable::Logs => "DELETE FROM logs WHERE block_number = $1",
            BlockScopedTable::Audits => "DELETE FROM audits WHERE block_number = $1",
            BlockScopedTable::Contracts => "DELETE FROM contracts WHERE created_at_block = $1",
            BlockScopedTable::ContractInstances => {
                "DELETE FROM contract_instances WHERE created_at_block = $1"
            }
            BlockScopedTable::Sessions => "DELETE FROM sessions WHERE created_at_block = $1",
            BlockScopedTable::SearchIndex => "DELETE FROM search_index WHERE block_number = $1",
            BlockScopedTable::AccountInfoSnapshots => {
                "DELETE FROM account_info_snapshots WHERE block_number = $1"
            }
        };

        let result = sqlx::query(sql)
            .bind(block_number as i64)
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected())
    }

    async fn delete_block(&mut self, block_number: u64) -> StorageResult<()> {
        // Extrinsics, events and the block total cascade.
        sqlx::query("DELETE FROM blocks WHERE number = $1")
            .bind(block_number as i64)
            .execute(&mut *self.tx)
            .await
            .map_err(query_err)?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let PgStateTransaction { tx, _writer } = *self;
        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))
    }
}
