//! Account lifecycle processors.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use chronicle_core::error::{DomainError, DomainResult};
use chronicle_core::models::{
    AccountAction, AccountIndexAction, AccountInfoSnapshot, AuditRecord, Block,
    SearchIndex, SearchIndexType,
};
use chronicle_core::ports::{
    Accumulation, BlockScopedTable, Item, Processor, ProcessorContext, SequenceContext,
    StateTransaction,
};
use chronicle_core::services::referenced_accounts;
use chronicle_core::value::{extract_field, parse_amount, parse_u32};

use crate::utils::{attr_account, event_of, push_entry, require_attrs};

// =============================================================================
// Lifecycle events
// =============================================================================

/// `NewAccount`, `KilledAccount` and `ReapedAccount` from system or balances.
pub struct AccountEventProcessor {
    name: &'static str,
    action: AccountAction,
    /// Attribute counts seen across runtime versions.
    accepted: &'static [usize],
    /// Older runtimes free the account's indices along with the account.
    reaps_indices: bool,
}

impl AccountEventProcessor {
    pub fn system_new() -> Self {
        Self {
            name: "system.NewAccount",
            action: AccountAction::New,
            accepted: &[1],
            reaps_indices: false,
        }
    }

    pub fn balances_new() -> Self {
        Self {
            name: "balances.NewAccount",
            action: AccountAction::New,
            accepted: &[2],
            reaps_indices: false,
        }
    }

    pub fn system_killed() -> Self {
        Self {
            name: "system.KilledAccount",
            action: AccountAction::Reaped,
            accepted: &[1],
            reaps_indices: false,
        }
    }

    pub fn balances_reaped() -> Self {
        Self {
            name: "balances.ReapedAccount",
            action: AccountAction::Reaped,
            accepted: &[1, 2],
            reaps_indices: true,
        }
    }

    fn index_type(&self) -> SearchIndexType {
        match self.action {
            AccountAction::New => SearchIndexType::AccountCreated,
            AccountAction::Reaped => SearchIndexType::AccountKilled,
        }
    }
}

#[async_trait]
impl Processor for AccountEventProcessor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn accumulate(
        &self,
        _ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let event = event_of(self.name, &item)?;
        require_attrs(self.name, event, self.accepted)?;
        let account_id = attr_account(self.name, event, 0)?;

        out.audits.push(AuditRecord::Account {
            event_idx: event.index,
            extrinsic_idx: event.extrinsic_index(),
            account_id: account_id.clone(),
            action: self.action,
        });

        if self.reaps_indices {
            out.audits.push(AuditRecord::AccountIndex {
                event_idx: event.index,
                extrinsic_idx: event.extrinsic_index(),
                index_id: None,
                account_id: Some(account_id),
                action: AccountIndexAction::Reaped,
            });
        }
        Ok(())
    }

    fn search_index(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Vec<SearchIndex>,
    ) -> DomainResult<()> {
        let event = event_of(self.name, &item)?;
        let account_id = attr_account(self.name, event, 0)?;
        push_entry(out, ctx.raw.number, &item, account_id, self.index_type(), None);
        Ok(())
    }
}

// =============================================================================
// Block counters
// =============================================================================

/// Counts distinct accounts created and reaped in the block.
pub struct AccountCounterProcessor;

#[async_trait]
impl Processor for AccountCounterProcessor {
    fn name(&self) -> &'static str {
        "system.account_counters"
    }

    async fn accumulate(
        &self,
        _ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let Some(block) = item.accumulation() else {
            return Ok(());
        };

        let mut created = BTreeSet::new();
        let mut reaped = BTreeSet::new();
        for record in &block.audits {
            if let AuditRecord::Account {
                account_id, action, ..
            } = record
            {
                match action {
                    AccountAction::New => created.insert(account_id),
                    AccountAction::Reaped => reaped.insert(account_id),
                };
            }
        }

        out.counters.accounts_new += created.len() as u32;
        out.counters.accounts_reaped += reaped.len() as u32;
        Ok(())
    }
}

// =============================================================================
// Balance snapshots
// =============================================================================

/// Reads `System.Account` for every account referenced by the block's
/// search index and applies the result to the account in sequencing.
pub struct AccountInfoProcessor;

impl AccountInfoProcessor {
    const NAME: &'static str = "system.account_info";
}

/// Parse an `AccountInfo { nonce, data: { free, reserved, .. } }` value.
fn parse_account_info(value: &serde_json::Value) -> Option<(u128, u128, u32)> {
    let data = value.get("data")?;
    let free = extract_field(data, &["free"], 0, parse_amount)?;
    let reserved = extract_field(data, &["reserved"], 1, parse_amount).unwrap_or(0);
    let nonce = value.get("nonce").and_then(parse_u32).unwrap_or(0);
    Some((free, reserved, nonce))
}

#[async_trait]
impl Processor for AccountInfoProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn accumulate(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let Some(block) = item.accumulation() else {
            return Ok(());
        };

        for account_id in referenced_accounts(&block.search_index) {
            let Some(value) = ctx
                .storage("System", "Account", &[json!(account_id.to_hex())])
                .await?
            else {
                continue;
            };
            let (balance_free, balance_reserved, nonce) = parse_account_info(&value)
                .ok_or_else(|| {
                    DomainError::DecodingError(format!(
                        "System.Account of {account_id} at block {}: {value}",
                        ctx.raw.number
                    ))
                })?;

            out.account_infos.push(AccountInfoSnapshot {
                block_number: ctx.raw.number,
                account_id,
                balance_free,
                balance_reserved,
                nonce,
            });
        }
        Ok(())
    }

    async fn accumulation_revert(
        &self,
        block: &Block,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        tx.delete_created_at(block.number, BlockScopedTable::AccountInfoSnapshots)
            .await?;
        Ok(())
    }

    async fn sequence(
        &self,
        ctx: &SequenceContext<'_>,
        _item: Item<'_>,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        for info in &ctx.accumulation.account_infos {
            let Some(mut account) = tx.account(&info.account_id).await? else {
                debug!(account = %info.account_id, "Balance snapshot for unknown account");
                continue;
            };
            account.balance_free = Some(info.balance_free);
            account.balance_reserved = Some(info.balance_reserved);
            account.balance_total = Some(info.balance_total());
            account.nonce = Some(info.nonce);
            account.updated_at_block = ctx.block.number;
            tx.save_account(&account).await?;
        }
        Ok(())
    }
}
