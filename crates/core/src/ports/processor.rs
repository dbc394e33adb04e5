//! Port trait for block item processors.
//!
//! This is the main extensibility point for the indexer. A processor is
//! registered against an extrinsic, event or log key (or the block itself)
//! and implements any of four capabilities:
//!
//! - accumulation: record facts derived from the block's own content
//! - accumulation revert: delete what accumulation created
//! - sequencing: derive mutable state from the parent's sequenced state
//! - search indexing: emit account lookup tuples
//!
//! Unimplemented capabilities are no-ops.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::address::Ss58Codec;
use crate::config::{RetryConfig, RuntimeProfile};
use crate::error::{ChainError, DomainResult};
use crate::models::{
    AccountInfoSnapshot, AccountRole, AuditRecord, Block, BlockCounters, BlockTotal, Contract,
    ContractInstance, Log, RoleMembership, SearchIndex, SessionSnapshot,
};
use crate::ports::block_source::{RawBlock, RawEvent, RawExtrinsic, RawLog};
use crate::ports::chain_state::ChainState;
use crate::ports::repository::StateTransaction;
use crate::retry::with_retry;

/// What a processor is invoked for.
#[derive(Debug, Clone, Copy)]
pub enum Item<'a> {
    Extrinsic(&'a RawExtrinsic),
    Event {
        event: &'a RawEvent,
        /// The extrinsic that emitted the event, if any.
        extrinsic: Option<&'a RawExtrinsic>,
    },
    Log(&'a RawLog),
    /// Block processors see the merged output of the item phase.
    Block(&'a Accumulation),
}

impl<'a> Item<'a> {
    pub fn event(&self) -> Option<&'a RawEvent> {
        match self {
            Item::Event { event, .. } => Some(event),
            _ => None,
        }
    }

    pub fn extrinsic(&self) -> Option<&'a RawExtrinsic> {
        match self {
            Item::Extrinsic(ext) => Some(ext),
            Item::Event { extrinsic, .. } => *extrinsic,
            _ => None,
        }
    }

    pub fn log(&self) -> Option<&'a RawLog> {
        match self {
            Item::Log(log) => Some(log),
            _ => None,
        }
    }

    pub fn accumulation(&self) -> Option<&'a Accumulation> {
        match self {
            Item::Block(acc) => Some(acc),
            _ => None,
        }
    }

    /// `(extrinsic_idx, event_idx)` of the item.
    pub fn coordinates(&self) -> (Option<u32>, Option<u32>) {
        match self {
            Item::Extrinsic(ext) => (Some(ext.index), None),
            Item::Event { event, .. } => (event.extrinsic_index(), Some(event.index)),
            Item::Log(_) | Item::Block(_) => (None, None),
        }
    }
}

// =============================================================================
// Accumulation output
// =============================================================================

/// Facts produced while accumulating one block.
///
/// Every processor invocation writes into a fresh value; the pipeline merges
/// it only when the invocation succeeds, so siblings never see each other's
/// output.
#[derive(Debug, Clone, Default)]
pub struct Accumulation {
    /// Counter deltas on top of the block's base counters.
    pub counters: BlockCounters,
    pub datetime: Option<DateTime<Utc>>,
    pub slot_number: Option<u64>,
    pub authority_index: Option<u32>,
    pub logs: Vec<Log>,
    pub audits: Vec<AuditRecord>,
    pub contracts: Vec<Contract>,
    pub contract_instances: Vec<ContractInstance>,
    pub sessions: Vec<SessionSnapshot>,
    /// Role sets read at this block, latest last.
    pub memberships: Vec<RoleMembership>,
    pub search_index: Vec<SearchIndex>,
    pub account_infos: Vec<AccountInfoSnapshot>,
}

impl Accumulation {
    pub fn merge(&mut self, other: Accumulation) {
        self.counters.absorb(&other.counters);
        if other.datetime.is_some() {
            self.datetime = other.datetime;
        }
        if other.slot_number.is_some() {
            self.slot_number = other.slot_number;
        }
        if other.authority_index.is_some() {
            self.authority_index = other.authority_index;
        }
        self.logs.extend(other.logs);
        self.audits.extend(other.audits);
        self.contracts.extend(other.contracts);
        self.contract_instances.extend(other.contract_instances);
        self.sessions.extend(other.sessions);
        self.memberships.extend(other.memberships);
        self.search_index.extend(other.search_index);
        self.account_infos.extend(other.account_infos);
    }

    /// Last membership captured for `role` in this block.
    pub fn membership(&self, role: AccountRole) -> Option<&RoleMembership> {
        self.memberships.iter().rev().find(|m| m.role == role)
    }
}

// =============================================================================
// Contexts
// =============================================================================

/// Read-only context for accumulation and search indexing.
pub struct ProcessorContext<'a> {
    pub raw: &'a RawBlock,
    pub runtime: RuntimeProfile,
    pub codec: Ss58Codec,
    pub chain: &'a dyn ChainState,
    pub retry: &'a RetryConfig,
}

impl ProcessorContext<'_> {
    /// Runtime storage at this block, retried on transient failures.
    ///
    /// A storage function the runtime does not define reads as `None`.
    pub async fn storage(
        &self,
        pallet: &str,
        entry: &str,
        keys: &[serde_json::Value],
    ) -> DomainResult<Option<serde_json::Value>> {
        let operation = format!("{pallet}.{entry}@{}", self.raw.number);
        let result = with_retry(self.retry, &operation, || {
            self.chain.storage(&self.raw.hash, pallet, entry, keys)
        })
        .await;

        match result {
            Ok(value) => Ok(value),
            Err(ChainError::StorageFunctionMissing { .. }) => {
                debug!(
                    pallet,
                    entry,
                    spec_version = self.runtime.spec_version,
                    "Storage function absent in runtime"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Context for sequencing one block.
pub struct SequenceContext<'a> {
    pub raw: &'a RawBlock,
    /// This block with its accumulated counters.
    pub block: &'a Block,
    /// Parent block; absent only at the first indexed height.
    pub parent: Option<&'a Block>,
    /// Parent's sequenced aggregate.
    pub parent_total: Option<&'a BlockTotal>,
    /// This block's merged accumulation output.
    pub accumulation: &'a Accumulation,
    pub runtime: RuntimeProfile,
    pub codec: Ss58Codec,
}

// =============================================================================
// Processor
// =============================================================================

/// A handler for one kind of block item.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Stable name, used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Record facts for `item` into `out`.
    ///
    /// May read only the block's own content and chain state at the block.
    async fn accumulate(
        &self,
        _ctx: &ProcessorContext<'_>,
        _item: Item<'_>,
        _out: &mut Accumulation,
    ) -> DomainResult<()> {
        Ok(())
    }

    /// Delete what [`Processor::accumulate`] created for `block`.
    async fn accumulation_revert(
        &self,
        _block: &Block,
        _tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        Ok(())
    }

    /// Derive mutable state for `item`.
    async fn sequence(
        &self,
        _ctx: &SequenceContext<'_>,
        _item: Item<'_>,
        _tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        Ok(())
    }

    /// Emit search index tuples for `item`.
    fn search_index(
        &self,
        _ctx: &ProcessorContext<'_>,
        _item: Item<'_>,
        _out: &mut Vec<SearchIndex>,
    ) -> DomainResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountAction, AccountId};

    // Test critique: la fusion additionne les compteurs et concatène les faits
    #[test]
    fn test_merge_adds_counters_and_facts() {
        let mut merged = Accumulation::default();

        let mut first = Accumulation::default();
        first.counters.accounts_new = 1;
        first.slot_number = Some(9);
        first.audits.push(AuditRecord::Account {
            event_idx: 1,
            extrinsic_idx: None,
            account_id: AccountId([1; 32]),
            action: AccountAction::New,
        });

        let mut second = Accumulation::default();
        second.counters.accounts_new = 2;
        second.counters.sessions_new = 1;

        merged.merge(first);
        merged.merge(second);

        assert_eq!(merged.counters.accounts_new, 3);
        assert_eq!(merged.counters.sessions_new, 1);
        assert_eq!(merged.slot_number, Some(9));
        assert_eq!(merged.audits.len(), 1);
    }
}
