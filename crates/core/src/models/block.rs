use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, BlockHash};

// =============================================================================
// Block & Chain Data
// =============================================================================

/// Per-block counters filled during accumulation.
///
/// Extrinsic, event and log counts come straight from the decoded block;
/// account, session and contract counts are deltas contributed by processors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCounters {
    pub extrinsics: u32,
    pub extrinsics_success: u32,
    pub extrinsics_error: u32,
    pub extrinsics_signed: u32,
    pub extrinsics_unsigned: u32,
    pub events: u32,
    pub events_system: u32,
    pub events_module: u32,
    pub events_extrinsic: u32,
    pub events_finalization: u32,
    pub logs: u32,
    pub accounts_new: u32,
    pub accounts_reaped: u32,
    pub sessions_new: u32,
    pub contracts_new: u32,
}

impl BlockCounters {
    /// Net account delta (new minus reaped).
    pub fn accounts(&self) -> i64 {
        i64::from(self.accounts_new) - i64::from(self.accounts_reaped)
    }

    /// Add another set of counters into this one.
    pub fn absorb(&mut self, other: &BlockCounters) {
        self.extrinsics += other.extrinsics;
        self.extrinsics_success += other.extrinsics_success;
        self.extrinsics_error += other.extrinsics_error;
        self.extrinsics_signed += other.extrinsics_signed;
        self.extrinsics_unsigned += other.extrinsics_unsigned;
        self.events += other.events;
        self.events_system += other.events_system;
        self.events_module += other.events_module;
        self.events_extrinsic += other.events_extrinsic;
        self.events_finalization += other.events_finalization;
        self.logs += other.logs;
        self.accounts_new += other.accounts_new;
        self.accounts_reaped += other.accounts_reaped;
        self.sessions_new += other.sessions_new;
        self.contracts_new += other.contracts_new;
    }
}

/// Indexed block.
///
/// Created once per height; only revert removes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block number (height).
    pub number: u64,
    /// Block hash.
    pub hash: BlockHash,
    /// Parent block hash.
    pub parent_hash: BlockHash,
    /// Runtime spec version the block was executed with.
    pub spec_version: u32,
    /// Timestamp from `timestamp.set` (if present).
    pub datetime: Option<DateTime<Utc>>,
    /// Consensus slot from the pre-runtime digest.
    pub slot_number: Option<u64>,
    /// Explicit authority index from the pre-runtime digest (BABE).
    pub authority_index: Option<u32>,
    /// Per-block counters.
    pub counters: BlockCounters,
    /// When this block was indexed.
    pub indexed_at: DateTime<Utc>,
}

// =============================================================================
// Extrinsics, Events & Logs
// =============================================================================

/// Phase in which an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    /// Emitted while applying the extrinsic at this index.
    ApplyExtrinsic(u32),
    /// Emitted during block finalization.
    Finalization,
    /// Emitted during block initialization.
    Initialization,
}

impl EventPhase {
    /// Index of the emitting extrinsic, if any.
    pub fn extrinsic_index(&self) -> Option<u32> {
        match self {
            Self::ApplyExtrinsic(idx) => Some(*idx),
            _ => None,
        }
    }
}

/// Indexed extrinsic (transaction or inherent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extrinsic {
    /// Block number containing this extrinsic.
    pub block_number: u64,
    /// Index within the block (0-based).
    pub index: u32,
    /// Module (pallet) identifier, lowercase.
    pub module_id: String,
    /// Call identifier (e.g., "transfer").
    pub call_id: String,
    /// Signer account (None for unsigned/inherent).
    pub signer: Option<AccountId>,
    /// Whether dispatch succeeded.
    pub success: bool,
    /// Call parameters as a JSON array of `{name, type, value}`.
    pub params: serde_json::Value,
}

/// Indexed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Block number containing this event.
    pub block_number: u64,
    /// Index within the block (0-based).
    pub index: u32,
    /// Emission phase; links to the extrinsic that emitted it.
    pub phase: EventPhase,
    /// Module (pallet) identifier, lowercase.
    pub module_id: String,
    /// Event identifier (e.g., "Transfer").
    pub event_id: String,
    /// Attributes as a JSON array of `{type, value}`.
    pub attributes: serde_json::Value,
}

impl Event {
    /// Index of the extrinsic that emitted this event.
    pub fn extrinsic_index(&self) -> Option<u32> {
        self.phase.extrinsic_index()
    }
}

/// Indexed consensus log (header digest item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub block_number: u64,
    pub index: u32,
    /// Digest item kind ("PreRuntime", "Seal", ...).
    pub kind: String,
    /// Consensus engine id, when the item carries one.
    pub engine: Option<String>,
    /// Decoded content.
    pub data: serde_json::Value,
}

// =============================================================================
// Running Totals
// =============================================================================

/// Cumulative counters since the first indexed block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningTotals {
    pub extrinsics: u64,
    pub extrinsics_success: u64,
    pub extrinsics_error: u64,
    pub extrinsics_signed: u64,
    pub extrinsics_unsigned: u64,
    pub events: u64,
    pub events_system: u64,
    pub events_module: u64,
    pub events_extrinsic: u64,
    pub events_finalization: u64,
    pub logs: u64,
    pub accounts_new: u64,
    pub accounts_reaped: u64,
    pub accounts: i64,
    pub sessions_new: u64,
    pub contracts_new: u64,
    /// Sum of block times in seconds.
    pub blocktime: u64,
}

impl RunningTotals {
    /// Totals after adding one block's counters.
    pub fn advance(&self, c: &BlockCounters, blocktime: u64) -> Self {
        Self {
            extrinsics: self.extrinsics + u64::from(c.extrinsics),
            extrinsics_success: self.extrinsics_success + u64::from(c.extrinsics_success),
            extrinsics_error: self.extrinsics_error + u64::from(c.extrinsics_error),
            extrinsics_signed: self.extrinsics_signed + u64::from(c.extrinsics_signed),
            extrinsics_unsigned: self.extrinsics_unsigned + u64::from(c.extrinsics_unsigned),
            events: self.events + u64::from(c.events),
            events_system: self.events_system + u64::from(c.events_system),
            events_module: self.events_module + u64::from(c.events_module),
            events_extrinsic: self.events_extrinsic + u64::from(c.events_extrinsic),
            events_finalization: self.events_finalization + u64::from(c.events_finalization),
            logs: self.logs + u64::from(c.logs),
            accounts_new: self.accounts_new + u64::from(c.accounts_new),
            accounts_reaped: self.accounts_reaped + u64::from(c.accounts_reaped),
            accounts: self.accounts + c.accounts(),
            sessions_new: self.sessions_new + u64::from(c.sessions_new),
            contracts_new: self.contracts_new + u64::from(c.contracts_new),
            blocktime: self.blocktime + blocktime,
        }
    }
}

/// Sequenced aggregate for one block height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTotal {
    /// Block number this total belongs to.
    pub number: u64,
    /// Session the block belongs to.
    pub session_id: u64,
    /// Block author, resolved from the session's validator ranks.
    pub author: Option<AccountId>,
    /// Seconds since the parent block.
    pub blocktime: u64,
    /// Parent block datetime.
    pub parent_datetime: Option<DateTime<Utc>>,
    /// Cumulative counters up to and including this block.
    pub totals: RunningTotals,
}

// =============================================================================
// Indexer State
// =============================================================================

/// Indexer cursor tracking progress.
///
/// The cursor tracks the last successfully indexed block for each chain,
/// enabling the indexer to resume from where it left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerCursor {
    /// Chain identifier (genesis hash).
    pub chain_id: String,
    /// Last fully indexed block number.
    pub last_indexed_block: u64,
    /// Last indexed block hash (for reorg detection).
    pub last_indexed_hash: BlockHash,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}
