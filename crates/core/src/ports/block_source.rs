//! Port trait for blockchain data source.
//!
//! This trait defines the interface for fetching decoded blocks and
//! subscribing to finalized heads. Implementations live in the
//! infrastructure layer (e.g., `chronicle-substrate`). The core never
//! decodes raw SCALE bytes.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::ChainResult;
use crate::models::{AccountId, BlockCounters, BlockHash, EventPhase};

/// Decoded block as handed over by the supplier.
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: BlockHash,
    /// Parent hash.
    pub parent_hash: BlockHash,
    /// Runtime spec version the block executed under.
    pub spec_version: u32,
    /// Extrinsics in block order.
    pub extrinsics: Vec<RawExtrinsic>,
    /// Events in block order.
    pub events: Vec<RawEvent>,
    /// Header digest items in order.
    pub logs: Vec<RawLog>,
}

/// One named call parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallParam {
    pub name: String,
    pub type_name: String,
    pub value: serde_json::Value,
}

/// Decoded extrinsic.
#[derive(Debug, Clone)]
pub struct RawExtrinsic {
    /// Index in block.
    pub index: u32,
    /// Lowercase pallet name.
    pub module_id: String,
    /// Call name.
    pub call_id: String,
    /// Ordered call parameters.
    pub params: Vec<CallParam>,
    /// Signer (if signed).
    pub signer: Option<AccountId>,
    /// Dispatch outcome.
    pub success: bool,
}

impl RawExtrinsic {
    /// Parameter value by name.
    pub fn param(&self, name: &str) -> Option<&serde_json::Value> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

/// One positional event attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub type_name: String,
    pub value: serde_json::Value,
}

/// Decoded event.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Index in block.
    pub index: u32,
    /// Execution phase, carrying the extrinsic index when applicable.
    pub phase: EventPhase,
    /// Lowercase pallet name.
    pub module_id: String,
    /// Event variant name.
    pub event_id: String,
    /// Ordered attributes.
    pub attributes: Vec<EventAttribute>,
}

impl RawEvent {
    pub fn extrinsic_index(&self) -> Option<u32> {
        self.phase.extrinsic_index()
    }

    /// Attribute value at `position`.
    pub fn attr(&self, position: usize) -> Option<&serde_json::Value> {
        self.attributes.get(position).map(|a| &a.value)
    }
}

/// Consensus pre-digest contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreDigest {
    pub slot_number: u64,
    /// Explicit block author rank (BABE); absent for round-robin engines.
    pub authority_index: Option<u32>,
}

/// Decoded header digest item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusLog {
    PreRuntime { engine: String, digest: PreDigest },
    Seal { engine: String, data: String },
    Consensus { engine: String, data: String },
    RuntimeEnvironmentUpdated,
    Other(String),
    /// The supplier has no decoder for this item.
    Unsupported { kind: String, engine: Option<String> },
}

impl ConsensusLog {
    pub fn kind(&self) -> &str {
        match self {
            Self::PreRuntime { .. } => "PreRuntime",
            Self::Seal { .. } => "Seal",
            Self::Consensus { .. } => "Consensus",
            Self::RuntimeEnvironmentUpdated => "RuntimeEnvironmentUpdated",
            Self::Other(_) => "Other",
            Self::Unsupported { kind, .. } => kind,
        }
    }

    pub fn engine(&self) -> Option<&str> {
        match self {
            Self::PreRuntime { engine, .. }
            | Self::Seal { engine, .. }
            | Self::Consensus { engine, .. } => Some(engine),
            Self::Unsupported { engine, .. } => engine.as_deref(),
            _ => None,
        }
    }
}

/// Header digest item with its position.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub index: u32,
    pub log: ConsensusLog,
}

impl RawBlock {
    /// Extrinsic by block index.
    pub fn extrinsic(&self, index: u32) -> Option<&RawExtrinsic> {
        self.extrinsics.iter().find(|e| e.index == index)
    }

    /// Index of the last event emitted by an extrinsic.
    ///
    /// Extrinsics without events are anchored after the block's events.
    pub fn last_event_of(&self, extrinsic_index: u32) -> u32 {
        self.events
            .iter()
            .filter(|e| e.extrinsic_index() == Some(extrinsic_index))
            .map(|e| e.index)
            .max()
            .unwrap_or(self.events.len() as u32)
    }

    /// Counters derivable from the block shape alone.
    pub fn base_counters(&self) -> BlockCounters {
        let mut c = BlockCounters {
            extrinsics: self.extrinsics.len() as u32,
            events: self.events.len() as u32,
            logs: self.logs.len() as u32,
            ..BlockCounters::default()
        };

        for ext in &self.extrinsics {
            if ext.success {
                c.extrinsics_success += 1;
            } else {
                c.extrinsics_error += 1;
            }
            if ext.signer.is_some() {
                c.extrinsics_signed += 1;
            } else {
                c.extrinsics_unsigned += 1;
            }
        }

        for event in &self.events {
            if event.module_id == "system" {
                c.events_system += 1;
            } else {
                c.events_module += 1;
            }
            match event.phase {
                EventPhase::ApplyExtrinsic(_) => c.events_extrinsic += 1,
                EventPhase::Finalization => c.events_finalization += 1,
                EventPhase::Initialization => {}
            }
        }

        c
    }
}

/// Notification when a new block is finalized.
#[derive(Debug, Clone)]
pub struct FinalizedHead {
    pub number: u64,
    pub hash: BlockHash,
}

/// Stream of finalized heads.
pub type FinalizedHeadStream = Pin<Box<dyn Stream<Item = ChainResult<FinalizedHead>> + Send>>;

/// Port trait for blockchain data source.
///
/// History is reachable through [`BlockSource::block_hash`] and
/// [`BlockSource::block`]; the head subscription only says how far to go.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Get the genesis hash of the connected chain.
    async fn genesis_hash(&self) -> ChainResult<BlockHash>;

    /// Get the current finalized block head.
    async fn finalized_head(&self) -> ChainResult<FinalizedHead>;

    /// Canonical hash at a height, if the chain has one.
    async fn block_hash(&self, number: u64) -> ChainResult<Option<BlockHash>>;

    /// Fetch and decode a block.
    async fn block(&self, hash: &BlockHash) -> ChainResult<RawBlock>;

    /// Subscribe to finalized heads.
    async fn subscribe_finalized_heads(&self) -> ChainResult<FinalizedHeadStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(index: u32, module: &str, phase: EventPhase) -> RawEvent {
        RawEvent {
            index,
            phase,
            module_id: module.into(),
            event_id: "Any".into(),
            attributes: vec![],
        }
    }

    fn extrinsic(index: u32, signed: bool, success: bool) -> RawExtrinsic {
        RawExtrinsic {
            index,
            module_id: "balances".into(),
            call_id: "transfer".into(),
            params: vec![CallParam {
                name: "value".into(),
                type_name: "Balance".into(),
                value: json!(500),
            }],
            signer: signed.then(|| AccountId([1; 32])),
            success,
        }
    }

    fn block() -> RawBlock {
        RawBlock {
            number: 100,
            hash: BlockHash([1; 32]),
            parent_hash: BlockHash([0; 32]),
            spec_version: 1,
            extrinsics: vec![extrinsic(0, false, true), extrinsic(1, true, false)],
            events: vec![
                event(0, "system", EventPhase::ApplyExtrinsic(0)),
                event(1, "balances", EventPhase::ApplyExtrinsic(1)),
                event(2, "system", EventPhase::ApplyExtrinsic(1)),
                event(3, "treasury", EventPhase::Finalization),
            ],
            logs: vec![],
        }
    }

    #[test]
    fn test_base_counters() {
        let c = block().base_counters();
        assert_eq!((c.extrinsics, c.extrinsics_success, c.extrinsics_error), (2, 1, 1));
        assert_eq!((c.extrinsics_signed, c.extrinsics_unsigned), (1, 1));
        assert_eq!((c.events, c.events_system, c.events_module), (4, 2, 2));
        assert_eq!((c.events_extrinsic, c.events_finalization), (3, 1));
    }

    #[test]
    fn test_last_event_anchor() {
        let b = block();
        assert_eq!(b.last_event_of(1), 2);
        assert_eq!(b.last_event_of(0), 0);
        // Sans événement: ancré après le dernier
        assert_eq!(b.last_event_of(9), 4);
    }

    #[test]
    fn test_param_lookup() {
        let ext = extrinsic(0, true, true);
        assert_eq!(ext.param("value"), Some(&json!(500)));
        assert_eq!(ext.param("dest"), None);
    }
}
