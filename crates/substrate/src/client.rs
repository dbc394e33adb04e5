//! Substrate RPC client with dynamic metadata decoding.

use async_trait::async_trait;
use futures::StreamExt;
use subxt::backend::legacy::LegacyRpcMethods;
use subxt::backend::rpc::RpcClient;
use subxt::blocks::Block;
use subxt::config::substrate::DigestItem;
use subxt::utils::H256;
use subxt::{OnlineClient, PolkadotConfig};
use tracing::{debug, instrument, trace};

use chronicle_core::error::{ChainError, ChainResult};
use chronicle_core::models::{AccountId, BlockHash, EventPhase};
use chronicle_core::ports::{
    BlockSource, CallParam, ChainState, ConsensusLog, EventAttribute, FinalizedHead,
    FinalizedHeadStream, PreDigest, RawBlock, RawEvent, RawExtrinsic, RawLog,
};

use crate::convert::{composite_fields, key_to_value, value_to_json};

/// Configuration for the Substrate client.
#[derive(Debug, Clone)]
pub struct SubstrateClientConfig {
    /// WebSocket URL (e.g., "ws://localhost:9944").
    pub ws_url: String,
}

pub type SubstrateBlock = Block<PolkadotConfig, OnlineClient<PolkadotConfig>>;

impl Default for SubstrateClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:9944".to_string(),
        }
    }
}

/// Substrate client adapter implementing the BlockSource and ChainState ports.
///
/// Uses the legacy RPC backend: the pipeline walks history by height, which
/// the chainHead backend cannot serve once blocks are unpinned.
pub struct SubstrateClient {
    client: OnlineClient<PolkadotConfig>,
    rpc: LegacyRpcMethods<PolkadotConfig>,
}

impl SubstrateClient {
    /// Connect to a Substrate node.
    #[instrument(skip_all, fields(url = %config.ws_url))]
    pub async fn connect(config: SubstrateClientConfig) -> ChainResult<Self> {
        debug!("Connecting to node");

        let rpc_client = RpcClient::from_url(&config.ws_url)
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;
        let client = OnlineClient::<PolkadotConfig>::from_rpc_client(rpc_client.clone())
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;
        let rpc = LegacyRpcMethods::<PolkadotConfig>::new(rpc_client);

        debug!(
            spec_version = client.runtime_version().spec_version,
            "Connected successfully"
        );

        Ok(Self { client, rpc })
    }
}

#[async_trait]
impl BlockSource for SubstrateClient {
    async fn genesis_hash(&self) -> ChainResult<BlockHash> {
        Ok(BlockHash(self.client.genesis_hash().0))
    }

    async fn finalized_head(&self) -> ChainResult<FinalizedHead> {
        let head = self
            .client
            .blocks()
            .at_latest()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        Ok(FinalizedHead {
            number: head.number() as u64,
            hash: BlockHash(head.hash().0),
        })
    }

    async fn block_hash(&self, number: u64) -> ChainResult<Option<BlockHash>> {
        let hash = self
            .rpc
            .chain_get_block_hash(Some(number.into()))
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        Ok(hash.map(|h| BlockHash(h.0)))
    }

    #[instrument(skip(self), fields(hash = %hash.short()))]
    async fn block(&self, hash: &BlockHash) -> ChainResult<RawBlock> {
        let at = H256::from(hash.0);
        let block = self
            .client
            .blocks()
            .at(at)
            .await
            .map_err(|e| ChainError::BlockFetchError {
                hash: hash.to_hex(),
                message: e.to_string(),
            })?;

        let spec_version = self
            .rpc
            .state_get_runtime_version(Some(at))
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?
            .spec_version;

        let events = decode_events(&block).await?;
        let extrinsics = decode_extrinsics(&block, &events).await?;
        let logs = block
            .header()
            .digest
            .logs
            .iter()
            .enumerate()
            .map(|(index, item)| RawLog {
                index: index as u32,
                log: decode_digest_item(item),
            })
            .collect();

        trace!(
            number = block.number(),
            extrinsics = extrinsics.len(),
            events = events.len(),
            "Block decoded"
        );

        Ok(RawBlock {
            number: block.number() as u64,
            hash: hash.clone(),
            parent_hash: BlockHash(block.header().parent_hash.0),
            spec_version,
            extrinsics,
            events,
            logs,
        })
    }

    async fn subscribe_finalized_heads(&self) -> ChainResult<FinalizedHeadStream> {
        let subscription = self
            .client
            .blocks()
            .subscribe_finalized()
            .await
            .map_err(|e| ChainError::SubscriptionError(e.to_string()))?;

        let stream = subscription.map(|result| {
            result
                .map(|block| FinalizedHead {
                    number: block.number() as u64,
                    hash: BlockHash(block.hash().0),
                })
                .map_err(|e| ChainError::SubscriptionError(e.to_string()))
        });

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl ChainState for SubstrateClient {
    async fn storage(
        &self,
        at: &BlockHash,
        pallet: &str,
        entry: &str,
        keys: &[serde_json::Value],
    ) -> ChainResult<Option<serde_json::Value>> {
        let keys = keys
            .iter()
            .map(key_to_value)
            .collect::<ChainResult<Vec<_>>>()?;
        let address = subxt::dynamic::storage(pallet, entry, keys);

        match self
            .client
            .storage()
            .at(H256::from(at.0))
            .fetch(&address)
            .await
        {
            Ok(Some(thunk)) => {
                let value = thunk
                    .to_value()
                    .map_err(|e| ChainError::MetadataError(e.to_string()))?;
                Ok(Some(value_to_json(&value)))
            }
            Ok(None) => Ok(None),
            Err(subxt::Error::Metadata(_)) => Err(ChainError::StorageFunctionMissing {
                pallet: pallet.to_string(),
                entry: entry.to_string(),
            }),
            Err(e) => Err(ChainError::RpcError(e.to_string())),
        }
    }
}

// =============================================================================
// Block decoding helpers
// =============================================================================

/// Decode events from a block.
///
/// An event that does not decode against the metadata is fatal: skipping it
/// would shift every later event index.
async fn decode_events(block: &SubstrateBlock) -> ChainResult<Vec<RawEvent>> {
    let events = block
        .events()
        .await
        .map_err(|e| ChainError::RpcError(e.to_string()))?;

    let mut raw_events = Vec::new();

    for (index, event) in events.iter().enumerate() {
        let ev = event.map_err(|e| {
            ChainError::MetadataError(format!("event {} of block {}: {}", index, block.number(), e))
        })?;

        let type_names: Vec<String> = ev
            .event_metadata()
            .variant
            .fields
            .iter()
            .map(|f| f.type_name.clone().unwrap_or_default())
            .collect();

        let values = ev
            .field_values()
            .map_err(|e| ChainError::MetadataError(e.to_string()))?;

        let attributes = composite_fields(&values)
            .into_iter()
            .enumerate()
            .map(|(i, (_, value))| EventAttribute {
                type_name: type_names.get(i).cloned().unwrap_or_default(),
                value,
            })
            .collect();

        let phase = match ev.phase() {
            subxt::events::Phase::ApplyExtrinsic(idx) => EventPhase::ApplyExtrinsic(idx),
            subxt::events::Phase::Finalization => EventPhase::Finalization,
            subxt::events::Phase::Initialization => EventPhase::Initialization,
        };

        raw_events.push(RawEvent {
            index: index as u32,
            phase,
            module_id: ev.pallet_name().to_lowercase(),
            event_id: ev.variant_name().to_string(),
            attributes,
        });
    }

    Ok(raw_events)
}

/// Decode extrinsics from a block.
async fn decode_extrinsics(
    block: &SubstrateBlock,
    events: &[RawEvent],
) -> ChainResult<Vec<RawExtrinsic>> {
    let extrinsics = block
        .extrinsics()
        .await
        .map_err(|e| ChainError::RpcError(e.to_string()))?;

    let mut raw_extrinsics = Vec::new();

    for (index, ext) in extrinsics.iter().enumerate() {
        let index = index as u32;
        let metadata = ext.extrinsic_metadata().map_err(|e| {
            ChainError::MetadataError(format!("extrinsic {} of block {}: {}", index, block.number(), e))
        })?;

        let type_names: Vec<String> = metadata
            .variant
            .fields
            .iter()
            .map(|f| f.type_name.clone().unwrap_or_default())
            .collect();

        let values = ext
            .field_values()
            .map_err(|e| ChainError::MetadataError(e.to_string()))?;

        let params = composite_fields(&values)
            .into_iter()
            .enumerate()
            .map(|(i, (name, value))| CallParam {
                name: name.unwrap_or_else(|| i.to_string()),
                type_name: type_names.get(i).cloned().unwrap_or_default(),
                value,
            })
            .collect();

        raw_extrinsics.push(RawExtrinsic {
            index,
            module_id: metadata.pallet.name().to_lowercase(),
            call_id: metadata.variant.name.clone(),
            params,
            signer: ext.address_bytes().and_then(signer_from_address),
            success: extrinsic_succeeded(events, index),
        });
    }

    Ok(raw_extrinsics)
}

/// Signer account from `MultiAddress::Id` or a bare 32-byte address.
fn signer_from_address(bytes: &[u8]) -> Option<AccountId> {
    let raw = match bytes {
        [0, rest @ ..] if rest.len() == 32 => rest,
        all if all.len() == 32 => all,
        other => {
            trace!(len = other.len(), "Unsupported signer address");
            return None;
        }
    };
    raw.try_into().ok().map(AccountId)
}

/// Dispatch outcome from the `System.ExtrinsicSuccess`/`ExtrinsicFailed` event.
fn extrinsic_succeeded(events: &[RawEvent], ext_index: u32) -> bool {
    !events.iter().any(|ev| {
        ev.extrinsic_index() == Some(ext_index)
            && ev.module_id == "system"
            && ev.event_id == "ExtrinsicFailed"
    })
}

// =============================================================================
// Digest decoding
// =============================================================================

const BABE_ENGINE: [u8; 4] = *b"BABE";
const AURA_ENGINE: [u8; 4] = *b"aura";

fn engine_name(id: &[u8; 4]) -> String {
    String::from_utf8_lossy(id).into_owned()
}

fn decode_digest_item(item: &DigestItem) -> ConsensusLog {
    match item {
        DigestItem::PreRuntime(engine, data) => decode_pre_runtime(engine, data),
        DigestItem::Seal(engine, data) => ConsensusLog::Seal {
            engine: engine_name(engine),
            data: format!("0x{}", hex::encode(data)),
        },
        DigestItem::Consensus(engine, data) => ConsensusLog::Consensus {
            engine: engine_name(engine),
            data: format!("0x{}", hex::encode(data)),
        },
        DigestItem::Other(data) => ConsensusLog::Other(format!("0x{}", hex::encode(data))),
        DigestItem::RuntimeEnvironmentUpdated => ConsensusLog::RuntimeEnvironmentUpdated,
    }
}

/// Decode a pre-runtime digest for the engines we know.
///
/// BABE: `[variant: u8][authority_index: u32][slot: u64]..` for the primary,
/// secondary-plain and secondary-VRF variants. Aura: `[slot: u64]`.
fn decode_pre_runtime(engine: &[u8; 4], data: &[u8]) -> ConsensusLog {
    let digest = match *engine {
        BABE_ENGINE => babe_pre_digest(data),
        AURA_ENGINE => aura_pre_digest(data),
        _ => None,
    };

    match digest {
        Some(digest) => ConsensusLog::PreRuntime {
            engine: engine_name(engine),
            digest,
        },
        None => ConsensusLog::Unsupported {
            kind: "PreRuntime".to_string(),
            engine: Some(engine_name(engine)),
        },
    }
}

fn babe_pre_digest(data: &[u8]) -> Option<PreDigest> {
    let (variant, rest) = data.split_first()?;
    if !(1..=3).contains(variant) {
        return None;
    }
    let authority_index = u32::from_le_bytes(rest.get(0..4)?.try_into().ok()?);
    let slot_number = u64::from_le_bytes(rest.get(4..12)?.try_into().ok()?);
    Some(PreDigest {
        slot_number,
        authority_index: Some(authority_index),
    })
}

fn aura_pre_digest(data: &[u8]) -> Option<PreDigest> {
    let slot_number = u64::from_le_bytes(data.get(0..8)?.try_into().ok()?);
    Some(PreDigest {
        slot_number,
        authority_index: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn babe(variant: u8, authority: u32, slot: u64) -> Vec<u8> {
        let mut data = vec![variant];
        data.extend_from_slice(&authority.to_le_bytes());
        data.extend_from_slice(&slot.to_le_bytes());
        data.extend_from_slice(&[0u8; 64]);
        data
    }

    #[test]
    fn test_babe_primary_pre_digest() {
        let log = decode_pre_runtime(&BABE_ENGINE, &babe(1, 7, 281_474_976));
        assert_eq!(
            log,
            ConsensusLog::PreRuntime {
                engine: "BABE".into(),
                digest: PreDigest {
                    slot_number: 281_474_976,
                    authority_index: Some(7),
                },
            }
        );
    }

    #[test]
    fn test_babe_secondary_plain_pre_digest() {
        let mut data = vec![2u8];
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&42u64.to_le_bytes());
        let ConsensusLog::PreRuntime { digest, .. } = decode_pre_runtime(&BABE_ENGINE, &data) else {
            panic!("expected a pre-runtime log");
        };
        assert_eq!(digest.authority_index, Some(3));
        assert_eq!(digest.slot_number, 42);
    }

    #[test]
    fn test_aura_pre_digest_has_no_authority() {
        let log = decode_pre_runtime(&AURA_ENGINE, &99u64.to_le_bytes());
        assert_eq!(
            log,
            ConsensusLog::PreRuntime {
                engine: "aura".into(),
                digest: PreDigest {
                    slot_number: 99,
                    authority_index: None,
                },
            }
        );
    }

    // Test critique: un moteur inconnu ou tronqué devient un trou de décodage
    #[test]
    fn test_unknown_or_truncated_pre_digest_is_unsupported() {
        let unknown = decode_pre_runtime(b"pow_", &[1, 2, 3]);
        assert_eq!(
            unknown,
            ConsensusLog::Unsupported {
                kind: "PreRuntime".into(),
                engine: Some("pow_".into()),
            }
        );

        let truncated = decode_pre_runtime(&BABE_ENGINE, &[1, 0, 0]);
        assert!(matches!(truncated, ConsensusLog::Unsupported { .. }));

        let bad_variant = decode_pre_runtime(&BABE_ENGINE, &babe(9, 1, 1));
        assert!(matches!(bad_variant, ConsensusLog::Unsupported { .. }));
    }

    #[test]
    fn test_seal_is_hex_encoded() {
        let log = decode_digest_item(&DigestItem::Seal(*b"BABE", vec![0xde, 0xad]));
        assert_eq!(
            log,
            ConsensusLog::Seal {
                engine: "BABE".into(),
                data: "0xdead".into(),
            }
        );
    }

    #[test]
    fn test_signer_from_multi_address() {
        let mut id = vec![0u8];
        id.extend_from_slice(&[5u8; 32]);
        assert_eq!(signer_from_address(&id), Some(AccountId([5; 32])));
        assert_eq!(signer_from_address(&[5u8; 32]), Some(AccountId([5; 32])));
        assert_eq!(signer_from_address(&[1u8; 20]), None);
    }

    #[test]
    fn test_extrinsic_failure_from_events() {
        let event = |index, ext, id: &str| RawEvent {
            index,
            phase: EventPhase::ApplyExtrinsic(ext),
            module_id: "system".into(),
            event_id: id.into(),
            attributes: vec![],
        };
        let events = vec![
            event(0, 0, "ExtrinsicSuccess"),
            event(1, 1, "ExtrinsicFailed"),
        ];
        assert!(extrinsic_succeeded(&events, 0));
        assert!(!extrinsic_succeeded(&events, 1));
    }
}
