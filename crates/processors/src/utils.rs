//! Shared requirement checks for processors.
//!
//! Every helper returns [`DomainError::RequirementMismatch`] when the item
//! does not have the expected shape, so the pipeline skips the processor
//! for that item instead of aborting the block.

use chronicle_core::error::{DomainError, DomainResult};
use chronicle_core::models::{AccountId, SearchIndex, SearchIndexType};
use chronicle_core::ports::{Item, RawEvent, RawExtrinsic};
use chronicle_core::services::entry_for;
use chronicle_core::value::{parse_account, parse_amount, parse_u64};

// =============================================================================
// Item access
// =============================================================================

/// The event an event processor was invoked for.
pub fn event_of<'a>(processor: &'static str, item: &Item<'a>) -> DomainResult<&'a RawEvent> {
    item.event()
        .ok_or_else(|| DomainError::mismatch(processor, "expected an event"))
}

/// The extrinsic an extrinsic processor was invoked for.
pub fn extrinsic_of<'a>(
    processor: &'static str,
    item: &Item<'a>,
) -> DomainResult<&'a RawExtrinsic> {
    match item {
        Item::Extrinsic(ext) => Ok(ext),
        _ => Err(DomainError::mismatch(processor, "expected an extrinsic")),
    }
}

/// The call that emitted an event.
pub fn emitting_call<'a>(
    processor: &'static str,
    item: &Item<'a>,
) -> DomainResult<&'a RawExtrinsic> {
    item.extrinsic()
        .ok_or_else(|| DomainError::mismatch(processor, "event has no emitting extrinsic"))
}

// =============================================================================
// Event attributes
// =============================================================================

/// Require one of the given attribute counts.
pub fn require_attrs(
    processor: &'static str,
    event: &RawEvent,
    accepted: &[usize],
) -> DomainResult<()> {
    if accepted.contains(&event.attributes.len()) {
        return Ok(());
    }
    Err(DomainError::mismatch(
        processor,
        format!(
            "{} attributes, expected {:?}",
            event.attributes.len(),
            accepted
        ),
    ))
}

fn attr<T>(
    processor: &'static str,
    event: &RawEvent,
    position: usize,
    what: &str,
    parser: fn(&serde_json::Value) -> Option<T>,
) -> DomainResult<T> {
    event.attr(position).and_then(parser).ok_or_else(|| {
        DomainError::mismatch(processor, format!("attribute {position} is not {what}"))
    })
}

pub fn attr_account(
    processor: &'static str,
    event: &RawEvent,
    position: usize,
) -> DomainResult<AccountId> {
    attr(processor, event, position, "an account", parse_account)
}

pub fn attr_amount(processor: &'static str, event: &RawEvent, position: usize) -> DomainResult<u128> {
    attr(processor, event, position, "an amount", parse_amount)
}

pub fn attr_u64(processor: &'static str, event: &RawEvent, position: usize) -> DomainResult<u64> {
    attr(processor, event, position, "an integer", parse_u64)
}

// =============================================================================
// Call parameters
// =============================================================================

pub fn signer_of(processor: &'static str, ext: &RawExtrinsic) -> DomainResult<AccountId> {
    ext.signer
        .clone()
        .ok_or_else(|| DomainError::mismatch(processor, "extrinsic is unsigned"))
}

pub fn param_of<'a>(
    processor: &'static str,
    ext: &'a RawExtrinsic,
    name: &str,
) -> DomainResult<&'a serde_json::Value> {
    ext.param(name)
        .ok_or_else(|| DomainError::mismatch(processor, format!("missing parameter '{name}'")))
}

pub fn param_account(
    processor: &'static str,
    ext: &RawExtrinsic,
    name: &str,
) -> DomainResult<AccountId> {
    parse_account(param_of(processor, ext, name)?).ok_or_else(|| {
        DomainError::mismatch(processor, format!("parameter '{name}' is not an account"))
    })
}

// =============================================================================
// Search entries
// =============================================================================

/// Push a search entry for the item.
pub fn push_entry(
    out: &mut Vec<SearchIndex>,
    block_number: u64,
    item: &Item<'_>,
    account: AccountId,
    index_type: SearchIndexType,
    sorting_value: Option<u128>,
) {
    out.push(entry_for(block_number, item, account, index_type, sorting_value));
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Builders for decoded items used across processor tests.

    use std::collections::HashMap;

    use async_trait::async_trait;

    use chronicle_core::address::Ss58Codec;
    use chronicle_core::config::{RetryConfig, RuntimeProfile, SessionLookup};
    use chronicle_core::error::ChainResult;
    use chronicle_core::models::{AccountId, BlockHash, EventPhase};
    use chronicle_core::ports::{
        CallParam, ChainState, EventAttribute, ProcessorContext, RawBlock, RawEvent, RawExtrinsic,
        RawLog,
    };

    /// Chain state answering from a fixed table.
    #[derive(Default)]
    pub struct StaticState {
        values: HashMap<String, serde_json::Value>,
    }

    impl StaticState {
        fn key(pallet: &str, entry: &str, keys: &[serde_json::Value]) -> String {
            format!("{pallet}.{entry}{}", serde_json::Value::Array(keys.to_vec()))
        }

        pub fn with(
            mut self,
            pallet: &str,
            entry: &str,
            keys: &[serde_json::Value],
            value: serde_json::Value,
        ) -> Self {
            self.values.insert(Self::key(pallet, entry, keys), value);
            self
        }
    }

    #[async_trait]
    impl ChainState for StaticState {
        async fn storage(
            &self,
            _at: &BlockHash,
            pallet: &str,
            entry: &str,
            keys: &[serde_json::Value],
        ) -> ChainResult<Option<serde_json::Value>> {
            Ok(self.values.get(&Self::key(pallet, entry, keys)).cloned())
        }
    }

    pub fn raw_block(
        number: u64,
        extrinsics: Vec<RawExtrinsic>,
        events: Vec<RawEvent>,
        logs: Vec<RawLog>,
    ) -> RawBlock {
        RawBlock {
            number,
            hash: BlockHash([number as u8; 32]),
            parent_hash: BlockHash([number.saturating_sub(1) as u8; 32]),
            spec_version: 1,
            extrinsics,
            events,
            logs,
        }
    }

    pub fn context<'a>(
        raw: &'a RawBlock,
        chain: &'a dyn ChainState,
        retry: &'a RetryConfig,
    ) -> ProcessorContext<'a> {
        ProcessorContext {
            raw,
            runtime: RuntimeProfile {
                spec_version: raw.spec_version,
                session_lookup: SessionLookup::Current,
            },
            codec: Ss58Codec::new(42).unwrap(),
            chain,
            retry,
        }
    }

    pub fn account(byte: u8) -> AccountId {
        AccountId([byte; 32])
    }

    pub fn hex_account(byte: u8) -> serde_json::Value {
        serde_json::Value::String(account(byte).to_hex())
    }

    pub fn event(
        index: u32,
        extrinsic: Option<u32>,
        module_id: &str,
        event_id: &str,
        attributes: Vec<serde_json::Value>,
    ) -> RawEvent {
        RawEvent {
            index,
            phase: match extrinsic {
                Some(idx) => EventPhase::ApplyExtrinsic(idx),
                None => EventPhase::Finalization,
            },
            module_id: module_id.to_string(),
            event_id: event_id.to_string(),
            attributes: attributes
                .into_iter()
                .map(|value| EventAttribute {
                    type_name: String::new(),
                    value,
                })
                .collect(),
        }
    }

    pub fn extrinsic(
        index: u32,
        module_id: &str,
        call_id: &str,
        signer: Option<u8>,
        params: Vec<(&str, serde_json::Value)>,
    ) -> RawExtrinsic {
        RawExtrinsic {
            index,
            module_id: module_id.to_string(),
            call_id: call_id.to_string(),
            params: params
                .into_iter()
                .map(|(name, value)| CallParam {
                    name: name.to_string(),
                    type_name: String::new(),
                    value,
                })
                .collect(),
            signer: signer.map(account),
            success: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_count_check() {
        let transfer = event(0, Some(1), "balances", "Transfer", vec![json!(1), json!(2)]);
        assert!(require_attrs("balances.Transfer", &transfer, &[2, 3]).is_ok());

        let err = require_attrs("balances.Transfer", &transfer, &[3]).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("balances.Transfer"));
    }

    // Test critique: un attribut mal formé est un mismatch, pas une erreur fatale
    #[test]
    fn test_bad_attribute_is_recoverable() {
        let e = event(0, None, "system", "NewAccount", vec![json!("0x1234")]);
        let err = attr_account("system.NewAccount", &e, 0).unwrap_err();
        assert!(err.is_recoverable());

        let ok = event(0, None, "system", "NewAccount", vec![hex_account(7)]);
        assert_eq!(attr_account("system.NewAccount", &ok, 0).unwrap(), account(7));
    }

    #[test]
    fn test_item_kind_checks() {
        let ext = extrinsic(2, "sudo", "set_key", Some(1), vec![("new", hex_account(9))]);
        let item = Item::Extrinsic(&ext);
        assert!(event_of("x", &item).is_err());
        assert_eq!(extrinsic_of("x", &item).unwrap().index, 2);
        assert_eq!(param_account("x", &ext, "new").unwrap(), account(9));
        assert!(param_of("x", &ext, "who").is_err());
    }

    #[test]
    fn test_unsigned_extrinsic_has_no_signer() {
        let ext = extrinsic(0, "timestamp", "set", None, vec![]);
        assert!(signer_of("timestamp.set", &ext).is_err());
    }
}
