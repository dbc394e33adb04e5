//! Contracts pallet bundle.

use std::sync::Arc;

use async_trait::async_trait;

use chronicle_core::error::{DomainError, DomainResult};
use chronicle_core::models::{Block, CodeHash, Contract, ContractInstance};
use chronicle_core::ports::{
    Accumulation, BlockScopedTable, Item, Processor, ProcessorContext, StateTransaction,
};
use chronicle_core::value::parse_hash256;

use crate::bundle::{ProcessorBundle, Registration};
use crate::utils::{attr_account, event_of, require_attrs};

fn code_hash(value: Option<&serde_json::Value>) -> Option<CodeHash> {
    value.and_then(parse_hash256).map(CodeHash)
}

/// `CodeStored(code_hash)`; the wasm comes from the `put_code` call.
pub struct CodeStoredProcessor;

impl CodeStoredProcessor {
    const NAME: &'static str = "contracts.CodeStored";
}

#[async_trait]
impl Processor for CodeStoredProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn accumulate(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let event = event_of(Self::NAME, &item)?;
        require_attrs(Self::NAME, event, &[1])?;
        let code_hash = code_hash(event.attr(0))
            .ok_or_else(|| DomainError::mismatch(Self::NAME, "attribute 0 is not a code hash"))?;

        let bytecode = item
            .extrinsic()
            .and_then(|call| call.param("code"))
            .and_then(|code| code.as_str())
            .map(str::to_string);

        out.counters.contracts_new += 1;
        out.contracts.push(Contract {
            code_hash,
            bytecode,
            created_at_block: ctx.raw.number,
            created_at_extrinsic: event.extrinsic_index(),
            created_at_event: event.index,
        });
        Ok(())
    }

    async fn accumulation_revert(
        &self,
        block: &Block,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        tx.delete_created_at(block.number, BlockScopedTable::Contracts)
            .await?;
        Ok(())
    }
}

/// `Instantiated(owner, address)`.
pub struct InstantiatedProcessor;

impl InstantiatedProcessor {
    const NAME: &'static str = "contracts.Instantiated";
}

#[async_trait]
impl Processor for InstantiatedProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn accumulate(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let event = event_of(Self::NAME, &item)?;
        require_attrs(Self::NAME, event, &[2])?;

        out.contract_instances.push(ContractInstance {
            owner: attr_account(Self::NAME, event, 0)?,
            address: attr_account(Self::NAME, event, 1)?,
            code_hash: code_hash(item.extrinsic().and_then(|call| call.param("code_hash"))),
            created_at_block: ctx.raw.number,
            created_at_extrinsic: event.extrinsic_index(),
            created_at_event: event.index,
        });
        Ok(())
    }

    async fn accumulation_revert(
        &self,
        block: &Block,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        tx.delete_created_at(block.number, BlockScopedTable::ContractInstances)
            .await?;
        Ok(())
    }
}

pub struct ContractsBundle;

impl ProcessorBundle for ContractsBundle {
    fn name(&self) -> &'static str {
        "contracts"
    }

    fn processors(&self) -> Vec<Registration> {
        vec![
            Registration::event("contracts", "CodeStored", Arc::new(CodeStoredProcessor)),
            Registration::event("contracts", "Instantiated", Arc::new(InstantiatedProcessor)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::config::RetryConfig;
    use serde_json::json;

    use crate::utils::fixtures::{StaticState, account, context, event, extrinsic, hex_account, raw_block};

    #[tokio::test]
    async fn test_code_stored_and_instantiated() {
        let hash = "0x".to_string() + &"cd".repeat(32);
        let put_code = extrinsic(
            0,
            "contracts",
            "put_code",
            Some(1),
            vec![("gas_limit", json!(1000)), ("code", json!("0x0061736d"))],
        );
        let instantiate = extrinsic(
            1,
            "contracts",
            "instantiate",
            Some(1),
            vec![("code_hash", json!(hash.clone())), ("data", json!("0x"))],
        );
        let raw = raw_block(
            60,
            vec![put_code, instantiate],
            vec![
                event(0, Some(0), "contracts", "CodeStored", vec![json!(hash.clone())]),
                event(1, Some(1), "contracts", "Instantiated", vec![hex_account(1), hex_account(2)]),
            ],
            vec![],
        );
        let chain = StaticState::default();
        let retry = RetryConfig::default();
        let ctx = context(&raw, &chain, &retry);

        let mut out = Accumulation::default();
        CodeStoredProcessor
            .accumulate(
                &ctx,
                Item::Event {
                    event: &raw.events[0],
                    extrinsic: raw.extrinsic(0),
                },
                &mut out,
            )
            .await
            .unwrap();
        InstantiatedProcessor
            .accumulate(
                &ctx,
                Item::Event {
                    event: &raw.events[1],
                    extrinsic: raw.extrinsic(1),
                },
                &mut out,
            )
            .await
            .unwrap();

        assert_eq!(out.counters.contracts_new, 1);
        assert_eq!(out.contracts[0].code_hash, CodeHash([0xcd; 32]));
        assert_eq!(out.contracts[0].bytecode.as_deref(), Some("0x0061736d"));

        let instance = &out.contract_instances[0];
        assert_eq!(instance.owner, account(1));
        assert_eq!(instance.address, account(2));
        assert_eq!(instance.code_hash, Some(CodeHash([0xcd; 32])));
        assert_eq!(instance.created_at_event, 1);
    }
}
