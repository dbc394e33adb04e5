//! Consensus log processor.
//!
//! Stores every header digest item and lifts the slot (and, for BABE, the
//! authority index) out of the pre-runtime digest.

use async_trait::async_trait;
use serde_json::json;

use chronicle_core::error::{DomainError, DomainResult};
use chronicle_core::models::{Block, Log};
use chronicle_core::ports::{
    Accumulation, BlockScopedTable, ConsensusLog, Item, Processor, ProcessorContext,
    StateTransaction,
};

pub struct LogProcessor;

impl LogProcessor {
    const NAME: &'static str = "system.logs";
}

fn log_data(log: &ConsensusLog) -> serde_json::Value {
    match log {
        ConsensusLog::PreRuntime { digest, .. } => json!({
            "slot_number": digest.slot_number,
            "authority_index": digest.authority_index,
        }),
        ConsensusLog::Seal { data, .. } | ConsensusLog::Consensus { data, .. } => json!(data),
        ConsensusLog::Other(data) => json!(data),
        ConsensusLog::RuntimeEnvironmentUpdated | ConsensusLog::Unsupported { .. } => {
            serde_json::Value::Null
        }
    }
}

#[async_trait]
impl Processor for LogProcessor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn accumulate(
        &self,
        ctx: &ProcessorContext<'_>,
        item: Item<'_>,
        out: &mut Accumulation,
    ) -> DomainResult<()> {
        let Some(log) = item.log() else {
            return Err(DomainError::mismatch(Self::NAME, "expected a log"));
        };

        match &log.log {
            ConsensusLog::Unsupported { kind, engine } => {
                return Err(DomainError::DecodeGap {
                    block: ctx.raw.number,
                    kind: match engine {
                        Some(engine) => format!("{kind}({engine})"),
                        None => kind.clone(),
                    },
                });
            }
            ConsensusLog::PreRuntime { digest, .. } => {
                out.slot_number = Some(digest.slot_number);
                out.authority_index = digest.authority_index;
            }
            _ => {}
        }

        out.logs.push(Log {
            block_number: ctx.raw.number,
            index: log.index,
            kind: log.log.kind().to_string(),
            engine: log.log.engine().map(str::to_string),
            data: log_data(&log.log),
        });
        Ok(())
    }

    async fn accumulation_revert(
        &self,
        block: &Block,
        tx: &mut dyn StateTransaction,
    ) -> DomainResult<()> {
        tx.delete_created_at(block.number, BlockScopedTable::Logs).await?;
        Ok(())
    }
}
