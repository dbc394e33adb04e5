//! Running totals aggregator.
//!
//! `BlockTotal(N) = BlockTotal(N-1) + deltas(N)`: one parent read and one
//! write per block, never a scan of history.

use chrono::{DateTime, Utc};

use crate::error::DomainResult;
use crate::models::{Block, BlockTotal};
use crate::ports::{SequenceContext, StateTransaction};

use super::session::rank_validator;

/// Seconds since the parent block and the parent datetime to record.
///
/// Without both datetimes the block time is zero and the block's own
/// datetime stands in for the parent's.
pub fn blocktime(block: &Block, parent: Option<&Block>) -> (u64, Option<DateTime<Utc>>) {
    match (block.datetime, parent.and_then(|p| p.datetime)) {
        (Some(now), Some(prev)) => ((now - prev).num_seconds().max(0) as u64, Some(prev)),
        _ => (0, block.datetime),
    }
}

/// Session of a block: the parent's, advanced when the parent opened one.
pub fn session_id(parent: Option<&Block>, parent_total: Option<&BlockTotal>) -> u64 {
    let base = parent_total.map(|t| t.session_id).unwrap_or(0);
    match parent {
        Some(p) if p.counters.sessions_new > 0 => base + 1,
        _ => base,
    }
}

/// Compute this block's aggregate, including its author.
pub async fn compute_block_total(
    ctx: &SequenceContext<'_>,
    tx: &mut dyn StateTransaction,
) -> DomainResult<BlockTotal> {
    let block = ctx.block;
    let (blocktime, parent_datetime) = blocktime(block, ctx.parent);
    let session_id = session_id(ctx.parent, ctx.parent_total);

    let totals = ctx
        .parent_total
        .map(|t| t.totals)
        .unwrap_or_default()
        .advance(&block.counters, blocktime);

    let validator_count = if block.authority_index.is_none() && block.slot_number.is_some() {
        tx.count_session_validators(session_id).await?
    } else {
        0
    };

    let author = match rank_validator(block.slot_number, block.authority_index, validator_count) {
        Some(rank) => tx
            .session_validator(session_id, rank)
            .await?
            .map(|v| v.validator_stash),
        None => None,
    };

    Ok(BlockTotal {
        number: block.number,
        session_id,
        author,
        blocktime,
        parent_datetime,
        totals,
    })
}
