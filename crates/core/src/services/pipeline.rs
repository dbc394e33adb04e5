//! Block pipeline - accumulates, sequences, commits and reverts blocks.
//!
//! Each block goes `Decoded -> Accumulated -> Sequenced -> Committed`.
//! Accumulation depends only on the block itself, so several blocks are
//! accumulated ahead of the writer. Sequencing and commit happen one block
//! at a time, in chain order, inside a single storage transaction.
//!
//! Reorgs are detected when a block's parent hash differs from the stored
//! block below it. The pipeline then walks back to the fork point, reverts
//! every block above it from the top down and resumes forward.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::address::Ss58Codec;
use crate::config::{PipelineConfig, RuntimeProfile};
use crate::error::{ChainError, DomainError, IndexerError, IndexerResult};
use crate::metrics::{
    ProcessingTimer, record_block_committed, record_blocks_reverted, record_decode_gap,
    record_reorg_detected, record_requirement_mismatch,
};
use crate::models::{AuditEntry, Block, BlockHash, Event, Extrinsic, IndexerCursor};
use crate::ports::{
    Accumulation, BlockScopedTable, BlockSource, ChainState, Item, Processor, ProcessorContext,
    ProcessorKind, ProcessorRegistry, RawBlock, RawEvent, RawExtrinsic, Repositories,
    SequenceContext, StateTransaction, WILDCARD, dedup_processors,
};
use crate::retry::with_retry;

use super::reconciler::Reconciler;
use super::search::{SearchIndexBuilder, referenced_accounts};
use super::totals::compute_block_total;

/// A block whose accumulation phase is complete.
#[derive(Debug, Clone)]
pub struct AccumulatedBlock {
    pub raw: RawBlock,
    pub runtime: RuntimeProfile,
    pub accumulation: Accumulation,
    /// Audit records numbered in ledger order.
    pub audits: Vec<AuditEntry>,
}

/// What happened to a block handed to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Committed,
    /// Blocks above the fork point were reverted; forward sync restarts.
    Reorganized { fork_point: u64 },
}

/// The block pipeline.
///
/// `S` is the chain client: it supplies decoded blocks and answers runtime
/// storage queries at a block hash.
pub struct BlockPipeline<S: BlockSource + ChainState, R: Repositories> {
    config: PipelineConfig,
    codec: Ss58Codec,
    search: SearchIndexBuilder,
    reconciler: Reconciler,
    source: Arc<S>,
    repositories: Arc<R>,
    registry: Arc<ProcessorRegistry>,
}

impl<S: BlockSource + ChainState, R: Repositories> BlockPipeline<S, R> {
    pub fn new(
        config: PipelineConfig,
        source: Arc<S>,
        repositories: Arc<R>,
        registry: Arc<ProcessorRegistry>,
    ) -> IndexerResult<Self> {
        config.validate()?;
        let codec = config.codec()?;
        Ok(Self {
            search: SearchIndexBuilder::new(config.search_index.clone()),
            reconciler: Reconciler::new(codec, config.max_reorg_depth),
            codec,
            config,
            source,
            repositories,
            registry,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // =========================================================================
    // Follow loop
    // =========================================================================

    /// Start the indexer.
    ///
    /// Catches up from the cursor, then follows finalized heads until
    /// shutdown or a fatal error.
    #[instrument(skip_all, fields(chain = %&self.config.chain_id[..16.min(self.config.chain_id.len())]))]
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> IndexerResult<()> {
        info!("⛓️  Starting indexer");

        self.verify_chain_id().await?;

        let head = with_retry(&self.config.retry, "finalized_head", || {
            self.source.finalized_head()
        })
        .await?;
        debug!(head = head.number, "Chain head detected");

        self.follow_finalized(&mut shutdown_rx).await
    }

    /// Verify the connected chain matches any existing indexed data.
    async fn verify_chain_id(&self) -> IndexerResult<()> {
        let existing_cursor = self.repositories.cursor().get_any_cursor().await?;

        if let Some(cursor) = existing_cursor {
            if cursor.chain_id != self.config.chain_id {
                let connected_short = &self.config.chain_id[..16.min(self.config.chain_id.len())];
                let expected_short = &cursor.chain_id[..16.min(cursor.chain_id.len())];

                error!(
                    connected = connected_short,
                    expected = expected_short,
                    "❌ Chain mismatch! Database contains data from a different chain"
                );
                error!(
                    "   Manual action required: either connect to the correct chain or purge the database"
                );

                return Err(IndexerError::ChainMismatch {
                    connected: self.config.chain_id.clone(),
                    expected: cursor.chain_id,
                });
            }
            debug!("Chain ID verified");
        }

        Ok(())
    }

    /// Verify the stored cursor against the stored blocks.
    ///
    /// A cursor whose hash disagrees with the stored block at its height
    /// causes that block to be reverted before resuming.
    #[instrument(skip(self))]
    async fn verify_consistency_on_reconnect(&self) -> IndexerResult<Option<u64>> {
        let cursor = self
            .repositories
            .cursor()
            .get_cursor(&self.config.chain_id)
            .await?;

        let Some(cursor) = cursor else {
            debug!("No cursor found, starting fresh");
            return Ok(None);
        };

        debug!(block = cursor.last_indexed_block, "Verifying cursor consistency");

        let stored_block = self
            .repositories
            .blocks()
            .get_block(cursor.last_indexed_block)
            .await?;

        match stored_block {
            Some(block) if block.hash != cursor.last_indexed_hash => {
                warn!(
                    block = cursor.last_indexed_block,
                    cursor_hash = %cursor.last_indexed_hash.short(),
                    stored_hash = %block.hash.short(),
                    "⚠️  Cursor hash mismatch, reverting block"
                );
                self.revert(block.number).await?;
                Ok(block.number.checked_sub(1))
            }
            Some(_) => {
                debug!(block = cursor.last_indexed_block, "Cursor verified, resuming");
                Ok(Some(cursor.last_indexed_block))
            }
            // Everything from the start block up was reverted.
            None if cursor.last_indexed_block < self.config.start_block => {
                Ok(Some(cursor.last_indexed_block))
            }
            None => {
                error!(
                    block = cursor.last_indexed_block,
                    "❌ Cursor points to missing block"
                );
                error!("   Manual action required: purge the database and re-index");
                Err(IndexerError::Internal(format!(
                    "cursor points to missing block {}",
                    cursor.last_indexed_block
                )))
            }
        }
    }

    /// Follow finalized heads via subscription, syncing up to each head.
    #[instrument(skip_all)]
    async fn follow_finalized(&self, shutdown_rx: &mut watch::Receiver<bool>) -> IndexerResult<()> {
        let initial_delay = self.config.retry.initial_interval;
        let max_delay = self.config.retry.max_interval;
        let mut retry_delay = initial_delay;

        loop {
            if *shutdown_rx.borrow() {
                debug!("Shutdown requested");
                return Err(IndexerError::ShutdownRequested);
            }

            match self.source.subscribe_finalized_heads().await {
                Ok(mut stream) => {
                    debug!("📡 Subscription established");
                    retry_delay = initial_delay;
                    let last_indexed = self.verify_consistency_on_reconnect().await?;
                    trace!(?last_indexed, "Resuming");

                    while let Some(result) = stream.next().await {
                        if *shutdown_rx.borrow() {
                            debug!("Shutdown requested");
                            return Err(IndexerError::ShutdownRequested);
                        }

                        match result {
                            Ok(head) => {
                                self.sync_to(head.number, shutdown_rx).await?;
                            }
                            Err(e) => {
                                warn!(error = ?e, "⚠️  Subscription error, reconnecting...");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        error = ?e,
                        retry_in_ms = retry_delay.as_millis(),
                        "⚠️  Failed to subscribe, retrying..."
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(retry_delay) => {
                    debug!(retry_delay_ms = retry_delay.as_millis(), "🔄 Reconnecting to chain...");
                    retry_delay = (retry_delay * 2).min(max_delay);
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return Err(IndexerError::ShutdownRequested);
                    }
                }
            }
        }
    }

    // =========================================================================
    // Forward sync
    // =========================================================================

    /// First height that still needs indexing.
    async fn next_height(&self) -> IndexerResult<u64> {
        let cursor = self
            .repositories
            .cursor()
            .get_cursor(&self.config.chain_id)
            .await?;
        Ok(cursor
            .map(|c| c.last_indexed_block + 1)
            .unwrap_or(self.config.start_block))
    }

    /// Index every canonical block up to and including `target`.
    ///
    /// Up to `lookahead` blocks are accumulated concurrently while the
    /// writer commits in order. After a reorg, in-flight accumulations are
    /// dropped and sync restarts above the fork point.
    pub async fn sync_to(&self, target: u64, shutdown_rx: &watch::Receiver<bool>) -> IndexerResult<()> {
        'sync: loop {
            let from = self.next_height().await?;
            if from > target {
                trace!(target, "Already synced");
                return Ok(());
            }
            debug!(from, to = target, "Syncing blocks");

            let mut stream = std::pin::pin!(
                futures::stream::iter(from..=target)
                    .map(|number| self.fetch_and_accumulate(number))
                    .buffered(self.config.lookahead)
            );

            while let Some(accumulated) = stream.next().await {
                if *shutdown_rx.borrow() {
                    debug!("Shutdown requested");
                    return Err(IndexerError::ShutdownRequested);
                }

                match self.process(accumulated?).await? {
                    Step::Committed => {}
                    Step::Reorganized { fork_point } => {
                        debug!(fork_point, "Restarting sync above fork point");
                        continue 'sync;
                    }
                }
            }
            return Ok(());
        }
    }

    async fn canonical_hash(&self, number: u64) -> IndexerResult<Option<BlockHash>> {
        let operation = format!("block_hash({number})");
        Ok(with_retry(&self.config.retry, &operation, || self.source.block_hash(number)).await?)
    }

    async fn fetch_and_accumulate(&self, number: u64) -> IndexerResult<AccumulatedBlock> {
        let hash = self
            .canonical_hash(number)
            .await?
            .ok_or(ChainError::BlockNotFound(number))?;

        let operation = format!("block({number})");
        let raw = with_retry(&self.config.retry, &operation, || self.source.block(&hash)).await?;
        self.accumulate(raw).await
    }

    /// Check the parent link, then commit or handle the reorg.
    async fn process(&self, accumulated: AccumulatedBlock) -> IndexerResult<Step> {
        let number = accumulated.raw.number;

        if number != self.config.start_block
            && let Some(previous) = number.checked_sub(1)
        {
            match self.repositories.blocks().get_block(previous).await? {
                Some(stored) if stored.hash == accumulated.raw.parent_hash => {}
                Some(stored) => {
                    warn!(
                        block = number,
                        expected = %accumulated.raw.parent_hash.short(),
                        stored = %stored.hash.short(),
                        "🔄 Reorg detected! Parent hash mismatch"
                    );
                    let fork_point = self.handle_reorg(previous).await?;
                    return Ok(Step::Reorganized { fork_point });
                }
                None => return Err(DomainError::MissingAncestor(number).into()),
            }
        }

        self.commit(accumulated).await?;
        Ok(Step::Committed)
    }

    // =========================================================================
    // Accumulation
    // =========================================================================

    /// Processors for each item of the block, in dispatch order.
    fn routes<'a>(&self, raw: &'a RawBlock) -> Vec<(Arc<dyn Processor>, Item<'a>)> {
        let mut routes = Vec::new();

        for ext in &raw.extrinsics {
            for p in self
                .registry
                .lookup(ProcessorKind::Extrinsic, &ext.module_id, &ext.call_id)
            {
                routes.push((p, Item::Extrinsic(ext)));
            }
        }

        for event in &raw.events {
            let extrinsic = event.extrinsic_index().and_then(|idx| raw.extrinsic(idx));
            for p in self
                .registry
                .lookup(ProcessorKind::Event, &event.module_id, &event.event_id)
            {
                routes.push((p, Item::Event { event, extrinsic }));
            }
        }

        for log in &raw.logs {
            let engine = log.log.engine().unwrap_or(WILDCARD);
            for p in self.registry.lookup(ProcessorKind::Log, log.log.kind(), engine) {
                routes.push((p, Item::Log(log)));
            }
        }

        routes
    }

    /// Run one processor on one item into a fresh output.
    ///
    /// The output is merged only when both hooks succeed. A requirement
    /// mismatch discards it and is counted; any other error is fatal.
    async fn invoke(
        &self,
        ctx: &ProcessorContext<'_>,
        processor: &dyn Processor,
        item: Item<'_>,
        merged: &mut Accumulation,
    ) -> IndexerResult<()> {
        let mut out = Accumulation::default();
        let result = match processor.accumulate(ctx, item, &mut out).await {
            Ok(()) => processor.search_index(ctx, item, &mut out.search_index),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                merged.merge(out);
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                let (extrinsic_idx, event_idx) = item.coordinates();
                warn!(
                    processor = processor.name(),
                    block = ctx.raw.number,
                    ?extrinsic_idx,
                    ?event_idx,
                    error = %e,
                    "⚠️  Processor skipped"
                );
                record_requirement_mismatch(processor.name());
                Ok(())
            }
            Err(e) => {
                if let DomainError::DecodeGap { kind, .. } = &e {
                    record_decode_gap(kind);
                }
                error!(processor = processor.name(), block = ctx.raw.number, error = %e, "❌ Accumulation failed");
                Err(e.into())
            }
        }
    }

    /// Accumulate one block: every matching processor, then block processors.
    #[instrument(skip(self, raw), fields(block = raw.number))]
    pub async fn accumulate(&self, raw: RawBlock) -> IndexerResult<AccumulatedBlock> {
        let runtime = self.config.runtime.resolve(raw.spec_version);
        let mut merged = Accumulation::default();

        {
            let ctx = ProcessorContext {
                raw: &raw,
                runtime,
                codec: self.codec,
                chain: self.source.as_ref(),
                retry: &self.config.retry,
            };

            for (processor, item) in self.routes(&raw) {
                self.invoke(&ctx, processor.as_ref(), item, &mut merged).await?;
            }
            merged.search_index = self.search.finish(std::mem::take(&mut merged.search_index));

            let mut block_phase = Accumulation::default();
            for processor in self.registry.block_processors() {
                self.invoke(&ctx, processor.as_ref(), Item::Block(&merged), &mut block_phase)
                    .await?;
            }
            merged.merge(block_phase);
            merged.search_index = self.search.finish(std::mem::take(&mut merged.search_index));
        }

        let audits = AuditEntry::sequence(raw.number, std::mem::take(&mut merged.audits));
        trace!(audits = audits.len(), search = merged.search_index.len(), "Block accumulated");

        Ok(AccumulatedBlock {
            raw,
            runtime,
            accumulation: merged,
            audits,
        })
    }

    // =========================================================================
    // Sequencing & commit
    // =========================================================================

    /// Write, sequence and commit one block atomically.
    #[instrument(skip(self, accumulated), fields(block = accumulated.raw.number))]
    async fn commit(&self, accumulated: AccumulatedBlock) -> IndexerResult<Block> {
        let _timer = ProcessingTimer::new();
        let raw = &accumulated.raw;
        let acc = &accumulated.accumulation;
        let number = raw.number;

        let mut tx = self.repositories.begin().await?;

        let parent = match number.checked_sub(1) {
            Some(previous) => tx.block(previous).await?,
            None => None,
        };
        if parent.is_none() && number != self.config.start_block {
            return Err(DomainError::MissingAncestor(number).into());
        }
        let parent_total = match &parent {
            Some(p) => Some(
                tx.block_total(p.number)
                    .await?
                    .ok_or(DomainError::MissingAncestor(number))?,
            ),
            None => None,
        };

        let mut counters = raw.base_counters();
        counters.absorb(&acc.counters);
        let block = Block {
            number,
            hash: raw.hash.clone(),
            parent_hash: raw.parent_hash.clone(),
            spec_version: raw.spec_version,
            datetime: acc.datetime,
            slot_number: acc.slot_number,
            authority_index: acc.authority_index,
            counters,
            indexed_at: Utc::now(),
        };

        // Facts from accumulation.
        let extrinsics: Vec<Extrinsic> = raw.extrinsics.iter().map(|e| extrinsic_row(number, e)).collect();
        let events: Vec<Event> = raw.events.iter().map(|e| event_row(number, e)).collect();
        tx.insert_block(&block, &extrinsics, &events).await?;
        tx.insert_logs(&acc.logs).await?;
        tx.insert_audits(&accumulated.audits).await?;
        tx.insert_contracts(&acc.contracts).await?;
        tx.insert_contract_instances(&acc.contract_instances).await?;
        for snapshot in &acc.sessions {
            tx.insert_session(snapshot).await?;
        }
        tx.insert_search_index(&acc.search_index).await?;
        tx.insert_account_infos(&acc.account_infos).await?;

        // Derived state.
        let referenced = referenced_accounts(&acc.search_index);
        let created = self
            .reconciler
            .ensure_accounts(&block, &referenced, tx.as_mut())
            .await?;
        self.reconciler
            .apply(&block, &accumulated.audits, tx.as_mut())
            .await?;

        let ctx = SequenceContext {
            raw,
            block: &block,
            parent: parent.as_ref(),
            parent_total: parent_total.as_ref(),
            accumulation: acc,
            runtime: accumulated.runtime,
            codec: self.codec,
        };

        for (processor, item) in self.routes(raw) {
            processor.sequence(&ctx, item, tx.as_mut()).await?;
        }
        for processor in self.registry.block_processors() {
            processor.sequence(&ctx, Item::Block(acc), tx.as_mut()).await?;
        }

        let total = compute_block_total(&ctx, tx.as_mut()).await?;
        tx.save_block_total(&total).await?;

        tx.set_cursor(&IndexerCursor {
            chain_id: self.config.chain_id.clone(),
            last_indexed_block: number,
            last_indexed_hash: block.hash.clone(),
            updated_at: Utc::now(),
        })
        .await?;
        tx.commit().await?;

        record_block_committed();
        info!(
            block = number,
            extrinsics = block.counters.extrinsics,
            events = block.counters.events,
            accounts_created = created,
            session = total.session_id,
            "⛓️  Block indexed"
        );
        Ok(block)
    }

    // =========================================================================
    // Reorg & revert
    // =========================================================================

    /// Highest stored height that is still canonical, at or below `tip`.
    async fn find_fork_point(&self, tip: u64) -> IndexerResult<u64> {
        let mut height = tip;
        loop {
            let Some(stored) = self.repositories.blocks().get_block(height).await? else {
                return Ok(height);
            };
            if self.canonical_hash(height).await?.as_ref() == Some(&stored.hash) {
                return Ok(height);
            }

            let depth = tip - height + 1;
            if depth > self.config.max_reorg_depth || height == 0 {
                error!(
                    tip,
                    depth,
                    max_depth = self.config.max_reorg_depth,
                    "❌ Fork point beyond maximum reorg depth"
                );
                return Err(IndexerError::ReorgTooDeep {
                    at: tip + 1,
                    max_depth: self.config.max_reorg_depth,
                });
            }
            height -= 1;
        }
    }

    /// Revert every block above the fork point, highest first.
    #[instrument(skip(self))]
    async fn handle_reorg(&self, tip: u64) -> IndexerResult<u64> {
        let fork_point = self.find_fork_point(tip).await?;
        let depth = tip - fork_point;
        record_reorg_detected(depth);

        for number in (fork_point + 1..=tip).rev() {
            self.revert(number).await?;
        }

        info!(fork_point, reverted = depth, "🔄 Reorg handled");
        Ok(fork_point)
    }

    /// Processors that may have accumulated facts for a stored block.
    async fn processors_for_stored(
        &self,
        number: u64,
        tx: &mut dyn StateTransaction,
    ) -> IndexerResult<Vec<Arc<dyn Processor>>> {
        let mut matched = Vec::new();

        for ext in tx.extrinsics(number).await? {
            matched.extend(
                self.registry
                    .lookup(ProcessorKind::Extrinsic, &ext.module_id, &ext.call_id),
            );
        }
        for event in tx.events(number).await? {
            matched.extend(
                self.registry
                    .lookup(ProcessorKind::Event, &event.module_id, &event.event_id),
            );
        }
        for log in tx.logs(number).await? {
            let engine = log.engine.as_deref().unwrap_or(WILDCARD);
            matched.extend(self.registry.lookup(ProcessorKind::Log, &log.kind, engine));
        }
        matched.extend(self.registry.block_processors().iter().cloned());

        Ok(dedup_processors(matched))
    }

    /// Revert one committed block and rewind the cursor to its parent.
    ///
    /// Deletes what accumulation created for the block. Derived state is
    /// left as is and recomputed when the height is indexed again.
    #[instrument(skip(self))]
    pub async fn revert(&self, number: u64) -> IndexerResult<()> {
        let mut tx = self.repositories.begin().await?;

        let block = tx
            .block(number)
            .await?
            .ok_or(DomainError::BlockNotFound(number))?;

        for processor in self.processors_for_stored(number, tx.as_mut()).await? {
            processor.accumulation_revert(&block, tx.as_mut()).await?;
        }

        let audits = tx.delete_created_at(number, BlockScopedTable::Audits).await?;
        let search = tx
            .delete_created_at(number, BlockScopedTable::SearchIndex)
            .await?;
        tx.delete_block(number).await?;

        tx.set_cursor(&IndexerCursor {
            chain_id: self.config.chain_id.clone(),
            last_indexed_block: number.saturating_sub(1),
            last_indexed_hash: block.parent_hash.clone(),
            updated_at: Utc::now(),
        })
        .await?;
        tx.commit().await?;

        record_blocks_reverted(1);
        info!(block = number, audits, search, "🗑️  Block reverted");
        Ok(())
    }
}

/// Stored form of a decoded extrinsic.
fn extrinsic_row(block_number: u64, ext: &RawExtrinsic) -> Extrinsic {
    Extrinsic {
        block_number,
        index: ext.index,
        module_id: ext.module_id.clone(),
        call_id: ext.call_id.clone(),
        signer: ext.signer.clone(),
        success: ext.success,
        params: ext
            .params
            .iter()
            .map(|p| json!({ "name": p.name, "type": p.type_name, "value": p.value }))
            .collect(),
    }
}

/// Stored form of a decoded event.
fn event_row(block_number: u64, event: &RawEvent) -> Event {
    Event {
        block_number,
        index: event.index,
        phase: event.phase,
        module_id: event.module_id.clone(),
        event_id: event.event_id.clone(),
        attributes: event
            .attributes
            .iter()
            .map(|a| json!({ "type": a.type_name, "value": a.value }))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountId, EventPhase};
    use crate::ports::{CallParam, EventAttribute};

    #[test]
    fn test_extrinsic_row_keeps_param_order() {
        let ext = RawExtrinsic {
            index: 1,
            module_id: "balances".into(),
            call_id: "transfer".into(),
            params: vec![
                CallParam {
                    name: "dest".into(),
                    type_name: "LookupSource".into(),
                    value: json!("0x02"),
                },
                CallParam {
                    name: "value".into(),
                    type_name: "Balance".into(),
                    value: json!(500),
                },
            ],
            signer: Some(AccountId([1; 32])),
            success: true,
        };

        let row = extrinsic_row(100, &ext);
        assert_eq!(row.block_number, 100);
        assert_eq!(row.params[0]["name"], "dest");
        assert_eq!(row.params[1]["type"], "Balance");
        assert_eq!(row.params[1]["value"], 500);
    }

    #[test]
    fn test_event_row_links_extrinsic() {
        let event = RawEvent {
            index: 3,
            phase: EventPhase::ApplyExtrinsic(1),
            module_id: "balances".into(),
            event_id: "Transfer".into(),
            attributes: vec![EventAttribute {
                type_name: "Balance".into(),
                value: json!(500),
            }],
        };

        let row = event_row(100, &event);
        assert_eq!(row.extrinsic_index(), Some(1));
        assert_eq!(row.attributes[0]["type"], "Balance");
    }
}
