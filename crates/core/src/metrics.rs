//! Metrics definitions for the indexer.
//!
//! This module defines all metrics used throughout the indexer.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "blocks_committed_total",
        "Total number of blocks accumulated, sequenced and committed"
    );
    describe_counter!(
        "blocks_reverted_total",
        "Total number of blocks reverted during reorg handling"
    );
    describe_counter!(
        "reorgs_detected_total",
        "Total number of chain reorganizations detected"
    );
    describe_counter!(
        "requirement_mismatches_total",
        "Items skipped by a processor because their shape did not match"
    );
    describe_counter!(
        "decode_gaps_total",
        "Log or digest kinds without a decoder"
    );
    describe_counter!(
        "rpc_retries_total",
        "Transient chain query failures that were retried"
    );
    describe_histogram!(
        "block_processing_duration_seconds",
        "Time taken to sequence and commit a block in seconds"
    );
}

/// Record a committed block.
pub fn record_block_committed() {
    counter!("blocks_committed_total").increment(1);
}

/// Record reverted blocks.
pub fn record_blocks_reverted(count: u64) {
    counter!("blocks_reverted_total").increment(count);
}

/// Record a chain reorganization.
///
/// # Arguments
/// * `depth` - Number of blocks between the tip and the fork point
pub fn record_reorg_detected(depth: u64) {
    counter!("reorgs_detected_total").increment(1);
    histogram!("reorg_depth_blocks").record(depth as f64);
}

/// Record a skipped processor.
///
/// # Arguments
/// * `processor` - Name of the processor that rejected the item
pub fn record_requirement_mismatch(processor: &'static str) {
    counter!("requirement_mismatches_total", "processor" => processor).increment(1);
}

/// Record a log kind the block supplier could not decode.
pub fn record_decode_gap(kind: &str) {
    counter!("decode_gaps_total", "kind" => kind.to_string()).increment(1);
}

/// Record a retried chain query.
pub fn record_rpc_retry(operation: &str) {
    counter!("rpc_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record block processing duration.
pub fn record_block_processing_duration(duration_secs: f64) {
    histogram!("block_processing_duration_seconds").record(duration_secs);
}

/// A timer that automatically records duration when dropped.
pub struct ProcessingTimer {
    start: Instant,
}

impl ProcessingTimer {
    /// Start a new processing timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_block_processing_duration(duration);
    }
}
