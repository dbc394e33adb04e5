//! Pipeline configuration.
//!
//! Everything that tunes the pipeline is carried by [`PipelineConfig`] and
//! handed to [`crate::services::BlockPipeline::new`]; nothing is read from
//! ambient state.

use std::collections::HashSet;
use std::time::Duration;

use crate::address::Ss58Codec;
use crate::error::{IndexerError, IndexerResult};
use crate::models::SearchIndexType;

// =============================================================================
// Retry
// =============================================================================

/// Bounded exponential backoff for chain queries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// First wait after a transient failure.
    pub initial_interval: Duration,
    /// Upper bound of a single wait.
    pub max_interval: Duration,
    /// Total time budget; exceeding it is fatal.
    pub max_elapsed: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            max_elapsed: Duration::from_secs(300),
        }
    }
}

// =============================================================================
// Runtime strategy table
// =============================================================================

/// How session validators are looked up in chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLookup {
    /// `Session.Validators` lists stashes; exposure from `Staking.ErasStakers`.
    Current,
    /// `Session.Validators` lists controllers; exposure from `Staking.Stakers`.
    Legacy,
}

/// Behavior switches in effect for one runtime version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeProfile {
    pub spec_version: u32,
    pub session_lookup: SessionLookup,
}

/// Ordered `(from_spec_version, strategy)` entries.
///
/// The entry with the highest `from_spec_version` not above the block's spec
/// version wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStrategyTable {
    entries: Vec<(u32, SessionLookup)>,
}

impl RuntimeStrategyTable {
    pub fn new(mut entries: Vec<(u32, SessionLookup)>) -> Self {
        entries.sort_by_key(|(from, _)| *from);
        Self { entries }
    }

    /// Legacy lookup below `spec_version`, current from there on.
    pub fn legacy_until(spec_version: u32) -> Self {
        Self::new(vec![
            (0, SessionLookup::Legacy),
            (spec_version, SessionLookup::Current),
        ])
    }

    /// Resolve the profile for a block's spec version.
    pub fn resolve(&self, spec_version: u32) -> RuntimeProfile {
        let session_lookup = self
            .entries
            .iter()
            .rev()
            .find(|(from, _)| *from <= spec_version)
            .map(|(_, lookup)| *lookup)
            .unwrap_or(SessionLookup::Current);

        RuntimeProfile {
            spec_version,
            session_lookup,
        }
    }
}

impl Default for RuntimeStrategyTable {
    fn default() -> Self {
        Self::new(vec![(0, SessionLookup::Current)])
    }
}

// =============================================================================
// Search index
// =============================================================================

/// Which search index types are emitted. `None` means all of them.
#[derive(Debug, Clone, Default)]
pub struct SearchIndexConfig {
    pub allowed: Option<HashSet<SearchIndexType>>,
}

impl SearchIndexConfig {
    pub fn only(types: impl IntoIterator<Item = SearchIndexType>) -> Self {
        Self {
            allowed: Some(types.into_iter().collect()),
        }
    }

    pub fn allows(&self, ty: SearchIndexType) -> bool {
        self.allowed.as_ref().is_none_or(|set| set.contains(&ty))
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Configuration for the block pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chain identifier (genesis hash).
    pub chain_id: String,
    /// First height to index when no cursor exists.
    pub start_block: u64,
    /// Number of blocks accumulated ahead of sequencing.
    pub lookahead: usize,
    /// Deepest fork point the pipeline will walk back to.
    pub max_reorg_depth: u64,
    /// SS58 format used when rendering addresses.
    pub address_format: u16,
    pub retry: RetryConfig,
    pub runtime: RuntimeStrategyTable,
    pub search_index: SearchIndexConfig,
    /// Read `System.Account` for accounts touched by a block.
    pub balance_snapshots: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            start_block: 0,
            lookahead: 4,
            max_reorg_depth: 64,
            address_format: 42,
            retry: RetryConfig::default(),
            runtime: RuntimeStrategyTable::default(),
            search_index: SearchIndexConfig::default(),
            balance_snapshots: true,
        }
    }
}

impl PipelineConfig {
    /// Check the values that cannot be enforced by types.
    pub fn validate(&self) -> IndexerResult<()> {
        if self.lookahead == 0 {
            return Err(IndexerError::ConfigError("lookahead must be at least 1".into()));
        }
        if self.max_reorg_depth == 0 {
            return Err(IndexerError::ConfigError(
                "max_reorg_depth must be at least 1".into(),
            ));
        }
        self.codec()?;
        Ok(())
    }

    /// Address codec for the configured format.
    pub fn codec(&self) -> IndexerResult<Ss58Codec> {
        Ss58Codec::new(self.address_format)
            .map_err(|e| IndexerError::ConfigError(format!("address format: {e}")))
    }
}
