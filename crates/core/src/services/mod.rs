//! Domain services.
//!
//! - [`pipeline`] - block pipeline (accumulate, sequence, commit, revert)
//! - [`reconciler`] - audit ledger replay into derived state
//! - [`session`] - validator sessions and authorship
//! - [`totals`] - running totals aggregator
//! - [`search`] - search index builder

pub mod pipeline;
pub mod reconciler;
pub mod search;
pub mod session;
pub mod totals;

pub use pipeline::{AccumulatedBlock, BlockPipeline};
pub use reconciler::Reconciler;
pub use search::{SearchIndexBuilder, entry_for, referenced_accounts};
pub use session::{apply_session, capture_session, close_previous, rank_validator};
pub use totals::{blocktime, compute_block_total, session_id};
