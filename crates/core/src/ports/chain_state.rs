//! Port trait for runtime storage queries at a given block.

use async_trait::async_trait;

use crate::error::ChainResult;
use crate::models::BlockHash;

/// Read-only access to runtime storage.
///
/// Keys and values are JSON renderings of the SCALE types: account ids as
/// `0x` hex strings, integers as numbers, structs as objects.
#[async_trait]
pub trait ChainState: Send + Sync {
    /// Value of `pallet.entry(keys..)` at block `at`.
    ///
    /// `Ok(None)` means the key holds no value. A storage function that the
    /// runtime at `at` does not define is reported as
    /// [`crate::error::ChainError::StorageFunctionMissing`].
    async fn storage(
        &self,
        at: &BlockHash,
        pallet: &str,
        entry: &str,
        keys: &[serde_json::Value],
    ) -> ChainResult<Option<serde_json::Value>>;
}
