//! Error types for the indexer domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DomainError`] - Processing rule violations (decode gaps, shape mismatches, ...)
//! - [`StorageError`] - Database/repository errors
//! - [`ChainError`] - Blockchain RPC errors
//! - [`IndexerError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Domain Errors
// =============================================================================

/// Business logic and domain rule violations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An event or call does not have the attribute shape a processor expects.
    ///
    /// The processor is skipped for that item; the block is not aborted.
    #[error("Requirement mismatch in {processor}: {reason}")]
    RequirementMismatch {
        /// Name of the processor that rejected the item.
        processor: &'static str,
        /// What was wrong with the item.
        reason: String,
    },

    /// The block supplier could not decode a log/digest kind.
    ///
    /// Fatal for the block: indexing halts until a decoder exists.
    #[error("No decoder for {kind} in block {block}")]
    DecodeGap {
        /// Block number where the gap was hit.
        block: u64,
        /// Kind of log or digest item.
        kind: String,
    },

    /// Sequencing needs the parent snapshot and it is not there.
    #[error("Missing ancestor snapshot for block {0}")]
    MissingAncestor(u64),

    /// Block was not found in storage.
    #[error("Block not found: {0}")]
    BlockNotFound(u64),

    /// SS58 text could not be decoded or encoded.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Data decoding/deserialization failed.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Chain query failed.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
}

impl DomainError {
    /// Build a [`DomainError::RequirementMismatch`].
    pub fn mismatch(processor: &'static str, reason: impl Into<String>) -> Self {
        Self::RequirementMismatch {
            processor,
            reason: reason.into(),
        }
    }

    /// Whether the pipeline may skip the offending processor and go on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RequirementMismatch { .. })
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// These errors originate from storage operations like queries,
/// transactions, and data serialization.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Database constraint was violated (unique, foreign key, etc.).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Chain Errors
// =============================================================================

/// Blockchain RPC and connectivity errors.
#[derive(Debug, Error)]
pub enum ChainError {
    /// WebSocket connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// RPC request failed.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// Block subscription failed or disconnected.
    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    /// Runtime metadata could not be fetched or parsed.
    #[error("Metadata error: {0}")]
    MetadataError(String),

    /// Block could not be fetched.
    #[error("Block fetch error at hash {hash}: {message}")]
    BlockFetchError {
        /// Block hash that failed to fetch.
        hash: String,
        /// Error details.
        message: String,
    },

    /// No canonical block exists at this height (yet).
    #[error("Block {0} not found on chain")]
    BlockNotFound(u64),

    /// The runtime at this block has no such storage function.
    #[error("Storage function {pallet}.{entry} not found in runtime")]
    StorageFunctionMissing {
        /// Pallet name.
        pallet: String,
        /// Storage entry name.
        entry: String,
    },

    /// A transient failure outlived the retry budget.
    #[error("Retries exhausted for {operation}: {last_error}")]
    RetriesExhausted {
        /// What was being attempted.
        operation: String,
        /// The last error observed.
        last_error: String,
    },

    /// Operation timed out waiting for block.
    #[error("Timeout waiting for block {0}")]
    Timeout(u64),
}

impl ChainError {
    /// Transient failures are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_)
                | Self::RpcError(_)
                | Self::SubscriptionError(_)
                | Self::BlockFetchError { .. }
                | Self::Timeout(_)
        )
    }
}

// =============================================================================
// Indexer Errors
// =============================================================================

/// Top-level indexer orchestration errors.
///
/// This is the main error type returned by [`crate::services::BlockPipeline`].
/// It wraps all lower-level errors and adds indexer-specific variants.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Domain logic error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Blockchain connectivity error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connected chain doesn't match stored data.
    ///
    /// This is a fatal error that requires manual intervention.
    #[error("Chain mismatch: connected to {connected} but database contains data for {expected}")]
    ChainMismatch {
        /// Genesis hash of connected chain.
        connected: String,
        /// Genesis hash expected by database.
        expected: String,
    },

    /// The fork point lies deeper than the configured maximum.
    #[error("Reorg at block {at} exceeds maximum depth {max_depth}")]
    ReorgTooDeep {
        /// Height where the mismatch was observed.
        at: u64,
        /// Configured limit.
        max_depth: u64,
    },

    /// Graceful shutdown was requested.
    ///
    /// This is not really an error but uses the error type for control flow.
    #[error("Indexer shutdown requested")]
    ShutdownRequested,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for indexer operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    // Test critique: la chaîne de conversion d'erreurs fonctionne
    // Permet d'utiliser ? à travers les couches
    #[test]
    fn test_error_conversion_chain() {
        // Storage -> Domain -> Indexer
        let storage_err = StorageError::QueryError("db failed".into());
        let domain_err: DomainError = storage_err.into();
        let indexer_err: IndexerError = domain_err.into();
        assert!(indexer_err.to_string().contains("db failed"));

        // Chain -> Domain -> Indexer
        let chain_err = ChainError::RpcError("rpc failed".into());
        let domain_err: DomainError = chain_err.into();
        let indexer_err: IndexerError = domain_err.into();
        assert!(indexer_err.to_string().contains("rpc failed"));
    }

    // Test critique: seul un RequirementMismatch permet de sauter un processor
    #[test]
    fn test_only_requirement_mismatch_is_recoverable() {
        assert!(DomainError::mismatch("balances.Transfer", "2 attributes").is_recoverable());
        assert!(
            !DomainError::DecodeGap {
                block: 5,
                kind: "PreRuntime(xyz0)".into()
            }
            .is_recoverable()
        );
        assert!(!DomainError::MissingAncestor(9).is_recoverable());
    }

    #[test]
    fn test_transient_classification() {
        assert!(ChainError::RpcError("reset".into()).is_transient());
        assert!(ChainError::Timeout(3).is_transient());
        assert!(
            !ChainError::StorageFunctionMissing {
                pallet: "Staking".into(),
                entry: "ErasStakers".into()
            }
            .is_transient()
        );
        assert!(
            !ChainError::RetriesExhausted {
                operation: "block_hash(4)".into(),
                last_error: "reset".into()
            }
            .is_transient()
        );
    }

    // Test critique: ChainMismatch contient les infos de debug nécessaires
    #[test]
    fn test_chain_mismatch_includes_hashes() {
        let err = IndexerError::ChainMismatch {
            connected: "0xaaa".into(),
            expected: "0xbbb".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0xaaa") && msg.contains("0xbbb"));
    }
}
