//! Core domain layer for the chronicle indexer.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! the block pipeline for the Substrate blockchain indexer. It follows
//! hexagonal architecture principles - this is the innermost layer with
//! no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     chronicle (binary)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  chronicle-processors          │  chronicle-substrate       │
//! │     (bundles)                  │     (RPC)                  │
//! ├────────────────────────────────┴────────────────────────────┤
//! │                    chronicle-storage                        │
//! │               (PostgreSQL, in-memory)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     chronicle-core  ← YOU ARE HERE          │
//! │          (models, ports, pipeline, reconciler)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (Block, Account, AuditRecord, Session, ...)
//! - [`ports`] - Interface traits for adapters and processors
//! - [`services`] - Block pipeline, state reconciler, session engine, totals
//! - [`address`] - SS58 address codec
//! - [`config`] - Pipeline configuration
//! - [`error`] - Error taxonomy
//! - [`metrics`] - Prometheus metrics definitions
//! - [`retry`] - Bounded retry for chain queries
//! - [`value`] - Helpers for decoded JSON values
//!
//! # Processing model
//!
//! Work on a block is split in two phases:
//!
//! 1. **Accumulation** records facts derived from the block alone: audit
//!    records, logs, contracts, sessions, search index tuples and counter
//!    deltas. It may run ahead for several blocks.
//! 2. **Sequencing** derives mutable state (accounts, identities, roles,
//!    running totals) from the parent's sequenced state and this block's
//!    audit records. It runs strictly in chain order.
//!
//! Both phases of a block commit in one transaction. A reorg deletes the
//! facts of the abandoned blocks; replay rebuilds derived state.

pub mod address;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod retry;
pub mod services;
pub mod value;
