//! Substrate RPC adapter for the chronicle indexer.
//!
//! This crate implements the [`BlockSource`] and [`ChainState`] ports from
//! `chronicle-core`, providing connectivity to Substrate-based blockchains
//! via WebSocket RPC.
//!
//! # Features
//!
//! - Canonical hash lookup by height and finalized head subscription
//! - Dynamic metadata decoding using subxt
//! - SCALE to JSON conversion for calls, events and storage values
//! - BABE and Aura pre-runtime digest decoding
//!
//! # Usage
//!
//! ```ignore
//! use chronicle_substrate::{SubstrateClient, SubstrateClientConfig};
//!
//! let config = SubstrateClientConfig {
//!     ws_url: "ws://localhost:9944".to_string(),
//! };
//!
//! let client = SubstrateClient::connect(config).await?;
//! let head = client.finalized_head().await?;
//! let block = client.block(&head.hash).await?;
//! ```
//!
//! [`BlockSource`]: chronicle_core::ports::BlockSource
//! [`ChainState`]: chronicle_core::ports::ChainState

mod client;
mod convert;

pub use client::{SubstrateClient, SubstrateClientConfig};
