//! Storage layer for the chronicle indexer.
//!
//! This crate provides two implementations of the repository traits defined
//! in `chronicle-core`:
//!
//! - [`postgres`] - PostgreSQL, with connection pooling, migrations and purge
//! - [`memory`] - in-memory store for tests and `--dry-run`
//!
//! # Usage
//!
//! ```ignore
//! use chronicle_storage::{Database, DatabaseConfig, PgRepositories};
//!
//! let config = DatabaseConfig::for_indexer(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = Arc::new(PgRepositories::new(Arc::new(db)));
//! ```

pub mod memory;
pub mod postgres;

pub use memory::{MemoryRepositories, MemoryState};
pub use postgres::{Database, DatabaseConfig, PgRepositories, PurgeStats};
