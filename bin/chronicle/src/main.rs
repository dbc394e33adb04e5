//! Chronicle - Substrate chain history indexer.
//!
//! # Usage
//!
//! ```bash
//! # Start with default config
//! chronicle
//!
//! # Start with environment overrides
//! DATABASE_URL=postgres://localhost/chronicle WS_URL=ws://localhost:9944 chronicle
//!
//! # Index into memory only, nothing is persisted
//! chronicle --dry-run --start-block 1000000
//! ```

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

use chronicle_core::config::{
    PipelineConfig, RetryConfig, RuntimeStrategyTable, SearchIndexConfig,
};
use chronicle_core::error::IndexerError;
use chronicle_core::metrics::init_metrics;
use chronicle_core::models::SearchIndexType;
use chronicle_core::ports::{BlockSource, ProcessorRegistry, Repositories};
use chronicle_core::services::BlockPipeline;
use chronicle_processors::default_bundles;
use chronicle_storage::{Database, DatabaseConfig, MemoryRepositories, PgRepositories};
use chronicle_substrate::{SubstrateClient, SubstrateClientConfig};

/// Chronicle CLI - Substrate chain history indexer.
#[derive(Parser, Debug)]
#[command(name = "chronicle")]
#[command(about = "Chronicle - Substrate chain history indexer")]
#[command(version)]
struct Cli {
    /// Substrate node WebSocket URL.
    #[arg(long, env = "WS_URL", default_value = "ws://127.0.0.1:9944")]
    ws_url: String,

    /// PostgreSQL database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/chronicle"
    )]
    database_url: String,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// First block to index when the database has no cursor.
    #[arg(long, env = "START_BLOCK", default_value = "0")]
    start_block: u64,

    /// SS58 address format of the chain.
    #[arg(long, env = "ADDRESS_FORMAT", default_value = "42")]
    address_format: u16,

    /// Blocks accumulated ahead of the writer.
    #[arg(long, env = "LOOKAHEAD", default_value = "4")]
    lookahead: usize,

    /// Deepest reorg the indexer will unwind before giving up.
    #[arg(long, env = "MAX_REORG_DEPTH", default_value = "64")]
    max_reorg_depth: u64,

    /// First spec version using the era-based staking storage. Older blocks
    /// read validator sets through the legacy storage layout.
    #[arg(long, env = "LEGACY_SESSION_UNTIL")]
    legacy_session_until: Option<u32>,

    /// Read `System.Account` for accounts touched by each block.
    #[arg(
        long,
        env = "BALANCE_SNAPSHOTS",
        default_value = "true",
        action = clap::ArgAction::Set
    )]
    balance_snapshots: bool,

    /// Restrict the search index to these types (comma separated).
    #[arg(long, env = "SEARCH_INDEX_TYPES", value_delimiter = ',', value_parser = parse_search_type)]
    search_index_types: Vec<SearchIndexType>,

    /// Give up on a chain query after this many seconds of retries.
    #[arg(long, env = "RETRY_MAX_ELAPSED_SECS", default_value = "300")]
    retry_max_elapsed_secs: u64,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Purge all indexed data from the database and exit.
    ///
    /// Deletes blocks, derived state and the indexer cursor. Schema and
    /// migrations are preserved.
    #[arg(long)]
    purge: bool,

    /// Skip confirmation prompt for destructive operations (like --purge).
    #[arg(long, short = 'y')]
    yes: bool,

    /// Index into memory instead of PostgreSQL.
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,
}

/// Parse a search index type from its stable name.
fn parse_search_type(s: &str) -> Result<SearchIndexType, String> {
    SearchIndexType::from_name(s.trim()).ok_or_else(|| {
        format!("Unknown search index type '{s}'. Use names like 'balance_transfer'.")
    })
}

impl Cli {
    fn pipeline_config(&self, chain_id: String) -> PipelineConfig {
        let runtime = match self.legacy_session_until {
            Some(spec_version) => RuntimeStrategyTable::legacy_until(spec_version),
            None => RuntimeStrategyTable::default(),
        };
        let search_index = if self.search_index_types.is_empty() {
            SearchIndexConfig::default()
        } else {
            SearchIndexConfig::only(self.search_index_types.iter().copied())
        };

        PipelineConfig {
            chain_id,
            start_block: self.start_block,
            lookahead: self.lookahead,
            max_reorg_depth: self.max_reorg_depth,
            address_format: self.address_format,
            retry: RetryConfig {
                max_elapsed: Duration::from_secs(self.retry_max_elapsed_secs),
                ..RetryConfig::default()
            },
            runtime,
            search_index,
            balance_snapshots: self.balance_snapshots,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>() {
        Ok(metrics_addr) => {
            match PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()
            {
                Ok(()) => {
                    init_metrics();
                    true
                }
                Err(e) => {
                    warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
                    false
                }
            }
        }
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Chronicle Indexer");
    debug!(ws_url = %cli.ws_url, "Substrate endpoint");

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    let db = if cli.dry_run {
        warn!("🧪 Dry run: indexing into memory, nothing is persisted");
        None
    } else {
        debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");
        info!("🗄️  Connecting to database...");
        let db = Database::connect(&DatabaseConfig::for_indexer(&cli.database_url))
            .await
            .context("Failed to connect to database")?;

        db.migrate().await.context("Failed to run migrations")?;
        info!("🗄️  Database ready (migrations applied)");

        if cli.migrate_only {
            info!("🛑 --migrate-only flag set, exiting");
            return Ok(());
        }

        if cli.purge {
            return handle_purge(&db, cli.yes).await;
        }
        Some(Arc::new(db))
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 📡 SUBSTRATE CONNECTION
    // ─────────────────────────────────────────────────────────────────────────
    info!("📡 Connecting to Substrate node...");
    let substrate_client = SubstrateClient::connect(SubstrateClientConfig {
        ws_url: cli.ws_url.clone(),
    })
    .await
    .context("Failed to connect to Substrate node")?;
    let substrate_client = Arc::new(substrate_client);

    let genesis_hash = substrate_client.genesis_hash().await?;
    let finalized = substrate_client.finalized_head().await?;

    info!(
        genesis = %hex::encode(&genesis_hash.0[..8]),
        head = finalized.number,
        "🔗 Chain connected"
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 📦 PROCESSOR BUNDLES
    // ─────────────────────────────────────────────────────────────────────────
    let bundles = default_bundles(cli.balance_snapshots);
    debug!(bundles = bundles.len(), "Processor bundles registered");
    let processors = Arc::new(bundles.into_processor_registry());

    let config = cli.pipeline_config(hex::encode(genesis_hash.0));

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ INDEXER START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let indexer_handle = match &db {
        Some(db) => spawn_indexer(
            config,
            substrate_client,
            Arc::new(PgRepositories::new(db.clone())),
            processors,
            shutdown_tx.clone(),
            shutdown_rx.clone(),
        )?,
        None => spawn_indexer(
            config,
            substrate_client,
            Arc::new(MemoryRepositories::new()),
            processors,
            shutdown_tx.clone(),
            shutdown_rx.clone(),
        )?,
    };

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Chronicle ready");
    if metrics_enabled {
        info!(
            "   📊 Metrics:  http://localhost:{}/metrics",
            cli.metrics_port
        );
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    let mut fatal_rx = shutdown_rx;
    tokio::select! {
        _ = shutdown_signal() => {}
        _ = fatal_rx.wait_for(|stop| *stop) => {
            warn!("⚠️  Indexer stopped on its own");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(30), indexer_handle).await {
        Ok(_) => debug!("Indexer stopped"),
        Err(_) => warn!("⚠️  Indexer shutdown timed out"),
    }

    if let Some(db) = db {
        db.close().await;
    }

    info!("🛑 Shutdown complete");
    Ok(())
}

/// Build the pipeline and run it on its own task.
///
/// Any error other than a requested shutdown stops the whole process.
fn spawn_indexer<R: Repositories + 'static>(
    config: PipelineConfig,
    source: Arc<SubstrateClient>,
    repositories: Arc<R>,
    processors: Arc<ProcessorRegistry>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let pipeline = BlockPipeline::new(config, source, repositories, processors)
        .context("Invalid pipeline configuration")?;

    Ok(tokio::spawn(
        async move {
            match pipeline.run(shutdown_rx).await {
                Ok(()) | Err(IndexerError::ShutdownRequested) => {}
                Err(e) => {
                    error!(error = ?e, "❌ Indexer error");
                    let _ = shutdown_tx.send(true);
                }
            }
        }
        .instrument(info_span!("indexer")),
    ))
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "❌ Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "❌ Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Handle the --purge command.
async fn handle_purge(db: &Database, skip_confirmation: bool) -> Result<()> {
    warn!("⚠️  PURGE MODE: This will delete ALL indexed data!");
    warn!("   - All blocks, extrinsics, events and logs");
    warn!("   - Accounts, identities, sessions, contracts and the search index");
    warn!("   - The indexer cursor will be reset");
    warn!("   - Schema and migrations will be preserved");

    if !skip_confirmation {
        print!("\n🔴 Are you sure you want to purge all data? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            info!("❌ Purge cancelled");
            return Ok(());
        }
    }

    info!("🗑️  Purging database...");
    let stats = db.purge().await.context("Failed to purge database")?;

    info!("✅ Database purged successfully");
    info!("   📦 Blocks removed: {}", stats.blocks_removed);
    info!("   📝 Extrinsics removed: {}", stats.extrinsics_removed);
    info!("   📣 Events removed: {}", stats.events_removed);
    info!("   👤 Accounts removed: {}", stats.accounts_removed);
    info!("   The indexer will start from the configured start block on next run");

    Ok(())
}
