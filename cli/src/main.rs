//! ChainSync CLI — run and manage chain → search index sync pipelines.
//!
//! # Commands
//! ```text
//! chainsync sync   [--rpc-url <url>] [--es-url <url>] [--start-height <n>] [--stop-at <n>]
//! chainsync status
//! chainsync reset
//! chainsync schema [--legacy-types]
//! chainsync info
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use chainsync_core::checkpoint::{CursorManager, CursorStore};
use chainsync_core::schema::all_schemas;
use chainsync_evm::{EvmChainReader, HttpRpcClient, SyncBuilder};
use chainsync_search::ElasticsearchBackend;
use chainsync_storage::FileCursorStore;

mod config;
mod logging;

use config::{AppConfig, CursorBackend, Overrides};

#[derive(Parser)]
#[command(
    name = "chainsync",
    about = "Reorg-safe blockchain → Elasticsearch sync — ChainSync CLI",
    long_about = "
ChainSync CLI: index blocks, transactions and created contracts of an EVM
chain into esblock / estx / escontract, following the head and undoing
chain reorganizations.

ENVIRONMENT VARIABLES:
  CHAINSYNC_CONFIG        Path to chainsync.yaml
  CHAINSYNC_RPC_URL       Node JSON-RPC URL
  CHAINSYNC_ES_URL        Elasticsearch URL
  CHAINSYNC_CURSOR_PATH   Cursor file (or SQLite database) path
  RUST_LOG                Log filter, overrides --log-level
",
    version
)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, global = true, env = "CHAINSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Pipeline ID (cursor key)
    #[arg(long, global = true)]
    id: Option<String>,

    /// Chain slug (cursor key)
    #[arg(long, global = true)]
    chain: Option<String>,

    /// Cursor file (or SQLite database) path
    #[arg(long, global = true, env = "CHAINSYNC_CURSOR_PATH")]
    cursor_path: Option<PathBuf>,

    /// Log level: trace | debug | info | warn | error
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync loop until Ctrl-C, --stop-at, or a fatal error
    Sync {
        /// Node JSON-RPC URL
        #[arg(long, env = "CHAINSYNC_RPC_URL")]
        rpc_url: Option<String>,
        /// Elasticsearch URL
        #[arg(long, env = "CHAINSYNC_ES_URL")]
        es_url: Option<String>,
        /// Anchor height used when no cursor exists
        #[arg(long)]
        start_height: Option<u64>,
        /// Exit once this height is committed
        #[arg(long)]
        stop_at: Option<u64>,
        /// Blocks per committed batch
        #[arg(long)]
        batch_size: Option<u64>,
    },

    /// Print the persisted cursor
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete the persisted cursor so the next run starts from start_height
    Reset,

    /// Print the index mappings ChainSync creates
    Schema {
        /// Use 6.x-style mapping types
        #[arg(long)]
        legacy_types: bool,
    },

    /// Show the effective configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut overrides = Overrides {
        cursor_path: cli.cursor_path,
        sync_id: cli.id,
        chain: cli.chain,
        log_level: cli.log_level,
        log_json: cli.log_json,
        ..Default::default()
    };
    if let Commands::Sync {
        rpc_url,
        es_url,
        start_height,
        stop_at,
        batch_size,
    } = &cli.command
    {
        overrides.rpc_url = rpc_url.clone();
        overrides.es_url = es_url.clone();
        overrides.start_height = *start_height;
        overrides.stop_at = *stop_at;
        overrides.batch_size = *batch_size;
    }

    let mut cfg = AppConfig::load(cli.config.as_deref())?;
    cfg.apply(overrides);
    logging::init_tracing(&cfg.log);

    match cli.command {
        Commands::Sync { .. } => cmd_sync(cfg).await,
        Commands::Status { json } => cmd_status(cfg, json).await,
        Commands::Reset => cmd_reset(cfg).await,
        Commands::Schema { legacy_types } => cmd_schema(legacy_types),
        Commands::Info => cmd_info(&cfg),
    }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn cmd_sync(cfg: AppConfig) -> Result<()> {
    cfg.sync.validate()?;

    let rpc = HttpRpcClient::new(&cfg.node.url, cfg.sync.rpc_timeout())?;
    let reader = Arc::new(EvmChainReader::new(rpc));
    let search = Arc::new(ElasticsearchBackend::new(cfg.elasticsearch.clone())?);
    let store = open_cursor_store(&cfg).await?;

    let mut engine = SyncBuilder::from_config(cfg.sync.clone()).build(reader, search, store)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping after the current batch");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!(
        node = %cfg.node.url,
        elasticsearch = %cfg.elasticsearch.url,
        chain = %cfg.sync.chain,
        id = %cfg.sync.id,
        "Starting sync"
    );

    engine
        .run(shutdown_rx)
        .await
        .with_context(|| format!("sync '{}' stopped with a fatal error", cfg.sync.id))?;

    match engine.cursor() {
        Some(c) => println!("Stopped at block {} ({})", c.height, c.hash),
        None => println!("Stopped before initialization"),
    }
    Ok(())
}

async fn cmd_status(cfg: AppConfig, json: bool) -> Result<()> {
    let store = open_cursor_store(&cfg).await?;
    let checkpoint = store.load(&cfg.sync.chain, &cfg.sync.id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        return Ok(());
    }
    match checkpoint {
        Some(cp) => {
            println!("Pipeline  : {}/{}", cp.chain_id, cp.sync_id);
            println!("Height    : {}", cp.height);
            println!("Hash      : {}", cp.hash);
            println!("Updated at: {}", cp.updated_at);
        }
        None => println!(
            "No cursor for {}/{} (next run starts at height {})",
            cfg.sync.chain, cfg.sync.id, cfg.sync.start_height
        ),
    }
    Ok(())
}

async fn cmd_reset(cfg: AppConfig) -> Result<()> {
    let store = open_cursor_store(&cfg).await?;
    CursorManager::new(store, &cfg.sync.chain, &cfg.sync.id)
        .reset()
        .await?;
    println!("Cursor for {}/{} deleted", cfg.sync.chain, cfg.sync.id);
    Ok(())
}

fn cmd_schema(legacy_types: bool) -> Result<()> {
    for schema in all_schemas() {
        println!("PUT /{}", schema.name());
        println!(
            "{}\n",
            serde_json::to_string_pretty(&schema.create_body(legacy_types))?
        );
    }
    Ok(())
}

fn cmd_info(cfg: &AppConfig) -> Result<()> {
    println!("ChainSync v{}", env!("CARGO_PKG_VERSION"));
    println!("Reorg-safe blockchain → Elasticsearch sync\n");
    println!("Indices : esblock, estx, escontract");
    println!(
        "Cursor  : {:?} backend{}",
        cfg.cursor.backend,
        if cfg!(feature = "sqlite") { "" } else { " (sqlite support not compiled in)" }
    );
    println!("\nEffective configuration:");
    print!("{}", serde_yaml::to_string(cfg)?);
    Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

async fn open_cursor_store(cfg: &AppConfig) -> Result<Box<dyn CursorStore>> {
    match cfg.cursor.backend {
        CursorBackend::File => Ok(Box::new(FileCursorStore::new(cfg.cursor.path.clone()))),
        CursorBackend::Sqlite => open_sqlite(cfg).await,
    }
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(cfg: &AppConfig) -> Result<Box<dyn CursorStore>> {
    let path = cfg.cursor.path.to_string_lossy();
    let store = tokio::time::timeout(
        std::time::Duration::from_millis(cfg.sync.index_timeout_ms),
        chainsync_storage::SqliteCursorStore::open(&path),
    )
    .await
    .context("timed out opening the SQLite cursor store")??;
    Ok(Box::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_cfg: &AppConfig) -> Result<Box<dyn CursorStore>> {
    anyhow::bail!("cursor backend 'sqlite' requires building chainsync-cli with `--features sqlite`")
}
