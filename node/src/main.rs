// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # credreg Node
//!
//! Entry point for the `credreg-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the registry database, and serves
//! the HTTP/WS API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — serve the registry
//! - `init`    — deploy a new registry into a data directory
//! - `status`  — query a running node's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use credreg_contracts::ledger::Ledger;
use credreg_protocol::identity::RequestContext;
use credreg_protocol::storage::{RegistryDB, RegistryStore};

use cli::{Commands, CredregNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

/// Timeout for `credreg-node status`.
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CredregNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("db")
}

fn open_db(data_dir: &Path) -> Result<RegistryDB> {
    let path = db_path(data_dir);
    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create database directory: {}", path.display()))?;
    let db = RegistryDB::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    tracing::info!(path = %path.display(), "database opened");
    Ok(db)
}

/// Serves the registry: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(&args.log_level, args.log_format)
        .context("failed to initialize logging")?;

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting credreg-node"
    );

    // --- Registry ---
    let store: Arc<dyn RegistryStore> = Arc::new(open_db(&args.data_dir)?);
    let ledger = match args.admin {
        Some(admin) => Ledger::open_or_deploy(store, &RequestContext::at_current_time(admin)),
        None => Ledger::open(store),
    }
    .context("failed to load registry (deploy one with `credreg-node init --admin <account>`)")?;
    let ledger = Arc::new(ledger);

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.set_event_height(ledger.latest_sequence()?);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            credreg_protocol::config::PROTOCOL_VERSION,
        ),
        ledger: Arc::clone(&ledger),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!(latest_sequence = ?ledger.latest_sequence()?, "credreg-node stopped");
    Ok(())
}

/// Deploys a new registry into the data directory.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("credreg_node=info", LogFormat::Pretty)
        .context("failed to initialize logging")?;

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), admin = %args.admin, "initializing registry");

    let db = open_db(data_dir)?;
    let ledger = Ledger::deploy(db, &RequestContext::at_current_time(args.admin))
        .with_context(|| format!("failed to deploy registry in {}", data_dir.display()))?;
    ledger.store().flush().context("failed to flush database")?;

    println!("Registry deployed successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Database       : {}", db_path(data_dir).display());
    println!("  Admin          : {}", ledger.admin());

    Ok(())
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let status = fetch_status(&args.rpc_url).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Fetches `GET {rpc_url}/status`. Non-2xx responses are errors.
async fn fetch_status(rpc_url: &str) -> Result<serde_json::Value> {
    let url = format!("{}/status", rpc_url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .get(&url)
        .timeout(STATUS_TIMEOUT)
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("{} returned {}", url, status);
    }

    response
        .json()
        .await
        .with_context(|| format!("invalid status response from {}", url))
}

/// Prints version information to stdout.
fn print_version() {
    println!("credreg-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol     {}", credreg_protocol::config::PROTOCOL_VERSION);
    println!("rustc        {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
