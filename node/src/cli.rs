//! # CLI Interface
//!
//! Defines the command-line argument structure for `credreg-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use credreg_protocol::config::{DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};
use credreg_protocol::identity::AccountId;

use crate::logging::LogFormat;

/// credreg credential registry node.
///
/// Hosts a single identity and credential registry backed by an embedded
/// database, serves the HTTP/WebSocket API, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "credreg-node",
    about = "credreg credential registry node",
    version,
    propagate_version = true
)]
pub struct CredregNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node and serve the registry API.
    Run(RunArgs),
    /// Deploy a new registry into a data directory.
    Init(InitArgs),
    /// Query the status of a running node via its API endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory holding the registry database.
    #[arg(long, short = 'd', env = "CREDREG_DATA_DIR", default_value = ".credreg")]
    pub data_dir: PathBuf,

    /// Port for the HTTP API.
    #[arg(long, env = "CREDREG_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CREDREG_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Deploy a registry with this admin if the data directory has none.
    #[arg(long, env = "CREDREG_ADMIN")]
    pub admin: Option<AccountId>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(
        long,
        env = "CREDREG_LOG_LEVEL",
        default_value = "credreg_node=info,credreg_contracts=info,credreg_protocol=info,tower_http=debug"
    )]
    pub log_level: String,

    /// Log output format.
    #[arg(long, env = "CREDREG_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "CREDREG_DATA_DIR", default_value = ".credreg")]
    pub data_dir: PathBuf,

    /// Account that deploys the registry and becomes its admin.
    #[arg(long, env = "CREDREG_ADMIN")]
    pub admin: AccountId,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// API endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9841")]
    pub rpc_url: String,
}
