//! # Logging
//!
//! `credreg-node` logs through `tracing`. Output goes to stderr, leaving
//! stdout to command results such as the JSON printed by `status` and the
//! summary printed by `init`.
//!
//! Filtering comes from `RUST_LOG` when it is set, otherwise from the
//! `--log-level` directive string, for example:
//!
//! ```text
//! RUST_LOG=credreg_contracts=debug,credreg_protocol=debug credreg-node run
//! ```
//!
//! At `debug` the ledger logs every committed and rejected call; at `trace`
//! it also logs calls that wrote nothing.

use clap::ValueEnum;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log line format, selected with `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Multi-field text lines with source locations.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Installs the global subscriber for this process.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(directives: &str, format: LogFormat) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    // Exactly one of the two layers is present.
    let (text, json) = match format {
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(true)
                    .with_line_number(true),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(fmt::layer().json().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()?;

    tracing::debug!(?format, "logging ready");
    Ok(())
}
