//! Command-line surface for the `visor` binary.

// Layer 1: Standard library imports
use std::path::PathBuf;

// Layer 2: Third-party crate imports
use clap::Parser;

/// A small process supervisor: runs the programs listed in a TOML config
/// file, restarting failed starts with linear backoff, until it receives
/// `SIGINT`/`SIGTERM`.
#[derive(Debug, Parser)]
#[command(name = "visor", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Override the config's `pidfile` setting; pass an empty string to
    /// disable the pidfile entirely regardless of the config.
    #[arg(long, value_name = "FILE")]
    pub pidfile: Option<PathBuf>,

    /// Default `tracing` filter directive, overridden by `RUST_LOG` if set.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}
