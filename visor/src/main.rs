//! `visor` — runs the programs described by a TOML config file under
//! `visor-core`'s supervision until asked to stop.

mod cli;
mod config;
mod logging;
mod pidfile;
mod signals;
mod wire;

use std::sync::Arc;

use tracing::{error, info};

use cli::Cli;
use pidfile::Pidfile;
use visor_core::event_bus::EventBus;
use visor_core::Supervisor;

#[tokio::main]
async fn main() {
    let cli = Cli::init();
    logging::init(&cli.log_level);

    if let Err(err) = run(cli).await {
        error!(%err, "visor exited with an error");
        std::process::exit(1);
    }
}

/// Separated from `main` so error formatting goes through `tracing`
/// (consistent with every other log line) rather than the default
/// `Debug` panic-style output a bare `Result` return from `main` would
/// produce.
async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let main_config = config::load(&cli.config)?;

    let pidfile_path = cli.pidfile.map(|p| p.display().to_string()).or(main_config.pidfile);
    let _pidfile = match pidfile_path {
        Some(path) if !path.is_empty() => Some(Pidfile::acquire(path)?),
        _ => None,
    };

    let bus = Arc::new(EventBus::new());
    let supervisor = Supervisor::new(main_config.supervisor, bus);

    info!(server = supervisor.name(), "starting supervisor");
    supervisor.start().await?;

    signals::wait_for_shutdown(&supervisor).await;

    info!("supervisor stopped, exiting");
    Ok(())
}
