//! `tracing-subscriber` initialization, mirrored from the teacher's
//! logging setup in its CLI binaries: an `EnvFilter` seeded from
//! `--log-level`/`RUST_LOG`, plus a compact formatted layer to stderr so
//! stdout stays free for a supervised child's own output (children
//! inherit the supervisor's stdio, per `SPEC_FULL.md` §3).

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `default_level` is used only when
/// `RUST_LOG` is unset; an explicit `RUST_LOG` always wins.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
