//! Point-in-time serialisable snapshots of a [`crate::Child`] or the
//! [`crate::Supervisor`], plus the optional process-metrics capability.
//!
//! `ChildInfo`/`ServerInfo` are exactly the payloads the `process_state` and
//! `server_state` events carry (see [`crate::event_bus`]) and are what a
//! boundary adapter would serialize as `ChildInfo`/`ServerInfo` over the
//! wire (spec §6).

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::child::config::ChildConfig;
use crate::types::{ChildState, ServerState};

/// Optional OS-level metrics for a running child.
///
/// Populated by a [`MetricsSource`] when one is configured; all fields are
/// best-effort and independently optional because not every platform
/// exposes every figure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub cmdline: Vec<String>,
    pub cpu_time_secs: Option<f64>,
    pub memory_rss_bytes: Option<u64>,
    pub fd_count: Option<u64>,
    pub thread_count: Option<u64>,
}

/// A weak, optional capability: if a metrics source is present, `info()`
/// is enriched with it; if absent (or the pid has already exited), the
/// metrics block degrades to `None` rather than failing the snapshot.
pub trait MetricsSource: Send + Sync {
    fn sample(&self, pid: u32) -> Option<ProcessMetrics>;
}

/// The default metrics source: always empty. Used when no platform metrics
/// collector is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSource for NoopMetrics {
    fn sample(&self, _pid: u32) -> Option<ProcessMetrics> {
        None
    }
}

/// Metrics source backed by the `sysinfo` crate, available behind the
/// `metrics` feature. Degrades to `None` for any pid `sysinfo` can't find
/// (e.g. a zombie that hasn't been reaped yet).
#[cfg(feature = "metrics")]
#[derive(Debug, Default)]
pub struct SysinfoMetrics {
    system: std::sync::Mutex<sysinfo::System>,
}

#[cfg(feature = "metrics")]
impl SysinfoMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "metrics")]
impl MetricsSource for SysinfoMetrics {
    fn sample(&self, pid: u32) -> Option<ProcessMetrics> {
        use sysinfo::{Pid, ProcessRefreshKind};

        let sysinfo_pid = Pid::from_u32(pid);
        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&[sysinfo_pid]),
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_cmd(sysinfo::UpdateKind::Always),
        );
        let process = system.process(sysinfo_pid)?;
        Some(ProcessMetrics {
            cmdline: process
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy().into_owned())
                .collect(),
            cpu_time_secs: Some(f64::from(process.cpu_usage())),
            memory_rss_bytes: Some(process.memory()),
            fd_count: None,
            thread_count: None,
        })
    }
}

/// Point-in-time snapshot of a supervised child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildInfo {
    pub name: String,
    pub config: ChildConfig,
    pub state: ChildState,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub pid: Option<u32>,
    pub last_return_code: Option<i32>,
    pub last_error: Option<String>,
    pub metrics: Option<ProcessMetrics>,
}

/// Point-in-time snapshot of the supervisor aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub hostname: String,
    pub pid: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub state: ServerState,
}

/// Shared handle type used where a metrics source needs to be cloned
/// across children without cloning the underlying collector state.
pub type SharedMetricsSource = Arc<dyn MetricsSource>;
