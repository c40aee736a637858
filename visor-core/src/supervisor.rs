//! The `Supervisor` aggregate: a named collection of [`Child`]s, started
//! and stopped together, each individually addressable by name.
//!
//! `Supervisor` owns no process directly; it is a thin coordination layer
//! over a map of [`Child`] handles plus the aggregate's own `server_state`
//! (spec §4.1, §6 control surface table).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use tracing::info;

// Layer 3: Internal module imports
use crate::child::{Child, ChildConfig};
use crate::error::{ChildError, SupervisorError};
use crate::event_bus::{Event, EventBus};
use crate::info::{ChildInfo, ServerInfo, SharedMetricsSource};
use crate::types::ServerState;

/// Static configuration the `Supervisor` is built from: the name used in
/// `ServerInfo`, and the map of programs it supervises, keyed by
/// [`ChildConfig::name`].
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub server_name: String,
    pub programs: HashMap<String, ChildConfig>,
}

impl SupervisorConfig {
    /// A supervisor named `"visor"` over the given programs. Use
    /// [`SupervisorConfig::with_server_name`] to override the name (e.g.
    /// for multiple supervisors reporting to the same event stream).
    pub fn new(programs: HashMap<String, ChildConfig>) -> Self {
        Self {
            server_name: "visor".to_string(),
            programs,
        }
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }
}

struct Runtime {
    state: ServerState,
    start_time: Option<DateTime<Utc>>,
}

/// The process supervision aggregate.
///
/// Holds one [`Child`] per configured program. `start()`/`stop()` act on
/// every `auto_start` program (or, for `stop`, every program currently
/// running); [`Supervisor::process`] returns a single child's handle for
/// the targeted start/stop/kill operations the control surface exposes.
#[derive(Clone)]
pub struct Supervisor {
    server_name: String,
    children: Arc<HashMap<String, Child>>,
    bus: Arc<EventBus>,
    runtime: Arc<Mutex<Runtime>>,
}

impl Supervisor {
    /// Build a supervisor over `config.programs`, none of them started
    /// yet. Every `Child` shares `bus` so a subscriber on `process_state`
    /// sees events from all of them without per-child wiring.
    pub fn new(config: SupervisorConfig, bus: Arc<EventBus>) -> Self {
        Self::with_metrics(config, bus, Arc::new(crate::info::NoopMetrics))
    }

    /// As [`Supervisor::new`], but every child samples process metrics
    /// through `metrics` (typically `SysinfoMetrics`, behind the `metrics`
    /// feature).
    pub fn with_metrics(config: SupervisorConfig, bus: Arc<EventBus>, metrics: SharedMetricsSource) -> Self {
        let children = config
            .programs
            .into_iter()
            .map(|(name, cfg)| (name, Child::with_metrics(cfg, bus.clone(), metrics.clone())))
            .collect();
        Self {
            server_name: config.server_name,
            children: Arc::new(children),
            bus,
            runtime: Arc::new(Mutex::new(Runtime {
                state: ServerState::Stopped,
                start_time: None,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.server_name
    }

    /// Handle to one configured child, if `name` is one of them.
    pub fn child(&self, name: &str) -> Option<Child> {
        self.children.get(name).cloned()
    }

    /// Every configured child's current snapshot, in no particular order.
    pub fn children(&self) -> Vec<ChildInfo> {
        self.children.values().map(Child::info).collect()
    }

    /// Aggregate snapshot for the `server_state` event payload and the
    /// control surface's status endpoint.
    pub fn info(&self) -> ServerInfo {
        let rt = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
        ServerInfo {
            name: self.server_name.clone(),
            hostname: hostname(),
            pid: std::process::id(),
            start_time: rt.start_time,
            state: rt.state,
        }
    }

    pub fn state(&self) -> ServerState {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    fn set_state(&self, new: ServerState) {
        let old = {
            let mut rt = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
            let old = rt.state;
            rt.state = new;
            if new == ServerState::Starting && rt.start_time.is_none() {
                rt.start_time = Some(Utc::now());
            }
            old
        };
        if old == new {
            return;
        }
        info!(server = %self.server_name, ?old, ?new, "server_state transition");
        self.bus.send(Event::ServerState {
            old,
            new,
            server: self.info(),
        });
    }

    /// Start every `auto_start` program, then declare the supervisor
    /// `Running`. Programs with `auto_start = false` stay `Stopped` until
    /// an explicit [`Supervisor::process`] call starts them.
    ///
    /// A program that is already running (e.g. a second `boot()` call) is
    /// skipped rather than treated as fatal — `start()` is idempotent at
    /// the supervisor level even though [`Child::start`] is not.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.set_state(ServerState::Starting);
        for child in self.children.values() {
            if !child.auto_start() {
                continue;
            }
            match child.start().await {
                Ok(()) | Err(ChildError::AlreadyRunning { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.set_state(ServerState::Running);
        Ok(())
    }

    /// Stop every currently-running child and declare the supervisor
    /// `Stopped` once they have all settled.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        self.set_state(ServerState::Stopping);
        for child in self.children.values() {
            match child.stop().await {
                Ok(()) | Err(ChildError::AlreadyStopped { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.set_state(ServerState::Stopped);
        Ok(())
    }

    /// Force-kill every child immediately, bypassing grace periods.
    pub async fn kill_all(&self) -> Result<(), SupervisorError> {
        self.set_state(ServerState::Stopping);
        for child in self.children.values() {
            match child.kill().await {
                Ok(()) | Err(ChildError::AlreadyStopped { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.set_state(ServerState::Stopped);
        Ok(())
    }

    /// Start a single named program.
    pub async fn start_process(&self, name: &str) -> Result<(), SupervisorError> {
        self.lookup(name)?.start().await.map_err(Into::into)
    }

    /// Gracefully stop a single named program.
    pub async fn stop_process(&self, name: &str) -> Result<(), SupervisorError> {
        self.lookup(name)?.stop().await.map_err(Into::into)
    }

    /// Force-kill a single named program.
    pub async fn kill_process(&self, name: &str) -> Result<(), SupervisorError> {
        self.lookup(name)?.kill().await.map_err(Into::into)
    }

    /// Stop then start a single named program. Not atomic with respect to
    /// other callers racing the same name — each half goes through the
    /// normal `Child` concurrency guards.
    pub async fn restart_process(&self, name: &str) -> Result<(), SupervisorError> {
        let child = self.lookup(name)?;
        match child.stop().await {
            Ok(()) | Err(ChildError::AlreadyStopped { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        child.start().await.map_err(Into::into)
    }

    fn lookup(&self, name: &str) -> Result<Child, SupervisorError> {
        self.children
            .get(name)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound { name: name.to_string() })
    }
}

fn hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string())
    }
    #[cfg(not(unix))]
    {
        std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> SupervisorConfig {
        let mut programs = HashMap::new();
        programs.insert(
            "sleeper".to_string(),
            ChildConfig::new("sleeper", vec!["sleep".into(), "5".into()])
                .with_start_secs(Duration::from_millis(50)),
        );
        programs.insert(
            "manual".to_string(),
            ChildConfig::new("manual", vec!["sleep".into(), "5".into()])
                .with_start_secs(Duration::from_millis(50))
                .with_auto_start(false),
        );
        SupervisorConfig::new(programs)
    }

    #[tokio::test]
    async fn start_brings_up_auto_start_children_only() {
        let bus = Arc::new(EventBus::new());
        let supervisor = Supervisor::new(config(), bus);
        supervisor.start().await.expect("start");

        assert_eq!(supervisor.state(), ServerState::Running);
        assert!(supervisor.child("sleeper").unwrap().state().is_running());
        assert_eq!(supervisor.child("manual").unwrap().state(), crate::types::ChildState::Stopped);

        supervisor.stop().await.expect("stop");
        assert_eq!(supervisor.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn unknown_process_name_is_not_found() {
        let bus = Arc::new(EventBus::new());
        let supervisor = Supervisor::new(config(), bus);
        let err = supervisor.start_process("nope").await.expect_err("missing child");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn manual_child_can_be_started_explicitly() {
        let bus = Arc::new(EventBus::new());
        let supervisor = Supervisor::new(config(), bus);
        supervisor.start_process("manual").await.expect("manual start");
        assert!(supervisor.child("manual").unwrap().state().is_running());
        supervisor.stop_process("manual").await.expect("manual stop");
    }
}
