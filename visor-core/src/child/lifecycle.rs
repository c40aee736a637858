//! The `Child` lifecycle driver: spawn, supervise, restart with backoff,
//! and terminate one program, publishing every transition on the event
//! bus as it happens (spec §4.2).
//!
//! Concurrency model: `state` is a [`watch`] channel — cheap to read from
//! any number of callers, and the natural primitive for "wait until this
//! becomes one of {Stopped, Exited, Fatal, Unknown}". Everything else
//! that changes together with a state transition (pid, timestamps, last
//! exit code) lives behind a plain [`std::sync::Mutex`] that is never held
//! across an `.await`. `start()` is serialized by its own async mutex so
//! two concurrent `start()` calls can't both observe a startable state and
//! both spawn a driver; `stop()`/`kill()` share a "terminating" flag inside
//! `Runtime` so that of any number of concurrent terminate calls, exactly
//! one sends a signal and all of them await the same terminal state.

// Layer 1: Standard library imports
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use tokio::process::Command as TokioCommand;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

// Layer 3: Internal module imports
use crate::child::config::{ChildConfig, Directory, Environment};
#[cfg(unix)]
use crate::child::rlimit;
use crate::error::ChildError;
use crate::event_bus::{Event, EventBus};
use crate::info::{ChildInfo, NoopMetrics, SharedMetricsSource};
use crate::types::ChildState;

/// POSIX `SIGKILL`. Used directly rather than through `nix::sys::signal`'s
/// enum so the constant is available on every target, including the
/// `cfg(windows)` arm of [`send_signal`].
const SIGKILL: i32 = 9;

/// Cap so a misbehaving config (many `startRetries`) can't produce an
/// hours-long sleep between attempts.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Resolved to a config's open question: backoff is linear, not
/// exponential, and grows with the *retry* attempt number. Spec §8's
/// "Linear backoff" law requires the n-th sleep to be `>= n` seconds, so
/// the unit here is whole seconds, not a sub-second base.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(attempt.max(1) as u64).min(BACKOFF_CAP)
}

struct Runtime {
    pid: Option<u32>,
    start_time: Option<DateTime<Utc>>,
    stop_time: Option<DateTime<Utc>>,
    last_return_code: Option<i32>,
    last_error: Option<String>,
    /// Set by whichever `stop()`/`kill()` call first wins the race to
    /// actually signal the process. Cleared by `start()`.
    terminating: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            pid: None,
            start_time: None,
            stop_time: None,
            last_return_code: None,
            last_error: None,
            terminating: false,
        }
    }
}

struct Shared {
    name: String,
    config: ChildConfig,
    bus: Arc<EventBus>,
    metrics: SharedMetricsSource,
    state: watch::Sender<ChildState>,
    runtime: Mutex<Runtime>,
    /// Generation counter: bumped by `start()` before spawning a new
    /// driver. A driver task reads its own generation at birth and
    /// refuses to touch shared state once a newer generation has started
    /// (guards against a slow, stale driver racing a restart).
    generation: AtomicU32,
}

impl Shared {
    fn snapshot(&self, state: ChildState) -> ChildInfo {
        let rt = self.runtime.lock().unwrap_or_else(|e| e.into_inner());
        let metrics = rt.pid.and_then(|pid| self.metrics.sample(pid));
        ChildInfo {
            name: self.name.clone(),
            config: self.config.clone(),
            state,
            start_time: rt.start_time,
            stop_time: rt.stop_time,
            pid: rt.pid,
            last_return_code: rt.last_return_code,
            last_error: rt.last_error.clone(),
            metrics,
        }
    }

    /// Move to `new`, publishing a `process_state` event unless this is a
    /// no-op transition (the driver sometimes re-asserts a state it's
    /// already in when resuming after a guard check).
    fn set_state(&self, new: ChildState) {
        let old = *self.state.borrow();
        if old == new {
            return;
        }
        let _ = self.state.send_replace(new);
        let info = self.snapshot(new);
        debug!(child = %self.name, ?old, ?new, "process_state transition");
        self.bus.send(Event::ProcessState {
            old,
            new,
            process: info,
        });
    }

    fn current_pid(&self) -> Option<u32> {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner()).pid
    }
}

/// A single supervised program.
///
/// Cloning a `Child` is cheap and shares the same underlying state — every
/// clone observes the same driver, the same pid, the same event stream.
/// [`crate::Supervisor`] hands out clones rather than references for this
/// reason.
#[derive(Clone)]
pub struct Child {
    shared: Arc<Shared>,
    start_guard: Arc<AsyncMutex<()>>,
}

impl Child {
    /// Construct a child in the `Stopped` state. Does not spawn anything;
    /// call [`Child::start`] to bring it up.
    pub fn new(config: ChildConfig, bus: Arc<EventBus>) -> Self {
        Self::with_metrics(config, bus, Arc::new(NoopMetrics))
    }

    /// As [`Child::new`], but with an explicit [`crate::info::MetricsSource`]
    /// (e.g. `SysinfoMetrics` behind the `metrics` feature).
    pub fn with_metrics(config: ChildConfig, bus: Arc<EventBus>, metrics: SharedMetricsSource) -> Self {
        let (tx, _rx) = watch::channel(ChildState::Stopped);
        let shared = Arc::new(Shared {
            name: config.name.clone(),
            config,
            bus,
            metrics,
            state: tx,
            runtime: Mutex::new(Runtime::default()),
            generation: AtomicU32::new(0),
        });
        Self {
            shared,
            start_guard: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> ChildState {
        *self.shared.state.borrow()
    }

    /// Point-in-time snapshot, including a metrics sample if a source is
    /// configured and the process is alive.
    pub fn info(&self) -> ChildInfo {
        self.shared.snapshot(self.state())
    }

    /// Whether this child's configuration asks to be brought up
    /// automatically by [`crate::Supervisor::start`].
    pub fn auto_start(&self) -> bool {
        self.shared.config.auto_start
    }

    /// Seconds since the current run started, or `None` if the process
    /// isn't currently up.
    pub fn uptime(&self) -> Option<i64> {
        let rt = self.shared.runtime.lock().unwrap_or_else(|e| e.into_inner());
        rt.start_time.map(|t| (Utc::now() - t).num_seconds())
    }

    /// Seconds since the last time this child stopped, or `None` if it has
    /// never stopped (including: never started).
    pub fn downtime(&self) -> Option<i64> {
        let rt = self.shared.runtime.lock().unwrap_or_else(|e| e.into_inner());
        rt.stop_time.map(|t| (Utc::now() - t).num_seconds())
    }

    /// Begin the lifecycle driver. Returns once the transition to
    /// `Starting` has been published; does not wait for `Running`.
    ///
    /// Errors if the child is already running ([`ChildError::AlreadyRunning`])
    /// or in a non-startable state such as `Stopping`
    /// ([`ChildError::IllegalState`]).
    pub async fn start(&self) -> Result<(), ChildError> {
        let _guard = self.start_guard.lock().await;
        let state = self.state();
        if state.is_running() {
            return Err(ChildError::AlreadyRunning {
                name: self.shared.name.clone(),
            });
        }
        if !state.is_startable() {
            return Err(ChildError::IllegalState {
                name: self.shared.name.clone(),
                action: "start",
                state,
            });
        }
        {
            let mut rt = self.shared.runtime.lock().unwrap_or_else(|e| e.into_inner());
            rt.terminating = false;
            rt.last_error = None;
            rt.last_return_code = None;
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.set_state(ChildState::Starting);
        let shared = self.shared.clone();
        tokio::spawn(async move {
            run_driver(shared, generation).await;
        });
        Ok(())
    }

    /// Graceful stop: send `stop_signal`, wait up to `stop_wait_secs`, then
    /// escalate to `SIGKILL` if the process hasn't exited.
    ///
    /// A child in `Backoff` has no live process; `stop()` moves it
    /// straight to `Stopped`. Multiple concurrent callers all resolve once
    /// the child reaches a stopped state; only the first actually sends a
    /// signal.
    pub async fn stop(&self) -> Result<(), ChildError> {
        self.terminate(self.shared.config.stop_signal, Some(self.shared.config.stop_wait_secs))
            .await
    }

    /// Immediate `SIGKILL`, no grace period. Same concurrency and
    /// `Backoff` shortcut semantics as [`Child::stop`].
    pub async fn kill(&self) -> Result<(), ChildError> {
        self.terminate(SIGKILL, None).await
    }

    async fn terminate(&self, signal: i32, grace: Option<Duration>) -> Result<(), ChildError> {
        let state = self.state();
        if state.is_stopped() {
            return Err(ChildError::AlreadyStopped {
                name: self.shared.name.clone(),
            });
        }
        if !state.is_stoppable() {
            return Err(ChildError::IllegalState {
                name: self.shared.name.clone(),
                action: "stop",
                state,
            });
        }
        if state == ChildState::Backoff {
            // No live process: the driver is asleep between attempts.
            // Bumping the generation makes it a no-op if it wakes up.
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            self.shared.set_state(ChildState::Stopped);
            return Ok(());
        }

        let first = {
            let mut rt = self.shared.runtime.lock().unwrap_or_else(|e| e.into_inner());
            if rt.terminating {
                false
            } else {
                rt.terminating = true;
                true
            }
        };

        if first {
            self.shared.set_state(ChildState::Stopping);
            let shared = self.shared.clone();
            tokio::spawn(async move {
                signal_and_escalate(shared, signal, grace).await;
            });
        }

        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|s| s.is_stopped()).await;
        Ok(())
    }
}

/// Wait for the driver to have recorded a pid (it may still be inside
/// `spawn()`), or for the child to have already become stopped because
/// the spawn itself failed. Polling is a pragmatic compromise: the window
/// is normally one scheduler tick, and there is no pid-available
/// notification primitive worth adding one-shot channels for.
async fn wait_for_pid(shared: &Arc<Shared>) -> Option<u32> {
    for _ in 0..50 {
        if let Some(pid) = shared.current_pid() {
            return Some(pid);
        }
        if shared.state.borrow().is_stopped() {
            return None;
        }
        sleep(Duration::from_millis(20)).await;
    }
    shared.current_pid()
}

async fn signal_and_escalate(shared: Arc<Shared>, signal: i32, grace: Option<Duration>) {
    let Some(pid) = wait_for_pid(&shared).await else {
        return;
    };
    send_signal(pid, signal);
    let Some(grace) = grace else {
        return;
    };
    let mut rx = shared.state.subscribe();
    let became_stopped = timeout(grace, rx.wait_for(|s| s.is_stopped())).await;
    if became_stopped.is_err() {
        warn!(pid, "stop grace period elapsed, escalating to SIGKILL");
        if let Some(pid) = shared.current_pid() {
            send_signal(pid, SIGKILL);
        }
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let Ok(signal) = Signal::try_from(signal) else {
        warn!(pid, signal, "unrecognised signal number, ignoring");
        return;
    };
    // ESRCH just means the process already exited; nothing to report.
    let _ = kill(Pid::from_raw(pid as i32), signal);
}

#[cfg(windows)]
fn send_signal(pid: u32, signal: i32) {
    let mut cmd = std::process::Command::new("taskkill");
    cmd.arg("/PID").arg(pid.to_string());
    if signal == SIGKILL {
        cmd.arg("/F");
    }
    let _ = cmd.status();
}

/// Extract the exit code a caller can compare against `exit_codes`: the
/// normal `ExitStatus::code()` when the process exited on its own, or the
/// negated signal number (matching the original implementation's
/// convention) when it was killed by a signal.
fn exit_code(status: std::io::Result<std::process::ExitStatus>) -> Option<i32> {
    let status = status.ok()?;
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        return status.signal().map(|signal| -signal);
    }
    #[cfg(not(unix))]
    {
        None
    }
}

fn record_exit(shared: &Shared, code: Option<i32>) {
    let mut rt = shared.runtime.lock().unwrap_or_else(|e| e.into_inner());
    rt.last_return_code = code;
    rt.stop_time = Some(Utc::now());
    rt.pid = None;
}

fn record_spawn_error(shared: &Shared, error: &std::io::Error) {
    let mut rt = shared.runtime.lock().unwrap_or_else(|e| e.into_inner());
    rt.last_error = Some(error.to_string());
    rt.stop_time = Some(Utc::now());
}

fn is_current_generation(shared: &Shared, generation: u32) -> bool {
    shared.generation.load(Ordering::SeqCst) == generation
}

async fn spawn_child(shared: &Shared) -> std::io::Result<tokio::process::Child> {
    let (program, args) = shared.config.command.resolve();
    let mut cmd = TokioCommand::new(program);
    cmd.args(args);

    match &shared.config.environment {
        Environment::Inherit => {}
        Environment::Merge(vars) => {
            for (k, v) in vars {
                cmd.env(k, v);
            }
        }
        Environment::Exact(vars) => {
            cmd.env_clear();
            for (k, v) in vars {
                cmd.env(k, v);
            }
        }
    }

    if let Directory::Path(path) = &shared.config.directory {
        cmd.current_dir(path);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());

    #[cfg(unix)]
    {
        if let Some(user) = &shared.config.user {
            match nix::unistd::User::from_name(user) {
                Ok(Some(user)) => {
                    cmd.uid(user.uid.as_raw());
                    cmd.gid(user.gid.as_raw());
                }
                Ok(None) => {
                    warn!(child = %shared.name, %user, "configured user not found, spawning as self");
                }
                Err(err) => {
                    warn!(child = %shared.name, %user, %err, "failed to resolve user, spawning as self");
                }
            }
        }

        let resources = shared.config.resources.clone();
        let umask = shared.config.umask;
        for name in rlimit::unrecognised_names(&resources) {
            warn!(child = %shared.name, resource = %name, "ignoring unrecognised resource limit");
        }
        // Safety: the closure only calls async-signal-safe libc wrappers
        // (setsid, umask, getrlimit/setrlimit) between fork and exec, per
        // the contract of `pre_exec`.
        unsafe {
            cmd.pre_exec(move || {
                nix::unistd::setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                if let Some(mask) = umask {
                    nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(mask));
                }
                rlimit::apply(&resources)?;
                Ok(())
            });
        }
    }

    cmd.spawn()
}

/// The lifecycle driver: owns every transition out of `Starting` for one
/// `start()` call. Spawns, races the `start_secs` settle timer against an
/// early exit, and on a sustained run waits out the process before
/// deciding between `Exited`/`Fatal`/`Stopped` (spec §4.2, with the
/// `Stopping -> Stopped` resolution taken from the equivalent check in the
/// original implementation's `terminate()` path).
async fn run_driver(shared: Arc<Shared>, generation: u32) {
    let mut attempt: u32 = 0;

    loop {
        if !is_current_generation(&shared, generation) {
            return;
        }

        shared.set_state(ChildState::Starting);

        let mut child = match spawn_child(&shared).await {
            Ok(child) => child,
            Err(err) => {
                warn!(child = %shared.name, error = %err, "spawn failed");
                record_spawn_error(&shared, &err);
                if !retry_or_fatal(&shared, generation, &mut attempt).await {
                    return;
                }
                continue;
            }
        };

        {
            let mut rt = shared.runtime.lock().unwrap_or_else(|e| e.into_inner());
            rt.pid = child.id();
            rt.start_time = Some(Utc::now());
        }

        let start_secs = shared.config.start_secs;
        let exited_early = tokio::select! {
            status = child.wait() => Some(status),
            _ = sleep(start_secs) => None,
        };

        match exited_early {
            Some(status) => {
                let code = exit_code(status);
                if !is_current_generation(&shared, generation) {
                    return;
                }
                if shared.state.borrow().clone() == ChildState::Stopping {
                    record_exit(&shared, code);
                    shared.set_state(ChildState::Stopped);
                    return;
                }
                record_exit(&shared, code);
                info!(child = %shared.name, ?code, attempt, "exited before settling, treating as failed start");
                if !retry_or_fatal(&shared, generation, &mut attempt).await {
                    return;
                }
                continue;
            }
            None => {
                if !is_current_generation(&shared, generation) {
                    return;
                }
                shared.set_state(ChildState::Running);
            }
        }

        let status = child.wait().await;
        let code = exit_code(status);
        if !is_current_generation(&shared, generation) {
            return;
        }
        let stopping = shared.state.borrow().clone() == ChildState::Stopping;
        record_exit(&shared, code);
        if stopping {
            shared.set_state(ChildState::Stopped);
        } else {
            info!(child = %shared.name, ?code, "process exited on its own");
            shared.set_state(ChildState::Exited);
        }
        return;
    }
}

/// Shared tail of both spawn-failure and early-exit handling: if the
/// child was asked to stop while the driver was mid-attempt, honor that
/// request instead of retrying; otherwise either back off and retry or,
/// past `start_retries`, give up permanently.
///
/// Returns `true` if the driver should loop back and try again.
async fn retry_or_fatal(shared: &Arc<Shared>, generation: u32, attempt: &mut u32) -> bool {
    if shared.state.borrow().clone() == ChildState::Stopping {
        shared.set_state(ChildState::Stopped);
        return false;
    }
    if *attempt >= shared.config.start_retries {
        shared.set_state(ChildState::Fatal);
        return false;
    }
    *attempt += 1;
    shared.set_state(ChildState::Backoff);
    sleep(backoff_delay(*attempt)).await;
    if !is_current_generation(shared, generation) {
        return false;
    }
    if shared.state.borrow().clone() != ChildState::Backoff {
        // stop()/kill() forced a different state while we slept.
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::child::config::ChildConfig;

    fn bus() -> Arc<EventBus> {
        Arc::new(EventBus::new())
    }

    #[tokio::test]
    async fn starts_and_settles_into_running() {
        let config = ChildConfig::new("sleeper", vec!["sleep".into(), "5".into()])
            .with_start_secs(Duration::from_millis(50));
        let child = Child::new(config, bus());
        child.start().await.expect("start");

        let mut rx = child.shared.state.subscribe();
        let reached = timeout(Duration::from_secs(2), rx.wait_for(|s| *s == ChildState::Running)).await;
        assert!(reached.is_ok(), "expected child to reach Running");

        child.kill().await.expect("kill");
        assert!(child.state().is_stopped());
    }

    #[tokio::test]
    async fn exhausting_retries_on_a_failing_command_reaches_fatal() {
        let config = ChildConfig::new("bad", vec!["false".into()])
            .with_start_secs(Duration::from_millis(200))
            .with_start_retries(1);
        let child = Child::new(config, bus());
        child.start().await.expect("start");

        let mut rx = child.shared.state.subscribe();
        let reached = timeout(Duration::from_secs(5), rx.wait_for(|s| *s == ChildState::Fatal)).await;
        assert!(reached.is_ok(), "expected child to reach Fatal after exhausting retries");
    }

    #[tokio::test]
    async fn start_while_running_is_rejected() {
        let config = ChildConfig::new("sleeper", vec!["sleep".into(), "5".into()])
            .with_start_secs(Duration::from_millis(50));
        let child = Child::new(config, bus());
        child.start().await.expect("start");

        let mut rx = child.shared.state.subscribe();
        let _ = timeout(Duration::from_secs(2), rx.wait_for(|s| s.is_running())).await;

        let err = child.start().await.expect_err("second start should fail");
        assert!(err.is_already_running() || err.is_illegal_state());

        child.kill().await.expect("kill");
    }

    #[tokio::test]
    async fn stop_on_backoff_short_circuits_to_stopped_without_waiting() {
        let config = ChildConfig::new("bad", vec!["false".into()])
            .with_start_secs(Duration::from_millis(500))
            .with_start_retries(5);
        let child = Child::new(config, bus());
        child.start().await.expect("start");

        let mut rx = child.shared.state.subscribe();
        let reached = timeout(Duration::from_secs(5), rx.wait_for(|s| *s == ChildState::Backoff)).await;
        assert!(reached.is_ok(), "expected Backoff before retries exhaust");

        child.stop().await.expect("stop from Backoff");
        assert_eq!(child.state(), ChildState::Stopped);
    }

    #[tokio::test]
    async fn concurrent_stop_calls_both_resolve() {
        let config = ChildConfig::new("sleeper", vec!["sleep".into(), "5".into()])
            .with_start_secs(Duration::from_millis(50));
        let child = Child::new(config, bus());
        child.start().await.expect("start");
        let mut rx = child.shared.state.subscribe();
        let _ = timeout(Duration::from_secs(2), rx.wait_for(|s| s.is_running())).await;

        let a = child.clone();
        let b = child.clone();
        let (ra, rb) = tokio::join!(
            async move { a.stop().await },
            async move { b.stop().await },
        );
        assert!(ra.is_ok());
        assert!(rb.is_ok());
        assert!(child.state().is_stopped());
    }
}
