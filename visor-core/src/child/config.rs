//! `ChildConfig` — the immutable, already-validated description of one
//! supervised program.
//!
//! Defaults (applied by whatever parsing collaborator produces a
//! `ChildConfig`, not by this type itself — see `visor::config` for the
//! concrete TOML instance): `environment = inherit`, `directory = inherit`,
//! `exit_codes = {0}`, `start_secs = 1`, `start_retries = 3`,
//! `auto_start = true`, `stop_signal = SIGTERM`, `umask = inherit`,
//! `resources = {}`.

// Layer 1: Standard library imports
use std::collections::{HashMap, HashSet};
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

/// How to obtain the argument vector for the child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Spawn directly with this argv, no shell involved.
    Argv(Vec<String>),
    /// Run through `/bin/sh -c <line>` (or the platform shell).
    Shell(String),
}

impl Command {
    /// Resolve to the literal `(program, args)` pair `tokio::process::Command`
    /// needs, applying the shell indirection when configured.
    pub fn resolve(&self) -> (String, Vec<String>) {
        match self {
            Command::Argv(argv) => {
                let mut iter = argv.iter().cloned();
                let program = iter.next().unwrap_or_default();
                (program, iter.collect())
            }
            Command::Shell(line) => {
                #[cfg(unix)]
                let shell = "/bin/sh".to_string();
                #[cfg(windows)]
                let shell = "cmd".to_string();
                #[cfg(unix)]
                let flag = "-c".to_string();
                #[cfg(windows)]
                let flag = "/C".to_string();
                (shell, vec![flag, line.clone()])
            }
        }
    }
}

/// Environment variables passed to the child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Inherit the supervisor's own environment untouched.
    Inherit,
    /// Inherit the supervisor's environment, then apply these overrides.
    Merge(HashMap<String, String>),
    /// Use exactly this environment, nothing inherited.
    Exact(HashMap<String, String>),
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Inherit
    }
}

/// Working directory for the child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directory {
    /// Inherit the supervisor's current working directory.
    Inherit,
    /// `chdir` to this path before exec.
    Path(String),
}

impl Default for Directory {
    fn default() -> Self {
        Directory::Inherit
    }
}

/// Immutable, per-program configuration.
///
/// `name` must be unique within a [`crate::Supervisor`]; everything else is
/// exactly the data `spec.md` §3 describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildConfig {
    /// Filled in from the enclosing table key by whatever parsing
    /// collaborator builds this from a config file — see `visor::config`
    /// for the concrete TOML instance. Defaults to empty so the field can
    /// be omitted from a single program's table.
    #[serde(default)]
    pub name: String,
    pub command: Command,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub directory: Directory,
    /// POSIX only; `None` means inherit the supervisor's user.
    #[serde(default)]
    pub user: Option<String>,
    /// POSIX only; `None` means inherit the supervisor's umask.
    #[serde(default)]
    pub umask: Option<u32>,
    /// rlimit name (e.g. `"nofile"`, `"cpu"`) to soft limit.
    #[serde(default)]
    pub resources: HashMap<String, u64>,
    /// POSIX signal number sent by a graceful `stop()`. Ignored on
    /// platforms without POSIX signals.
    #[serde(default = "default_stop_signal")]
    pub stop_signal: i32,
    /// Seconds a process must stay up before being declared `Running`.
    #[serde(default = "default_start_secs", with = "duration_secs")]
    pub start_secs: Duration,
    /// Additional attempts after the first.
    #[serde(default = "default_start_retries")]
    pub start_retries: u32,
    /// Grace period before a `stop()` force-kills.
    #[serde(default = "default_stop_wait_secs", with = "duration_secs")]
    pub stop_wait_secs: Duration,
    /// Exit codes treated as a clean stop rather than a failure signal to
    /// operators reading `last_return_code` (the retry/backoff logic in
    /// §4.2 does not distinguish by code, only by timing; this set is
    /// surfaced for boundary adapters and dashboards).
    #[serde(default = "default_exit_codes")]
    pub exit_codes: HashSet<i32>,
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

fn default_stop_signal() -> i32 {
    15 // SIGTERM
}

fn default_start_secs() -> Duration {
    Duration::from_secs(1)
}

fn default_start_retries() -> u32 {
    3
}

fn default_stop_wait_secs() -> Duration {
    Duration::from_secs(10)
}

fn default_exit_codes() -> HashSet<i32> {
    HashSet::from([0])
}

fn default_auto_start() -> bool {
    true
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl ChildConfig {
    /// Construct a config with every default applied, overriding only
    /// `name` and `command`. Convenience for tests and small embedders;
    /// a real config loader deserializes a `ChildConfig` directly.
    pub fn new(name: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: Command::Argv(argv),
            environment: Environment::Inherit,
            directory: Directory::Inherit,
            user: None,
            umask: None,
            resources: HashMap::new(),
            stop_signal: default_stop_signal(),
            start_secs: default_start_secs(),
            start_retries: default_start_retries(),
            stop_wait_secs: default_stop_wait_secs(),
            exit_codes: default_exit_codes(),
            auto_start: default_auto_start(),
        }
    }

    pub fn with_start_secs(mut self, secs: Duration) -> Self {
        self.start_secs = secs;
        self
    }

    pub fn with_start_retries(mut self, retries: u32) -> Self {
        self.start_retries = retries;
        self
    }

    pub fn with_stop_wait_secs(mut self, secs: Duration) -> Self {
        self.stop_wait_secs = secs;
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_command_resolves_program_and_args() {
        let cmd = Command::Argv(vec!["echo".into(), "hi".into()]);
        let (program, args) = cmd.resolve();
        assert_eq!(program, "echo");
        assert_eq!(args, vec!["hi".to_string()]);
    }

    #[test]
    fn shell_command_wraps_in_shell_invocation() {
        let cmd = Command::Shell("echo hi && exit 0".into());
        let (program, args) = cmd.resolve();
        #[cfg(unix)]
        {
            assert_eq!(program, "/bin/sh");
            assert_eq!(args, vec!["-c".to_string(), "echo hi && exit 0".to_string()]);
        }
        let _ = program;
        let _ = args;
    }

    #[test]
    fn builder_defaults_match_spec() {
        let cfg = ChildConfig::new("x", vec!["true".into()]);
        assert_eq!(cfg.start_retries, 3);
        assert_eq!(cfg.start_secs, Duration::from_secs(1));
        assert_eq!(cfg.exit_codes, HashSet::from([0]));
        assert!(cfg.auto_start);
        assert_eq!(cfg.stop_signal, 15);
    }
}
