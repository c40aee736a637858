//! Closed state variants for children and the supervisor aggregate.
//!
//! Both enums are total: every predicate used to gate a lifecycle
//! transition is expressed as a pattern match here rather than as an
//! ad-hoc integer comparison, so the compiler enforces that new states
//! are accounted for everywhere they matter.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single supervised child.
///
/// See the predicate methods below for the derived sets used to gate
/// `start`/`stop`/`kill`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChildState {
    Stopped,
    Starting,
    Running,
    Backoff,
    Stopping,
    Exited,
    Fatal,
    /// Reserved for recovered or unrecognised states. The core never enters
    /// this state spontaneously; it exists so external state (e.g. a
    /// resumed snapshot) has somewhere safe to land.
    Unknown,
}

impl ChildState {
    /// `{Stopped, Exited, Fatal, Unknown}` — no OS process exists.
    pub fn is_stopped(self) -> bool {
        matches!(
            self,
            Self::Stopped | Self::Exited | Self::Fatal | Self::Unknown
        )
    }

    /// `{Starting, Running, Backoff}` — a lifecycle driver is live.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Backoff)
    }

    /// `{Stopped, Exited, Fatal, Backoff}` — `start()` is legal.
    pub fn is_startable(self) -> bool {
        matches!(
            self,
            Self::Stopped | Self::Exited | Self::Fatal | Self::Backoff
        )
    }

    /// `{Starting, Running, Backoff, Unknown}` — `stop()`/`kill()` is legal.
    pub fn is_stoppable(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Running | Self::Backoff | Self::Unknown
        )
    }

    /// Stable lowercase wire name, used by the `process_state` event payload
    /// and any boundary adapter serializing to JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Backoff => "Backoff",
            Self::Stopping => "Stopping",
            Self::Exited => "Exited",
            Self::Fatal => "Fatal",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ChildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse lifecycle state of the supervisor aggregate itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ServerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_state_predicate_sets_match_spec() {
        for state in [
            ChildState::Stopped,
            ChildState::Exited,
            ChildState::Fatal,
            ChildState::Unknown,
        ] {
            assert!(state.is_stopped(), "{state:?} should be stopped");
        }
        for state in [ChildState::Starting, ChildState::Running, ChildState::Backoff] {
            assert!(state.is_running(), "{state:?} should be running");
            assert!(!state.is_stopped(), "{state:?} should not be stopped");
        }
        assert!(!ChildState::Stopping.is_running());
        assert!(!ChildState::Stopping.is_stopped());
        assert!(!ChildState::Stopping.is_startable());
        assert!(ChildState::Stopping.is_stoppable());
    }

    #[test]
    fn starting_excludes_startable_but_is_stoppable() {
        assert!(!ChildState::Starting.is_startable());
        assert!(ChildState::Starting.is_stoppable());
    }
}
