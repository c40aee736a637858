//! Error taxonomy for the supervision engine.
//!
//! Follows the same canonical-struct-per-variant style as the rest of the
//! corpus: one variant per failure mode, `#[source]` on wrapped causes, and
//! helper predicates where a caller needs to branch on error category
//! rather than match every variant.

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::types::ChildState;

/// Errors returned by synchronous `Child` operations (`start`, `stop`,
/// `kill`).
///
/// The lifecycle driver itself never produces one of these: once `start()`
/// has accepted a transition, every subsequent failure becomes a state
/// change observable on the event bus, not a returned error (see
/// `SpawnFailed` handling in [`crate::child::lifecycle`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChildError {
    /// `start()` was called while the child was already `Starting`,
    /// `Running`, or `Backoff`.
    #[error("child '{name}' is already running")]
    AlreadyRunning { name: String },

    /// `stop()`/`kill()` was called while the child was already `Stopped`.
    #[error("child '{name}' is already stopped")]
    AlreadyStopped { name: String },

    /// The requested transition is not legal from the child's current
    /// state (e.g. `start()` on a child that is already `Starting`).
    #[error("child '{name}' cannot {action} from state {state}")]
    IllegalState {
        name: String,
        action: &'static str,
        state: ChildState,
    },
}

impl ChildError {
    pub fn is_already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning { .. })
    }

    pub fn is_already_stopped(&self) -> bool {
        matches!(self, Self::AlreadyStopped { .. })
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState { .. })
    }
}

/// Errors returned by the `Supervisor` aggregate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// `process(name)` was called with a name not present in the
    /// supervisor's child map.
    #[error("no child named '{name}'")]
    NotFound { name: String },

    /// A per-child operation failed during a batch `start`/`stop`.
    #[error(transparent)]
    Child(#[from] ChildError),
}

impl SupervisorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
