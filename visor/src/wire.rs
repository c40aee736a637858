//! The boundary-adapter contract (`SPEC_FULL.md` §4.4): serializable
//! shapes and the error→status mapping a real HTTP surface would build
//! on. No router is wired up here — building one is out of scope — but
//! the types and the mapping function exist so that contract is concrete
//! rather than implied.

// Layer 2: Third-party crate imports
use serde::Serialize;

// Layer 3: Internal module imports
use visor_core::{ChildError, ChildInfo, ServerInfo, SupervisorError};

/// Wire shape for `GET /process/info/:name` and the `process_state`
/// stream payload's `process` field.
pub type ChildInfoWire = ChildInfo;

/// Wire shape for `GET /status` and the `server_state` stream payload's
/// `server` field.
pub type ServerInfoWire = ServerInfo;

/// A single `server_state`/`process_state` event as it would be framed
/// over a streaming endpoint (one JSON object per line, say).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum StreamEventWire {
    ServerState {
        old_state: String,
        new_state: String,
        server: ServerInfoWire,
    },
    ProcessState {
        old_state: String,
        new_state: String,
        process: ChildInfoWire,
    },
}

impl From<visor_core::event_bus::Event> for StreamEventWire {
    fn from(event: visor_core::event_bus::Event) -> Self {
        match event {
            visor_core::event_bus::Event::ServerState { old, new, server } => StreamEventWire::ServerState {
                old_state: old.as_str().to_string(),
                new_state: new.as_str().to_string(),
                server,
            },
            visor_core::event_bus::Event::ProcessState { old, new, process } => StreamEventWire::ProcessState {
                old_state: old.as_str().to_string(),
                new_state: new.as_str().to_string(),
                process,
            },
        }
    }
}

/// Maps a domain error to the HTTP status code a boundary adapter should
/// answer with (`SPEC_FULL.md` §7, bit-exact for existing clients):
/// not-found conditions become 404, illegal preconditions become 400,
/// everything else is a 500.
pub fn domain_error_to_status(error: &SupervisorError) -> u16 {
    match error {
        SupervisorError::NotFound { .. } => 404,
        SupervisorError::Child(child_error) => child_error_to_status(child_error),
    }
}

fn child_error_to_status(error: &ChildError) -> u16 {
    match error {
        ChildError::AlreadyRunning { .. } | ChildError::AlreadyStopped { .. } | ChildError::IllegalState { .. } => 400,
    }
}
