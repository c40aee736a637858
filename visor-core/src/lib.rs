#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]
//! # visor-core — process supervision engine
//!
//! `visor-core` supervises a named collection of child programs: it spawns
//! them, tracks their lifecycle through a closed state machine, retries
//! failed starts with linear backoff up to a bounded number of attempts, and
//! publishes every state transition on a process-local event bus so that
//! external observers (a control surface, a dashboard, a test) can watch
//! live without polling.
//!
//! The crate is deliberately narrow: it has no opinion about configuration
//! file formats, HTTP transports, or daemonization. Those are boundary
//! concerns that consume the public API below.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use visor_core::event_bus::{EventBus, TOPIC_PROCESS_STATE};
//! use visor_core::{ChildConfig, Supervisor, SupervisorConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut programs = HashMap::new();
//! programs.insert(
//!     "sleeper".to_string(),
//!     ChildConfig::new("sleeper", vec!["sleep".into(), "10".into()])
//!         .with_start_secs(Duration::from_secs(1)),
//! );
//!
//! let bus = Arc::new(EventBus::new());
//! let (_id, mut events) = bus.connect(TOPIC_PROCESS_STATE);
//!
//! let supervisor = Supervisor::new(SupervisorConfig::new(programs), bus);
//! supervisor.start().await?;
//!
//! let event = events.recv().await;
//! println!("first process_state event: {event:?}");
//! # Ok(())
//! # }
//! ```

pub mod child;
pub mod error;
pub mod event_bus;
pub mod info;
pub mod supervisor;
pub mod types;

pub use child::{Child, ChildConfig};
pub use error::{ChildError, SupervisorError};
pub use info::{ChildInfo, ProcessMetrics, ServerInfo};
pub use supervisor::{Supervisor, SupervisorConfig};
pub use types::{ChildState, ServerState};
