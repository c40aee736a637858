//! One supervised program: its configuration, its current runtime state,
//! and the lifecycle driver that owns every transition between states.

pub mod config;
mod lifecycle;
#[cfg(unix)]
mod rlimit;

pub use config::{ChildConfig, Command, Directory, Environment};
pub use lifecycle::Child;
