//! TOML loader for a single `visor` configuration file.
//!
//! This is the concrete "parsing collaborator" `visor-core` treats as
//! external: it reads one TOML document, fills in every default
//! `visor_core::child::ChildConfig` specifies, and hands back an
//! already-validated `MainConfig`. Supporting other formats is out of
//! scope — see `SPEC_FULL.md` §6.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::path::Path;

// Layer 2: Third-party crate imports
use serde::Deserialize;
use thiserror::Error;

// Layer 3: Internal module imports
use visor_core::child::ChildConfig;
use visor_core::supervisor::SupervisorConfig;

/// Errors that can occur while loading a `visor` config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("program table '{name}' has no name and none could be inferred")]
    MissingName { name: String },
}

/// Top-level shape of a `visor` TOML config file.
#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default = "default_server_name")]
    server_name: String,
    #[serde(default)]
    pidfile: Option<String>,
    #[serde(rename = "program", default)]
    programs: HashMap<String, ChildConfig>,
}

fn default_server_name() -> String {
    "visor".to_string()
}

/// The fully-resolved configuration for one `visor` invocation: the
/// `visor-core` `SupervisorConfig`, plus binary-only concerns
/// (`pidfile`) that have no place in the core.
#[derive(Debug, Clone)]
pub struct MainConfig {
    pub supervisor: SupervisorConfig,
    pub pidfile: Option<String>,
}

/// Load and validate a config file at `path`.
///
/// Each `[program.<name>]` table's `name` field is filled in from the
/// table key (any `name` written explicitly inside the table is
/// overwritten, since the table key is authoritative) before the
/// resulting map reaches [`SupervisorConfig::new`].
pub fn load(path: &Path) -> Result<MainConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse(&text, &path.display().to_string())
}

fn parse(text: &str, path: &str) -> Result<MainConfig, ConfigError> {
    let mut file: FileConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })?;

    for (key, program) in file.programs.iter_mut() {
        if key.is_empty() {
            return Err(ConfigError::MissingName { name: key.clone() });
        }
        program.name = key.clone();
    }

    let supervisor = SupervisorConfig::new(file.programs).with_server_name(file.server_name);
    Ok(MainConfig {
        supervisor,
        pidfile: file.pidfile,
    })
}
