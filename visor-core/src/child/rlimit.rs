//! POSIX resource limit application.
//!
//! Maps the string-keyed `resources` map from [`super::config::ChildConfig`]
//! onto `setrlimit(2)`, preserving each resource's existing hard limit and
//! only lowering the soft limit, per spec §4.2 "Spawn details".

#![cfg(unix)]

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use nix::sys::resource::{getrlimit, setrlimit, Resource};

/// Resolve a config-facing rlimit name to the `nix` resource it names.
///
/// Only the POSIX-portable subset is recognised; an unrecognised name is
/// not a hard error (the spec accepts the resources map is opaque OS
/// policy) but the caller should log and skip it.
fn resource_for_name(name: &str) -> Option<Resource> {
    match name.to_ascii_lowercase().as_str() {
        "nofile" | "numfiles" | "openfiles" => Some(Resource::RLIMIT_NOFILE),
        "core" | "corefile" => Some(Resource::RLIMIT_CORE),
        "cpu" => Some(Resource::RLIMIT_CPU),
        "fsize" => Some(Resource::RLIMIT_FSIZE),
        "data" => Some(Resource::RLIMIT_DATA),
        "stack" => Some(Resource::RLIMIT_STACK),
        "as" | "vmem" | "memory" => Some(Resource::RLIMIT_AS),
        _ => None,
    }
}

/// Apply every entry of `resources` as a soft limit, preserving the current
/// hard limit. Intended to run inside a `pre_exec` closure in the freshly
/// forked child, before `exec`.
///
/// Unrecognised resource names are skipped (a warning is the caller's
/// responsibility, since `tracing` is not signal-safe to call from inside
/// `pre_exec`).
pub fn apply(resources: &HashMap<String, u64>) -> std::io::Result<()> {
    for (name, soft) in resources {
        let Some(resource) = resource_for_name(name) else {
            continue;
        };
        let (_, hard) = getrlimit(resource).map_err(std::io::Error::from)?;
        // Preserve the existing hard limit; only the soft limit changes,
        // and never above the hard ceiling.
        let bounded_soft = (*soft).min(hard);
        setrlimit(resource, bounded_soft, hard).map_err(std::io::Error::from)?;
    }
    Ok(())
}

/// Unrecognised resource names present in `resources`, for a caller that
/// wants to log a warning outside the async-signal-unsafe `pre_exec`
/// context.
pub fn unrecognised_names(resources: &HashMap<String, u64>) -> Vec<String> {
    resources
        .keys()
        .filter(|name| resource_for_name(name).is_none())
        .cloned()
        .collect()
}
