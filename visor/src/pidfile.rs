//! Pidfile with an advisory exclusive lock.
//!
//! Grounded in `original_source/aiovisor/daemonize.py::prepare_pidfile`:
//! open-or-create the file, take a non-blocking exclusive lock, and write
//! the current pid. Holding a second instance's lock attempt fails fast
//! rather than silently clobbering a running supervisor's pidfile. `fs2`
//! is the closest ecosystem equivalent to Python's `fcntl.flock` used
//! there.

// Layer 1: Standard library imports
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

// Layer 2: Third-party crate imports
use fs2::FileExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PidfileError {
    #[error("failed to open pidfile {path}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("another instance holds the lock on pidfile {path}")]
    AlreadyLocked { path: String },

    #[error("failed to write pid to {path}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A held pidfile lock. Dropping it releases the lock and removes the
/// file — the supervisor's clean-exit contract.
pub struct Pidfile {
    path: PathBuf,
    file: File,
}

impl Pidfile {
    /// Open `path`, take an exclusive non-blocking lock, and write the
    /// current process's pid. Fails immediately if another process
    /// already holds the lock.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, PidfileError> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| PidfileError::Open {
                path: display(&path),
                source,
            })?;

        file.try_lock_exclusive().map_err(|_| PidfileError::AlreadyLocked {
            path: display(&path),
        })?;

        file.set_len(0).map_err(|source| PidfileError::Write {
            path: display(&path),
            source,
        })?;
        write!(file, "{}", std::process::id()).map_err(|source| PidfileError::Write {
            path: display(&path),
            source,
        })?;
        file.flush().map_err(|source| PidfileError::Write {
            path: display(&path),
            source,
        })?;

        Ok(Self { path, file })
    }
}

impl Drop for Pidfile {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
