//! Enabled flag file shared with the external scripts.
//!
//! The scripts run out-of-process and have no other way to ask whether the
//! watcher is active, so every enabled change is mirrored to a plain-text file
//! holding `true` or `false`. The watcher is the only writer; last write wins.
//!
//! Reading never fails: a missing or unreadable file means enabled.
//!
//! # Example
//!
//! ```no_run
//! use claude_watcher::flag::EnabledFlag;
//!
//! let flag = EnabledFlag::new("/home/user/.claude-watcher-enabled");
//! flag.write(false).unwrap();
//! assert!(!flag.read());
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Errors from writing the flag file.
#[derive(Error, Debug)]
pub enum FlagError {
    /// The file or its parent directory could not be written.
    #[error("failed to write enabled flag {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Handle to the enabled flag file.
#[derive(Debug, Clone)]
pub struct EnabledFlag {
    path: PathBuf,
}

impl EnabledFlag {
    /// Creates a handle; nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the flag file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the flag.
    ///
    /// Returns `true` when the file is absent or unreadable, otherwise
    /// whether the trimmed contents are exactly `true`.
    #[must_use]
    pub fn read(&self) -> bool {
        match fs::read_to_string(&self.path) {
            Ok(content) => content.trim() == "true",
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read enabled flag, assuming enabled"
                );
                true
            }
        }
    }

    /// Writes `true` or `false`, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError::Write`] if the directory or file cannot be written.
    pub fn write(&self, enabled: bool) -> Result<(), FlagError> {
        let to_error = |source| FlagError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(to_error)?;
            }
        }

        fs::write(&self.path, if enabled { "true" } else { "false" }).map_err(to_error)?;

        debug!(path = %self.path.display(), enabled, "Wrote enabled flag");
        Ok(())
    }

    /// Writes the flag, logging instead of returning failures.
    pub fn write_or_log(&self, enabled: bool) {
        if let Err(e) = self.write(enabled) {
            warn!(error = %e, "Could not persist enabled flag");
        }
    }
}
