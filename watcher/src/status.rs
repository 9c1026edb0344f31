//! Session snapshot shared with the `debug-state` command.
//!
//! A running `run` or `watch` session writes its [`DebugState`] as JSON after
//! every transition and enabled change, and removes the file on exit. The
//! one-shot `debug-state` command reads it back from another process.
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! reader never sees a half-written snapshot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::DebugState;

/// Handle to the snapshot file.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write(&self, state: &DebugState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), state = %state.state, "Wrote session snapshot");
        Ok(())
    }

    /// Writes the snapshot, logging instead of returning failures.
    pub fn write_or_log(&self, state: &DebugState) {
        if let Err(e) = self.write(state) {
            warn!(path = %self.path.display(), error = %e, "Could not write session snapshot");
        }
    }

    /// Reads the last snapshot, or `None` if no session is running.
    ///
    /// `since_last_trigger_ms` is recomputed against the current time since
    /// the stored value is only correct at the moment it was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn read(&self) -> Result<Option<DebugState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut state: DebugState = serde_json::from_str(&content)?;
        if let Some(last) = state.last_trigger {
            let elapsed = (Utc::now() - last).num_milliseconds().max(0);
            state.since_last_trigger_ms = u64::try_from(elapsed).ok();
        }
        Ok(Some(state))
    }

    /// Deletes the snapshot. A missing file is not an error.
    pub fn remove(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed session snapshot"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Could not remove session snapshot"),
        }
    }
}
