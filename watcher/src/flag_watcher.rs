//! Live reload of the enabled flag.
//!
//! `claude-watcher enable`/`disable`/`toggle` run as separate processes and
//! only rewrite the flag file. A running session learns about the change by
//! watching that file with [`notify`] and re-reading it on every event.
//!
//! The notify callback stays lightweight: it filters for the flag path, reads
//! the flag and pushes the value into a tokio channel with `try_send`. The
//! session owner drains the channel on its own task.
//!
//! # Example
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use claude_watcher::flag::EnabledFlag;
//! use claude_watcher::flag_watcher::FlagWatcher;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (tx, mut rx) = mpsc::channel(16);
//! let _watcher = FlagWatcher::new(EnabledFlag::new("/home/user/.claude-watcher-enabled"), tx)?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::flag::EnabledFlag;

/// Errors from setting up the flag watch.
#[derive(Error, Debug)]
pub enum FlagWatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// The flag file has no usable parent directory.
    #[error("flag file has no parent directory: {0}")]
    NoParent(PathBuf),
}

/// A value read from the flag file after it changed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagChange {
    pub enabled: bool,
}

/// Watches the flag file's directory for changes to the flag.
///
/// Dropping the watcher stops the watch.
#[derive(Debug)]
pub struct FlagWatcher {
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
    flag_path: PathBuf,
}

impl FlagWatcher {
    /// Starts watching `flag` and sends a [`FlagChange`] for each event on it.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be determined or the
    /// watch cannot be installed.
    pub fn new(
        flag: EnabledFlag,
        sender: mpsc::Sender<FlagChange>,
    ) -> Result<Self, FlagWatcherError> {
        let flag_path = flag.path().to_path_buf();
        let watch_dir = flag_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .ok_or_else(|| FlagWatcherError::NoParent(flag_path.clone()))?;

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                handle_notify_event(res, &flag, &sender);
            },
            Config::default(),
        )?;

        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        debug!(
            watch_dir = %watch_dir.display(),
            flag = %flag_path.display(),
            "Watching enabled flag"
        );

        Ok(Self { watcher, flag_path })
    }

    /// The watched flag file.
    #[must_use]
    pub fn flag_path(&self) -> &Path {
        &self.flag_path
    }
}

fn handle_notify_event(
    res: Result<Event, notify::Error>,
    flag: &EnabledFlag,
    sender: &mpsc::Sender<FlagChange>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Flag watcher error");
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    if !relevant || !event.paths.iter().any(|p| is_flag_path(p, flag.path())) {
        return;
    }

    let change = FlagChange {
        enabled: flag.read(),
    };
    if let Err(e) = sender.try_send(change) {
        warn!(error = %e, "Failed to queue flag change");
    }
}

/// Matches by file name so symlinked temp dirs (macOS `/private/var`) still match.
fn is_flag_path(candidate: &Path, flag_path: &Path) -> bool {
    candidate == flag_path
        || (candidate.file_name().is_some() && candidate.file_name() == flag_path.file_name())
}
