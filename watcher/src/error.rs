//! Error types for the Claude watcher.
//!
//! Each module owns a narrow `thiserror` enum; [`WatcherError`] gathers them
//! for callers that want a single type.

use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::config::ConfigError;
use crate::feed::FeedError;
use crate::flag::FlagError;
use crate::flag_watcher::FlagWatcherError;

/// Errors that can occur while setting up or running the watcher.
///
/// Only startup is fallible in practice. Once a session is running, script
/// and flag failures are logged and absorbed rather than returned.
///
/// # Examples
///
/// ```
/// use claude_watcher::classifier::Classifier;
/// use claude_watcher::error::Result;
///
/// fn build() -> Result<Classifier> {
///     Ok(Classifier::new()?)
/// }
///
/// assert!(build().is_ok());
/// ```
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A built-in pattern failed to compile.
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    /// The enabled flag could not be written.
    #[error("flag error: {0}")]
    Flag(#[from] FlagError),

    /// The terminal feed could not be started.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// The flag file watch could not be installed.
    #[error("flag watch error: {0}")]
    FlagWatch(#[from] FlagWatcherError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using [`WatcherError`].
pub type Result<T> = std::result::Result<T, WatcherError>;
