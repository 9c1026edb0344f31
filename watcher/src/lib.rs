//! Claude Watcher - terminal watcher for interactive AI coding assistants.
//!
//! This crate watches the output of a terminal running an AI coding assistant
//! and decides, chunk by chunk, whether the assistant is waiting for the user
//! or busy working. When that changes it runs external scripts to pause
//! background media and focus the window, or to resume media.
//!
//! # Overview
//!
//! Terminal output arrives as raw, ANSI-laden [`TerminalChunk`]s from a
//! [`feed`]. Each chunk is gated by the enabled flag and a leading-edge
//! debounce window, then classified by four regex pattern sets into
//! [`Signals`]. The [`WatcherSession`] maps the current state and those
//! signals to a transition and asks its [`Effector`] to act.
//!
//! The enabled flag lives in a small file shared with the scripts, so the
//! watcher can be switched on and off from another shell while it runs.
//!
//! # Modules
//!
//! - [`classifier`]: Pattern sets and chunk classification
//! - [`session`]: The three-state session driver
//! - [`effector`]: Side-effect trait and the script runner
//! - [`flag`]: The enabled flag file
//! - [`flag_watcher`]: Live reload of the enabled flag
//! - [`feed`]: PTY and stdin terminal feeds
//! - [`status`]: Session snapshot for `debug-state`
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types
//! - [`types`]: States, chunks, transitions and diagnostics
//! - [`utils`]: Debounce gate and log previews

pub mod classifier;
pub mod config;
pub mod effector;
pub mod error;
pub mod feed;
pub mod flag;
pub mod flag_watcher;
pub mod session;
pub mod status;
pub mod types;
pub mod utils;

pub use classifier::{Classifier, ClassifierError, PatternSet};
pub use config::Config;
pub use effector::{Effector, ScriptEffector};
pub use error::{Result, WatcherError};
pub use feed::{FeedError, PtyFeed, PtyOptions};
pub use flag::{EnabledFlag, FlagError};
pub use flag_watcher::{FlagChange, FlagWatcher, FlagWatcherError};
pub use session::{SessionOptions, WatcherSession};
pub use status::StatusFile;
pub use types::{
    ChunkOutcome, DebugState, DropReason, Effect, Signals, TerminalChunk, Transition,
    TransitionReason, WatcherState,
};
pub use utils::{DebounceGate, DEFAULT_DEBOUNCE_MS};
