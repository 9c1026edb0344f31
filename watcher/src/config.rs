//! Configuration module for Claude Watcher.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `CLAUDE_WATCHER_ENABLED` | No | flag file | Initial enabled state |
//! | `CLAUDE_WATCHER_DEBOUNCE_MS` | No | 500 | Debounce window in milliseconds |
//! | `CLAUDE_WATCHER_SCRIPTS_PATH` | No | auto | Directory holding the pause/resume scripts |
//! | `CLAUDE_WATCHER_PAUSE_MEDIA` | No | true | Run pause-and-focus to pause media |
//! | `CLAUDE_WATCHER_PLAY_SOUND` | No | true | Run pause-and-focus to play a sound |
//! | `CLAUDE_WATCHER_FLAG_FILE` | No | `~/.claude-watcher-enabled` | Enabled flag shared with the scripts |
//! | `CLAUDE_WATCHER_LOG_FILE` | No | `~/.claude-watcher/watcher.log` | Log file used while wrapping a terminal |
//! | `CLAUDE_WATCHER_STATE_FILE` | No | `~/.claude-watcher/state.json` | Snapshot of the running session |
//!
//! Boolean variables accept `true`/`false`, `1`/`0`, `yes`/`no` and `on`/`off`.
//!
//! When `CLAUDE_WATCHER_SCRIPTS_PATH` is unset the scripts directory is
//! derived from the executable location: `<exe dir>/scripts`, then
//! `<exe dir>/../scripts`, falling back to `~/.claude-watcher/scripts`.
//!
//! # Example
//!
//! ```no_run
//! use claude_watcher::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Debounce: {:?}", config.debounce);
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;

use crate::utils::DEFAULT_DEBOUNCE_MS;

/// Per-user flag file name, relative to home.
pub const FLAG_FILE_NAME: &str = ".claude-watcher-enabled";

/// Per-user data directory name, relative to home.
const DEFAULT_DATA_DIR: &str = ".claude-watcher";

/// Log file name inside the data directory.
const DEFAULT_LOG_FILE: &str = "watcher.log";

/// Session snapshot file name inside the data directory.
const DEFAULT_STATE_FILE: &str = "state.json";

/// Scripts directory name.
const SCRIPTS_DIR: &str = "scripts";

const ENV_ENABLED: &str = "CLAUDE_WATCHER_ENABLED";
const ENV_DEBOUNCE_MS: &str = "CLAUDE_WATCHER_DEBOUNCE_MS";
const ENV_SCRIPTS_PATH: &str = "CLAUDE_WATCHER_SCRIPTS_PATH";
const ENV_PAUSE_MEDIA: &str = "CLAUDE_WATCHER_PAUSE_MEDIA";
const ENV_PLAY_SOUND: &str = "CLAUDE_WATCHER_PLAY_SOUND";
const ENV_FLAG_FILE: &str = "CLAUDE_WATCHER_FLAG_FILE";
const ENV_LOG_FILE: &str = "CLAUDE_WATCHER_LOG_FILE";
const ENV_STATE_FILE: &str = "CLAUDE_WATCHER_STATE_FILE";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for Claude Watcher.
#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit enabled state. `None` means "use the flag file".
    pub enabled: Option<bool>,

    /// Debounce window applied to terminal chunks.
    pub debounce: Duration,

    /// Directory containing `pause-and-focus` and `resume` scripts.
    pub scripts_path: PathBuf,

    /// Whether pause-and-focus should pause media.
    pub pause_media: bool,

    /// Whether pause-and-focus should play a sound.
    pub play_sound: bool,

    /// Flag file read by the external scripts.
    pub flag_file: PathBuf,

    /// Log file used by `run`.
    pub log_file: PathBuf,

    /// Snapshot written by a running session for `debug-state`.
    pub state_file: PathBuf,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - A boolean variable holds something other than a recognised boolean
    /// - `CLAUDE_WATCHER_DEBOUNCE_MS` is not a non-negative integer
    /// - The home directory cannot be determined (needed for default paths)
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
        let home_dir = base_dirs.home_dir();
        let data_dir = home_dir.join(DEFAULT_DATA_DIR);

        let enabled = optional_bool(ENV_ENABLED)?;

        let debounce_ms = match env::var(ENV_DEBOUNCE_MS) {
            Ok(val) => val
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_DEBOUNCE_MS.to_string(),
                    message: format!("expected non-negative integer, got '{val}'"),
                })?,
            Err(_) => DEFAULT_DEBOUNCE_MS,
        };

        let scripts_path = match env::var(ENV_SCRIPTS_PATH) {
            Ok(val) if !val.trim().is_empty() => PathBuf::from(val.trim()),
            _ => default_scripts_path(&data_dir),
        };

        let pause_media = optional_bool(ENV_PAUSE_MEDIA)?.unwrap_or(true);
        let play_sound = optional_bool(ENV_PLAY_SOUND)?.unwrap_or(true);

        let flag_file = env::var(ENV_FLAG_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir.join(FLAG_FILE_NAME));

        let log_file = env::var(ENV_LOG_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join(DEFAULT_LOG_FILE));

        let state_file = env::var(ENV_STATE_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join(DEFAULT_STATE_FILE));

        Ok(Self {
            enabled,
            debounce: Duration::from_millis(debounce_ms),
            scripts_path,
            pause_media,
            play_sound,
            flag_file,
            log_file,
            state_file,
        })
    }

    /// Debounce window in whole milliseconds.
    #[must_use]
    pub fn debounce_ms(&self) -> u64 {
        u64::try_from(self.debounce.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Parses an optional boolean environment variable.
fn optional_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(val) => parse_bool(&val)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected true or false, got '{val}'"),
            }),
        Err(_) => Ok(None),
    }
}

/// Parses the boolean spellings accepted in environment variables.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Locates the scripts directory relative to the running executable.
fn default_scripts_path(data_dir: &Path) -> PathBuf {
    let exe_dir = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    if let Some(dir) = exe_dir {
        let candidates = [dir.join(SCRIPTS_DIR), dir.join("..").join(SCRIPTS_DIR)];
        if let Some(found) = candidates.into_iter().find(|c| c.is_dir()) {
            return found;
        }
    }

    data_dir.join(SCRIPTS_DIR)
}
