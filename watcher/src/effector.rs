//! Side effects fired on state transitions.
//!
//! The session talks to the outside world through the [`Effector`] trait.
//! Calls are one-way: they must return immediately, and nothing about their
//! outcome flows back into the state machine.
//!
//! [`ScriptEffector`] runs `pause-and-focus` and `resume` scripts from a
//! configured directory. Each script is spawned on the tokio runtime and a
//! detached task waits for it and logs the exit status and output. Failures
//! are logged and never retried.
//!
//! | Platform | Invocation |
//! |----------|------------|
//! | Windows  | `powershell -NoProfile -ExecutionPolicy Bypass -File <dir>\<name>.ps1` |
//! | Others   | `sh <dir>/<name>.sh` |

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Script invoked when the assistant needs the user.
pub const PAUSE_AND_FOCUS_SCRIPT: &str = "pause-and-focus";

/// Script invoked when the assistant goes back to work.
pub const RESUME_SCRIPT: &str = "resume";

#[cfg(windows)]
const SCRIPT_EXTENSION: &str = "ps1";
#[cfg(not(windows))]
const SCRIPT_EXTENSION: &str = "sh";

/// Receiver of the two external side effects.
pub trait Effector: Send + Sync {
    /// Pause background media and bring the host window forward.
    fn pause_and_focus(&self);

    /// Resume background media.
    fn resume(&self);
}

/// Runs the external pause/resume scripts.
#[derive(Debug, Clone)]
pub struct ScriptEffector {
    scripts_path: PathBuf,
    pause_media: bool,
    play_sound: bool,
}

impl ScriptEffector {
    /// Creates an effector for scripts under `scripts_path`.
    ///
    /// `pause_media` and `play_sound` gate pause-and-focus: if both are
    /// false the script is not run at all.
    pub fn new(scripts_path: impl Into<PathBuf>, pause_media: bool, play_sound: bool) -> Self {
        Self {
            scripts_path: scripts_path.into(),
            pause_media,
            play_sound,
        }
    }

    /// Directory the scripts are resolved in.
    #[must_use]
    pub fn scripts_path(&self) -> &Path {
        &self.scripts_path
    }

    /// Full path of the script called `name` on this platform.
    #[must_use]
    pub fn script_file(&self, name: &str) -> PathBuf {
        self.scripts_path.join(format!("{name}.{SCRIPT_EXTENSION}"))
    }

    /// Whether pause-and-focus will run at all.
    #[must_use]
    pub fn pause_and_focus_enabled(&self) -> bool {
        self.pause_media || self.play_sound
    }

    /// Runs pause-and-focus unless both gates are off.
    ///
    /// Returns the task that logs the script's outcome, for callers that want
    /// to wait for it.
    pub fn spawn_pause_and_focus(&self) -> Option<JoinHandle<()>> {
        if !self.pause_and_focus_enabled() {
            info!("Both pauseMedia and playSound are disabled, skipping script");
            return None;
        }
        self.spawn_script(PAUSE_AND_FOCUS_SCRIPT)
    }

    /// Runs the resume script.
    pub fn spawn_resume(&self) -> Option<JoinHandle<()>> {
        self.spawn_script(RESUME_SCRIPT)
    }

    /// Spawns the script and returns without waiting for it.
    fn spawn_script(&self, name: &'static str) -> Option<JoinHandle<()>> {
        let script = self.script_file(name);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(script = %script.display(), "No async runtime, skipping script");
            return None;
        };

        info!(script = %script.display(), "Executing script");

        let mut command = script_command(&script);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(script = %script.display(), error = %e, "Failed to start {name}");
                return None;
            }
        };

        Some(runtime.spawn(async move {
            match child.wait_with_output().await {
                Ok(output) => {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let stderr = String::from_utf8_lossy(&output.stderr);

                    if output.status.success() {
                        if !stdout.trim().is_empty() {
                            info!(output = %stdout.trim(), "{name} output");
                        }
                        debug!(status = %output.status, "{name} finished");
                    } else {
                        warn!(status = %output.status, "Error executing {name}");
                        if !stderr.trim().is_empty() {
                            warn!(stderr = %stderr.trim(), "{name} stderr");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Failed to wait for {name}"),
            }
        }))
    }
}

impl Effector for ScriptEffector {
    fn pause_and_focus(&self) {
        let _ = self.spawn_pause_and_focus();
    }

    fn resume(&self) {
        let _ = self.spawn_resume();
    }
}

#[cfg(windows)]
fn script_command(script: &Path) -> Command {
    let mut command = Command::new("powershell");
    command
        .arg("-NoProfile")
        .arg("-ExecutionPolicy")
        .arg("Bypass")
        .arg("-File")
        .arg(script);
    command
}

#[cfg(not(windows))]
fn script_command(script: &Path) -> Command {
    let mut command = Command::new("sh");
    command.arg(script);
    command
}
