//! Claude Watcher - pauses media and focuses the window when an AI coding
//! assistant needs you.
//!
//! # Commands
//!
//! - `claude-watcher run -- <cmd> [args]`: Run the assistant in a PTY and watch it
//! - `claude-watcher watch`: Watch terminal output piped on stdin
//! - `claude-watcher enable` / `disable` / `toggle`: Change the enabled flag
//! - `claude-watcher test-pause` / `test-resume`: Run a script by hand
//! - `claude-watcher show-logs`: Print the end of the log file
//! - `claude-watcher debug-state`: Show the running session's state
//!
//! # Environment Variables
//!
//! See the [`config`](claude_watcher::config) module for available
//! configuration options.

use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use claude_watcher::config::Config;
use claude_watcher::effector::ScriptEffector;
use claude_watcher::feed::{self, FeedError, PtyFeed, PtyOptions};
use claude_watcher::flag::EnabledFlag;
use claude_watcher::flag_watcher::{FlagChange, FlagWatcher};
use claude_watcher::session::{SessionOptions, WatcherSession};
use claude_watcher::status::StatusFile;
use claude_watcher::types::{DebugState, TerminalChunk, WatcherState};
use claude_watcher::utils::DebounceGate;

/// Capacity of the chunk and flag-change channels.
const CHANNEL_CAPACITY: usize = 256;

/// Default number of lines printed by `show-logs`.
const DEFAULT_LOG_LINES: usize = 50;

/// Exit code reported when the wrapped command's status is unknown.
const UNKNOWN_EXIT_CODE: i32 = 1;

/// Claude Watcher - terminal watcher for AI coding assistants.
///
/// Detects when the assistant is waiting for input and runs scripts that
/// pause background media and focus the window, then resumes media once the
/// assistant is working again.
#[derive(Parser, Debug)]
#[command(name = "claude-watcher")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    CLAUDE_WATCHER_ENABLED      Initial enabled state (default: flag file)
    CLAUDE_WATCHER_DEBOUNCE_MS  Debounce window in ms (default: 500)
    CLAUDE_WATCHER_SCRIPTS_PATH Script directory (default: next to the binary)
    CLAUDE_WATCHER_PAUSE_MEDIA  Pause media on input requests (default: true)
    CLAUDE_WATCHER_PLAY_SOUND   Play a sound on input requests (default: true)
    CLAUDE_WATCHER_FLAG_FILE    Enabled flag (default: ~/.claude-watcher-enabled)
    CLAUDE_WATCHER_LOG_FILE     Log file for 'run' (default: ~/.claude-watcher/watcher.log)
    CLAUDE_WATCHER_STATE_FILE   Session snapshot (default: ~/.claude-watcher/state.json)

EXAMPLES:
    # Wrap the assistant
    claude-watcher run -- claude

    # Watch an existing tmux pane
    tmux pipe-pane -o 'claude-watcher watch'

    # Turn the watcher off from another shell
    claude-watcher disable
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run a command in a PTY and watch its output.
    ///
    /// Logs go to the log file since the command owns the terminal.
    Run {
        /// Command and arguments to run.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Watch terminal output piped on stdin until EOF.
    Watch {
        /// Terminal name used in logs.
        #[arg(short, long, default_value = "stdin")]
        name: String,
    },

    /// Enable the watcher.
    Enable,

    /// Disable the watcher.
    Disable,

    /// Flip the enabled flag.
    Toggle,

    /// Run the pause-and-focus script once.
    TestPause,

    /// Run the resume script once.
    TestResume,

    /// Print the end of the log file.
    ShowLogs {
        /// Number of lines to print.
        #[arg(short = 'n', long, default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,
    },

    /// Show the state of the running session.
    DebugState {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

/// Where log output goes.
#[derive(Debug, Clone, Copy)]
enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Command::Run { command } => {
            init_logging(LogTarget::File(&config.log_file))?;
            let code = block_on(run_wrapped(config, command))??;
            std::process::exit(code);
        }
        Command::Watch { name } => {
            init_logging(LogTarget::Stderr)?;
            block_on(run_watch(config, name))?
        }
        Command::Enable => set_enabled(&config, Some(true)),
        Command::Disable => set_enabled(&config, Some(false)),
        Command::Toggle => set_enabled(&config, None),
        Command::TestPause => {
            init_logging(LogTarget::Stderr)?;
            block_on(run_test_script(config, ScriptKind::PauseAndFocus))?
        }
        Command::TestResume => {
            init_logging(LogTarget::Stderr)?;
            block_on(run_test_script(config, ScriptKind::Resume))?
        }
        Command::ShowLogs { lines } => run_show_logs(&config, lines),
        Command::DebugState { json } => run_debug_state(&config, json),
    }
}

/// Runs a future on a fresh multi-threaded runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    Ok(runtime.block_on(future))
}

/// Writes the enabled flag. `None` flips the current value.
fn set_enabled(config: &Config, enabled: Option<bool>) -> Result<()> {
    let flag = EnabledFlag::new(&config.flag_file);
    let enabled = enabled.unwrap_or_else(|| !flag.read());

    flag.write(enabled).context("Failed to update enabled flag")?;

    println!(
        "Claude Watcher {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum ScriptKind {
    PauseAndFocus,
    Resume,
}

/// Runs one script and waits for it to finish.
async fn run_test_script(config: Config, kind: ScriptKind) -> Result<()> {
    let effector = ScriptEffector::new(&config.scripts_path, config.pause_media, config.play_sound);

    info!(
        scripts_path = %effector.scripts_path().display(),
        kind = ?kind,
        "Manual script run"
    );

    let handle = match kind {
        ScriptKind::PauseAndFocus => effector.spawn_pause_and_focus(),
        ScriptKind::Resume => effector.spawn_resume(),
    };

    if let Some(handle) = handle {
        handle.await.context("Script task failed")?;
    }
    Ok(())
}

/// Prints the last `lines` lines of the log file.
fn run_show_logs(config: &Config, lines: usize) -> Result<()> {
    let content = match fs::read_to_string(&config.log_file) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            eprintln!("No log file at {}", config.log_file.display());
            return Ok(());
        }
        Err(e) => {
            return Err(e).context(format!(
                "Failed to read log file {}",
                config.log_file.display()
            ))
        }
    };

    for line in tail_lines(&content, lines) {
        println!("{line}");
    }
    Ok(())
}

fn tail_lines(content: &str, count: usize) -> Vec<&str> {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].to_vec()
}

/// Prints the running session's snapshot, or the configured defaults.
fn run_debug_state(config: &Config, json: bool) -> Result<()> {
    let status = StatusFile::new(&config.state_file);
    let snapshot = status
        .read()
        .context(format!("Failed to read {}", config.state_file.display()))?;

    let state = match snapshot {
        Some(state) => state,
        None => {
            eprintln!("No running watcher session");
            DebugState {
                state: WatcherState::Idle,
                enabled: EnabledFlag::new(&config.flag_file).read(),
                last_trigger: None,
                since_last_trigger_ms: None,
                listener_active: false,
                debounce_ms: config.debounce_ms(),
            }
        }
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&state).context("Failed to serialize state")?
        );
    } else {
        print!("{}", format_debug_state(&state));
    }
    Ok(())
}

fn format_debug_state(state: &DebugState) -> String {
    let last_trigger = match (state.last_trigger, state.since_last_trigger_ms) {
        (Some(at), Some(ms)) => format!("{} ({ms} ms ago)", at.to_rfc3339()),
        (Some(at), None) => at.to_rfc3339(),
        (None, _) => "never".to_string(),
    };

    format!(
        "State:           {}\n\
         Enabled:         {}\n\
         Last trigger:    {}\n\
         Listener active: {}\n\
         Debounce:        {} ms\n",
        state.state, state.enabled, last_trigger, state.listener_active, state.debounce_ms
    )
}

/// Wraps a command in a PTY and watches it. Returns the command's exit code.
async fn run_wrapped(config: Config, command: Vec<String>) -> Result<i32> {
    let mut parts = command.into_iter();
    let program = parts.next().context("No command given")?;
    let args: Vec<String> = parts.collect();

    info!(command = %program, args = ?args, "Starting Claude Watcher");

    let (chunk_tx, chunk_rx) = mpsc::channel::<TerminalChunk>(CHANNEL_CAPACITY);

    feed::install_panic_hook();
    let options = PtyOptions::interactive(program.clone(), args.clone());

    match PtyFeed::spawn(options, chunk_tx) {
        Ok(mut pty) => {
            let exit = pty.take_exit();
            let end = drive_session(&config, chunk_rx, exit, Some(&pty), wait_for_shutdown()).await?;
            if matches!(end, LoopEnd::Shutdown) {
                pty.kill();
            }
            Ok(end.exit_code())
        }
        Err(FeedError::PtyUnavailable(reason)) => {
            warn!(
                reason = %reason,
                "PTY unavailable, running command without watching its output"
            );
            run_unwatched(&config, chunk_rx, &program, &args).await
        }
        Err(e) => Err(e).context(format!("Failed to start '{program}'")),
    }
}

/// Runs the command with inherited stdio and an inert session.
async fn run_unwatched(
    config: &Config,
    chunks: mpsc::Receiver<TerminalChunk>,
    program: &str,
    args: &[String],
) -> Result<i32> {
    let mut child = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .context(format!("Failed to start '{program}'"))?;

    let (exit_tx, exit_rx) = oneshot::channel();
    let waiter = tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => status.code().and_then(|c| u32::try_from(c).ok()).unwrap_or(u32::MAX),
            Err(e) => {
                warn!(error = %e, "Failed to wait for command");
                u32::MAX
            }
        };
        let _ = exit_tx.send(code);
    });

    let end = drive_session(config, chunks, Some(exit_rx), None, wait_for_shutdown()).await?;
    if matches!(end, LoopEnd::Shutdown) {
        waiter.abort();
    }
    Ok(end.exit_code())
}

/// Watches stdin until EOF or a shutdown signal.
async fn run_watch(config: Config, name: String) -> Result<()> {
    info!(terminal = %name, "Watching stdin");

    let (chunk_tx, chunk_rx) = mpsc::channel::<TerminalChunk>(CHANNEL_CAPACITY);
    let reader = feed::spawn_stdin_feed(name, chunk_tx);

    drive_session(&config, chunk_rx, None, None, wait_for_shutdown()).await?;
    reader.abort();

    info!("Watcher stopped");
    Ok(())
}

/// Why the event loop stopped.
#[derive(Debug, Clone, Copy)]
enum LoopEnd {
    Shutdown,
    InputClosed,
    ChildExited(u32),
}

impl LoopEnd {
    fn exit_code(self) -> i32 {
        match self {
            Self::ChildExited(code) => i32::try_from(code).unwrap_or(UNKNOWN_EXIT_CODE),
            Self::Shutdown | Self::InputClosed => 0,
        }
    }
}

/// Builds the session and processes events until the feed or child ends.
async fn drive_session(
    config: &Config,
    mut chunks: mpsc::Receiver<TerminalChunk>,
    mut child_exit: Option<oneshot::Receiver<u32>>,
    pty: Option<&PtyFeed>,
    shutdown: impl Future<Output = ()>,
) -> Result<LoopEnd> {
    let flag = EnabledFlag::new(&config.flag_file);
    let enabled = config.enabled.unwrap_or_else(|| flag.read());
    let effector = ScriptEffector::new(&config.scripts_path, config.pause_media, config.play_sound);

    info!(
        enabled,
        debounce_ms = config.debounce_ms(),
        scripts_path = %config.scripts_path.display(),
        flag_file = %config.flag_file.display(),
        "Configuration loaded"
    );

    let options = SessionOptions {
        enabled,
        gate: DebounceGate::new(config.debounce),
    };
    let mut session = WatcherSession::new(options, effector, Some(flag.clone()))
        .context("Failed to build pattern classifier")?;

    let listener_active = feed_attached(pty.is_some(), child_exit.is_some());
    session.set_listener_active(listener_active);

    let (flag_tx, mut flag_rx) = mpsc::channel::<FlagChange>(CHANNEL_CAPACITY);
    let _flag_watcher = match FlagWatcher::new(flag, flag_tx) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(error = %e, "Enabled flag will not be reloaded while running");
            None
        }
    };

    let status = StatusFile::new(&config.state_file);
    status.write_or_log(&session.debug_state(Instant::now()));

    let mut debug_signal = UserSignal::debug_dump();
    let mut resize_signal = UserSignal::window_change();
    let mut chunks_open = true;

    info!(listener_active, "Watcher running");

    tokio::pin!(shutdown);

    let end = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break LoopEnd::Shutdown;
            }

            chunk = chunks.recv(), if chunks_open => match chunk {
                Some(chunk) => {
                    let outcome = session.process_chunk(&chunk);
                    if outcome.transition().is_some() {
                        status.write_or_log(&session.debug_state(Instant::now()));
                    }
                }
                None => {
                    debug!("Terminal feed closed");
                    chunks_open = false;
                    if child_exit.is_none() {
                        break LoopEnd::InputClosed;
                    }
                }
            },

            code = wait_for_child(&mut child_exit) => {
                info!(code, "Wrapped command exited");
                break LoopEnd::ChildExited(code);
            }

            Some(change) = flag_rx.recv() => {
                session.apply_external_enabled(change.enabled);
                status.write_or_log(&session.debug_state(Instant::now()));
            }

            _ = debug_signal.recv() => {
                let snapshot = session.debug_state(Instant::now());
                match serde_json::to_string(&snapshot) {
                    Ok(json) => info!(state = %json, "Debug state"),
                    Err(e) => warn!(error = %e, "Failed to serialize debug state"),
                }
                status.write_or_log(&snapshot);
            }

            _ = resize_signal.recv() => {
                if let Some(pty) = pty {
                    let (rows, cols) = feed::terminal_size();
                    if let Err(e) = pty.resize(rows, cols) {
                        debug!(error = %e, "Failed to resize PTY");
                    }
                }
            }
        }
    };

    session.set_listener_active(false);
    status.remove();

    Ok(end)
}

/// Whether terminal output reaches the session.
///
/// A wrapped child without a PTY runs on inherited stdio, so nothing is read
/// from it. Stdin watching has no child and always reads.
fn feed_attached(has_pty: bool, has_child: bool) -> bool {
    has_pty || !has_child
}

/// Resolves with the child's exit code, or never if there is no child.
async fn wait_for_child(exit: &mut Option<oneshot::Receiver<u32>>) -> u32 {
    match exit {
        Some(rx) => rx.await.unwrap_or(u32::MAX),
        None => std::future::pending().await,
    }
}

/// A Unix signal that is pending forever where unsupported or not installed.
struct UserSignal {
    #[cfg(unix)]
    inner: Option<signal::unix::Signal>,
}

impl UserSignal {
    /// SIGUSR1, which dumps the debug state.
    fn debug_dump() -> Self {
        #[cfg(unix)]
        {
            Self::install(signal::unix::SignalKind::user_defined1(), "SIGUSR1")
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    /// SIGWINCH, sent when the controlling terminal is resized.
    fn window_change() -> Self {
        #[cfg(unix)]
        {
            Self::install(signal::unix::SignalKind::window_change(), "SIGWINCH")
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    #[cfg(unix)]
    fn install(kind: signal::unix::SignalKind, name: &str) -> Self {
        let inner = match signal::unix::signal(kind) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(signal = name, error = %e, "Failed to install signal handler");
                None
            }
        };
        Self { inner }
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        if let Some(sig) = self.inner.as_mut() {
            if sig.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}

/// Initializes the logging subsystem.
///
/// `RUST_LOG` overrides the default `info` filter.
fn init_logging(target: LogTarget<'_>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_level(true)
                .with_writer(io::stderr)
                .init();
        }
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).context(format!(
                        "Failed to create log directory {}",
                        parent.display()
                    ))?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .context(format!("Failed to open log file {}", path.display()))?;

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
    }
    Ok(())
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
