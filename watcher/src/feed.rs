//! Terminal data feeds.
//!
//! A feed turns terminal output into [`TerminalChunk`]s on a tokio channel.
//! The channel closing means the feed has ended.
//!
//! - [`PtyFeed`] runs the assistant as a child process inside a native PTY,
//!   mirrors its output to our stdout, forwards our stdin to it, and reports
//!   every read as a chunk. The controlling terminal is put into raw mode for
//!   the lifetime of the feed and restored on drop.
//! - [`spawn_stdin_feed`] reads already-captured output from stdin, for use
//!   behind `tmux pipe-pane` or `script -f`.
//!
//! PTY reads happen on a dedicated std thread, since the PTY reader is a
//! blocking `Read`; chunks cross into async code through `blocking_send`.

use std::io::{self, IsTerminal, Read, Write};
use std::panic;
use std::thread;

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::TerminalChunk;

/// Read buffer size for PTY and stdin reads.
const READ_BUFFER_SIZE: usize = 4096;

/// Fallback terminal size when the controlling terminal cannot be queried.
const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

/// Errors raised while starting a feed.
#[derive(Error, Debug)]
pub enum FeedError {
    /// No PTY could be allocated on this host.
    #[error("PTY unavailable: {0}")]
    PtyUnavailable(String),

    /// The child command could not be started.
    #[error("failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    /// Raw mode or another terminal operation failed.
    #[error("terminal I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Incremental UTF-8 decoder that holds back a split code point between reads.
///
/// Invalid bytes become U+FFFD; an incomplete trailing sequence waits for the
/// next call.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `bytes`, prefixed by anything held back from the last call.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Bytes waiting for the rest of a code point.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Puts the controlling terminal in raw mode until dropped.
#[derive(Debug)]
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    /// Enables raw mode.
    ///
    /// # Errors
    ///
    /// Returns the underlying terminal error.
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Restores cooked mode before the default panic output is printed.
///
/// Call once before creating a [`PtyFeed`] that uses raw mode.
pub fn install_panic_hook() {
    let previous_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        previous_hook(panic_info);
    }));
}

/// Current size of the controlling terminal as `(rows, cols)`.
#[must_use]
pub fn terminal_size() -> (u16, u16) {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => (rows, cols),
        _ => (DEFAULT_ROWS, DEFAULT_COLS),
    }
}

/// How to run the wrapped command.
#[derive(Debug, Clone)]
pub struct PtyOptions {
    /// Program to run.
    pub command: String,
    /// Arguments for the program.
    pub args: Vec<String>,
    /// Name attached to every chunk.
    pub terminal_name: String,
    pub rows: u16,
    pub cols: u16,
    /// Copy child output to our stdout.
    pub mirror_output: bool,
    /// Copy our stdin to the child, with the terminal in raw mode.
    pub forward_stdin: bool,
}

impl PtyOptions {
    /// Interactive defaults: mirror output, forward stdin, current terminal size.
    pub fn interactive(command: impl Into<String>, args: Vec<String>) -> Self {
        let command = command.into();
        let (rows, cols) = terminal_size();
        Self {
            terminal_name: command.clone(),
            command,
            args,
            rows,
            cols,
            mirror_output: true,
            forward_stdin: true,
        }
    }
}

/// A child process running in a PTY, reported chunk by chunk.
pub struct PtyFeed {
    master: Box<dyn MasterPty + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    exit_rx: Option<oneshot::Receiver<u32>>,
    /// Held when stdin is not forwarded; dropping the writer hangs up the child.
    writer: Option<Box<dyn Write + Send>>,
    _raw_mode: Option<RawModeGuard>,
    pid: Option<u32>,
}

impl PtyFeed {
    /// Opens a PTY, starts the command in it, and begins streaming chunks.
    ///
    /// # Errors
    ///
    /// - [`FeedError::PtyUnavailable`] if no PTY can be opened
    /// - [`FeedError::Spawn`] if the command cannot be started
    /// - [`FeedError::Io`] if raw mode cannot be enabled
    pub fn spawn(options: PtyOptions, sender: mpsc::Sender<TerminalChunk>) -> Result<Self, FeedError> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| FeedError::PtyUnavailable(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&options.command);
        cmd.args(&options.args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }
        if std::env::var_os("TERM").is_none() {
            cmd.env("TERM", "xterm-256color");
        }

        info!(
            command = %options.command,
            args = ?options.args,
            rows = options.rows,
            cols = options.cols,
            "Spawning PTY command"
        );

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| FeedError::Spawn {
                command: options.command.clone(),
                message: e.to_string(),
            })?;
        // The child holds its own handle to the slave side.
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();
        info!(pid = ?pid, "PTY process started");

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| FeedError::PtyUnavailable(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| FeedError::PtyUnavailable(e.to_string()))?;

        let raw_mode = if options.forward_stdin && io::stdin().is_terminal() {
            Some(RawModeGuard::enable()?)
        } else {
            None
        };

        spawn_reader_thread(reader, options.terminal_name.clone(), options.mirror_output, sender);

        let writer = if options.forward_stdin {
            spawn_stdin_thread(writer);
            None
        } else {
            Some(writer)
        };

        let (exit_tx, exit_rx) = oneshot::channel();
        thread::spawn(move || {
            let code = match child.wait() {
                Ok(status) => status.exit_code(),
                Err(e) => {
                    warn!(error = %e, "Failed to wait for PTY child");
                    1
                }
            };
            debug!(code, "PTY child exited");
            let _ = exit_tx.send(code);
        });

        Ok(Self {
            master: pair.master,
            killer,
            exit_rx: Some(exit_rx),
            writer,
            _raw_mode: raw_mode,
            pid,
        })
    }

    /// Process id of the child, where the platform reports one.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Takes the receiver that resolves with the child's exit code.
    ///
    /// Returns `None` after the first call.
    pub fn take_exit(&mut self) -> Option<oneshot::Receiver<u32>> {
        self.exit_rx.take()
    }

    /// Resizes the PTY to match the controlling terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the PTY rejects the new size.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), FeedError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| FeedError::Io(io::Error::other(e.to_string())))
    }

    /// Writes bytes to the child when stdin is not being forwarded.
    ///
    /// # Errors
    ///
    /// Fails if stdin is being forwarded or the write fails.
    pub fn write_input(&mut self, data: &[u8]) -> Result<(), FeedError> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            FeedError::Io(io::Error::other("stdin is forwarded to the PTY"))
        })?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    /// Kills the child.
    pub fn kill(&mut self) {
        if let Err(e) = self.killer.kill() {
            debug!(error = %e, "Failed to kill PTY child");
        }
    }
}

fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    terminal_name: String,
    mirror_output: bool,
    sender: mpsc::Sender<TerminalChunk>,
) {
    thread::spawn(move || {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut decoder = Utf8Decoder::new();
        let mut stdout = io::stdout();

        loop {
            match reader.read(&mut buffer) {
                Ok(0) => {
                    debug!("PTY EOF");
                    break;
                }
                Ok(n) => {
                    if mirror_output {
                        let _ = stdout.write_all(&buffer[..n]);
                        let _ = stdout.flush();
                    }

                    let data = decoder.decode(&buffer[..n]);
                    if data.is_empty() {
                        continue;
                    }
                    if sender
                        .blocking_send(TerminalChunk::new(terminal_name.clone(), data))
                        .is_err()
                    {
                        debug!("Chunk receiver dropped, stopping PTY reader");
                        break;
                    }
                }
                Err(e) => {
                    // Linux reports EIO once the child side closes.
                    debug!(error = %e, "PTY read ended");
                    break;
                }
            }
        }
    });
}

fn spawn_stdin_thread(mut writer: Box<dyn Write + Send>) {
    thread::spawn(move || {
        let mut stdin = io::stdin();
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        loop {
            match stdin.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if writer.write_all(&buffer[..n]).and_then(|()| writer.flush()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Error reading stdin");
                    break;
                }
            }
        }
        debug!("Stdin forwarder exiting");
    });
}

/// Reads stdin in chunks until EOF and forwards them as `terminal_name`.
pub fn spawn_stdin_feed(
    terminal_name: impl Into<String>,
    sender: mpsc::Sender<TerminalChunk>,
) -> JoinHandle<()> {
    let terminal_name = terminal_name.into();
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        forward_reader(&mut stdin, &terminal_name, &sender).await;
    })
}

/// Forwards an async reader as chunks until EOF, error, or the receiver closes.
pub async fn forward_reader<R>(
    reader: &mut R,
    terminal_name: &str,
    sender: &mpsc::Sender<TerminalChunk>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Decoder::new();

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => {
                debug!(terminal = terminal_name, "Input feed reached EOF");
                break;
            }
            Ok(n) => {
                let data = decoder.decode(&buffer[..n]);
                if data.is_empty() {
                    continue;
                }
                if sender
                    .send(TerminalChunk::new(terminal_name, data))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(e) => {
                warn!(terminal = terminal_name, error = %e, "Input feed read failed");
                break;
            }
        }
    }
}
