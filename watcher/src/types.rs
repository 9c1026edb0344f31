//! Core types shared by the classifier, the session driver and the CLI.
//!
//! States serialize to snake_case so `debug-state --json` output and log
//! fields read the same way (`idle`, `waiting_input`, `processing`).

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the watched assistant appears to be doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherState {
    /// Nothing detected yet, or the assistant is back at its prompt.
    #[default]
    Idle,
    /// The assistant is blocked on a question for the user.
    WaitingInput,
    /// The assistant is thinking, running tools, or streaming output.
    Processing,
}

impl WatcherState {
    /// Returns the snake_case label used in logs and on the CLI.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WaitingInput => "waiting_input",
            Self::Processing => "processing",
        }
    }
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single read from a terminal, as delivered by a feed.
#[derive(Debug, Clone)]
pub struct TerminalChunk {
    /// Name of the terminal the data came from.
    pub terminal: String,
    /// Raw text, escape sequences included.
    pub data: String,
    /// When the chunk arrived.
    pub received_at: Instant,
}

impl TerminalChunk {
    /// Creates a chunk stamped with the current time.
    pub fn new(terminal: impl Into<String>, data: impl Into<String>) -> Self {
        Self::at(terminal, data, Instant::now())
    }

    /// Creates a chunk with an explicit arrival time.
    pub fn at(terminal: impl Into<String>, data: impl Into<String>, received_at: Instant) -> Self {
        Self {
            terminal: terminal.into(),
            data: data.into(),
            received_at,
        }
    }
}

/// Answers to the four questions asked of every accepted chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signals {
    pub input_required: bool,
    pub processing: bool,
    pub answer_submitted: bool,
    pub prompt_ready: bool,
}

/// External side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    PauseAndFocus,
    Resume,
}

/// Why a transition (or a same-state re-trigger) fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    InputRequested,
    ProcessingDetected,
    AnswerSubmitted,
    QuestionReasserted,
    PromptReady,
}

/// A state change, or a same-state effect, produced by one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: WatcherState,
    pub to: WatcherState,
    pub effect: Effect,
    pub reason: TransitionReason,
}

/// Why a chunk never reached the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Disabled,
    Debounced,
}

/// Result of feeding one chunk to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Gated before classification.
    Dropped(DropReason),
    /// Classified; `transition` is `None` when nothing fired.
    Accepted {
        signals: Signals,
        transition: Option<Transition>,
    },
}

impl ChunkOutcome {
    /// Returns the transition if one fired.
    #[must_use]
    pub fn transition(&self) -> Option<&Transition> {
        match self {
            Self::Accepted {
                transition: Some(t),
                ..
            } => Some(t),
            _ => None,
        }
    }

    /// Returns `true` if the chunk was gated out.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped(_))
    }
}

/// Snapshot of a session for the `debug-state` command and SIGUSR1 dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugState {
    pub state: WatcherState,
    pub enabled: bool,
    /// Wall-clock time of the last fired effect, if any.
    pub last_trigger: Option<DateTime<Utc>>,
    pub since_last_trigger_ms: Option<u64>,
    pub listener_active: bool,
    pub debounce_ms: u64,
}
