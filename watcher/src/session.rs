//! The watcher session: a three-state machine driven by terminal chunks.
//!
//! # States
//!
//! ```text
//!            input ──────────────► WaitingInput ◄──┐ input (re-assert)
//!   Idle ──┤                        │      │       │
//!      ▲   └ processing ─┐          │      └───────┘
//!      │                 ▼          ▼ processing / answer
//!      └── prompt ─── Processing ◄──┘
//!                        │ input
//!                        └──────────► WaitingInput
//! ```
//!
//! Each accepted chunk is classified and checked against the current state's
//! rules in order; the first match wins. Entering `WaitingInput` or returning
//! to `Idle` fires pause-and-focus, entering `Processing` fires resume, and a
//! new question seen while already in `WaitingInput` re-fires pause-and-focus
//! without a state change.
//!
//! # Gating
//!
//! Before classification a chunk is dropped if the watcher is disabled or if
//! it arrives strictly inside the debounce window opened by the last fired
//! effect. Dropped chunks leave no trace in the session.
//!
//! The session is not `Sync`-shared: one task owns it and feeds it chunks in
//! order.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use crate::classifier::{Classifier, ClassifierError};
use crate::effector::Effector;
use crate::flag::EnabledFlag;
use crate::types::{
    ChunkOutcome, DebugState, DropReason, Effect, Signals, TerminalChunk, Transition,
    TransitionReason, WatcherState,
};
use crate::utils::preview::{
    hex_preview, preview, HEX_PREVIEW_BYTES, PREVIEW_CHARS, TRANSITION_PREVIEW_CHARS,
};
use crate::utils::DebounceGate;

/// Session settings that do not come from the flag file.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Initial enabled state.
    pub enabled: bool,
    /// Debounce gate for incoming chunks.
    pub gate: DebounceGate,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            gate: DebounceGate::default(),
        }
    }
}

/// Owns the watcher state for the lifetime of a watched terminal.
pub struct WatcherSession<E: Effector> {
    state: WatcherState,
    enabled: bool,
    gate: DebounceGate,
    last_trigger_wall: Option<DateTime<Utc>>,
    listener_active: bool,
    classifier: Classifier,
    effector: E,
    flag: Option<EnabledFlag>,
}

impl<E: Effector> WatcherSession<E> {
    /// Creates an idle session with the built-in classifier.
    ///
    /// When `flag` is given, the initial enabled state is written to it so the
    /// external scripts see the same value as the session.
    ///
    /// # Errors
    ///
    /// Fails only if the built-in patterns do not compile.
    pub fn new(
        options: SessionOptions,
        effector: E,
        flag: Option<EnabledFlag>,
    ) -> Result<Self, ClassifierError> {
        Ok(Self::with_classifier(
            options,
            Classifier::new()?,
            effector,
            flag,
        ))
    }

    /// Creates an idle session around an existing classifier.
    pub fn with_classifier(
        options: SessionOptions,
        classifier: Classifier,
        effector: E,
        flag: Option<EnabledFlag>,
    ) -> Self {
        if let Some(flag) = &flag {
            flag.write_or_log(options.enabled);
        }

        info!(
            enabled = options.enabled,
            debounce_ms = options.gate.window().as_millis(),
            "Watcher session created"
        );

        Self {
            state: WatcherState::Idle,
            enabled: options.enabled,
            gate: options.gate,
            last_trigger_wall: None,
            listener_active: false,
            classifier,
            effector,
            flag,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Whether chunks are being processed.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The effector, for inspection.
    pub fn effector(&self) -> &E {
        &self.effector
    }

    /// The classifier used for every chunk.
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Instant of the last fired effect.
    #[must_use]
    pub fn last_trigger(&self) -> Option<Instant> {
        self.gate.last_accepted()
    }

    /// Records whether a terminal feed is attached.
    pub fn set_listener_active(&mut self, active: bool) {
        self.listener_active = active;
    }

    /// Enables or disables the watcher and persists the value to the flag file.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if let Some(flag) = &self.flag {
            flag.write_or_log(enabled);
        }
        info!(enabled, "Watcher {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Flips the enabled state and returns the new value.
    pub fn toggle(&mut self) -> bool {
        let enabled = !self.enabled;
        self.set_enabled(enabled);
        enabled
    }

    /// Adopts an enabled value read from the flag file, without writing back.
    pub fn apply_external_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!(enabled, "Enabled flag changed externally");
            self.enabled = enabled;
        }
    }

    /// Fires pause-and-focus by hand. State and debounce are untouched.
    pub fn force_pause_and_focus(&self) {
        info!("Manual pause-and-focus");
        self.effector.pause_and_focus();
    }

    /// Fires resume by hand. State and debounce are untouched.
    pub fn force_resume(&self) {
        info!("Manual resume");
        self.effector.resume();
    }

    /// Snapshot for diagnostics.
    #[must_use]
    pub fn debug_state(&self, now: Instant) -> DebugState {
        DebugState {
            state: self.state,
            enabled: self.enabled,
            last_trigger: self.last_trigger_wall,
            since_last_trigger_ms: self
                .gate
                .elapsed_since_mark(now)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            listener_active: self.listener_active,
            debounce_ms: u64::try_from(self.gate.window().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Gates, classifies and acts on one chunk.
    pub fn process_chunk(&mut self, chunk: &TerminalChunk) -> ChunkOutcome {
        trace!(
            terminal = %chunk.terminal,
            chars = chunk.data.len(),
            "Terminal data event"
        );

        if !self.enabled {
            trace!("Skipping chunk, watcher disabled");
            return ChunkOutcome::Dropped(DropReason::Disabled);
        }

        if !self.gate.is_open(chunk.received_at) {
            trace!("Skipping chunk, debounced");
            return ChunkOutcome::Dropped(DropReason::Debounced);
        }

        debug!(
            state = %self.state,
            data = %preview(&chunk.data, PREVIEW_CHARS),
            hex = %hex_preview(&chunk.data, HEX_PREVIEW_BYTES),
            "Processing terminal data"
        );

        let signals = self.classifier.classify(&chunk.data);
        debug!(
            input = signals.input_required,
            processing = signals.processing,
            answer = signals.answer_submitted,
            prompt = signals.prompt_ready,
            "Pattern match results"
        );

        let transition = next_transition(self.state, &signals);
        if let Some(t) = &transition {
            self.apply(t, chunk);
        }

        ChunkOutcome::Accepted {
            signals,
            transition,
        }
    }

    fn apply(&mut self, transition: &Transition, chunk: &TerminalChunk) {
        info!(
            from = %transition.from,
            to = %transition.to,
            reason = ?transition.reason,
            data = %preview(&chunk.data, TRANSITION_PREVIEW_CHARS),
            "State transition"
        );

        self.state = transition.to;
        self.gate.mark(chunk.received_at);
        self.last_trigger_wall = Some(Utc::now());

        match transition.effect {
            Effect::PauseAndFocus => self.effector.pause_and_focus(),
            Effect::Resume => self.effector.resume(),
        }
    }
}

/// The transition table. Rows for each state are checked in order.
fn next_transition(state: WatcherState, signals: &Signals) -> Option<Transition> {
    use TransitionReason as R;
    use WatcherState as S;

    let (to, effect, reason) = match state {
        S::Idle if signals.input_required => {
            (S::WaitingInput, Effect::PauseAndFocus, R::InputRequested)
        }
        S::Idle if signals.processing => (S::Processing, Effect::Resume, R::ProcessingDetected),
        S::Idle => return None,

        S::WaitingInput if signals.processing => {
            (S::Processing, Effect::Resume, R::ProcessingDetected)
        }
        S::WaitingInput if signals.answer_submitted => {
            (S::Processing, Effect::Resume, R::AnswerSubmitted)
        }
        S::WaitingInput if signals.input_required => {
            (S::WaitingInput, Effect::PauseAndFocus, R::QuestionReasserted)
        }
        S::WaitingInput => return None,

        S::Processing if signals.prompt_ready => {
            (S::Idle, Effect::PauseAndFocus, R::PromptReady)
        }
        S::Processing if signals.input_required => {
            (S::WaitingInput, Effect::PauseAndFocus, R::InputRequested)
        }
        S::Processing => return None,
    };

    Some(Transition {
        from: state,
        to,
        effect,
        reason,
    })
}
