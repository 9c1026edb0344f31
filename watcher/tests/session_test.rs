//! End-to-end behaviour of the watcher session.
//!
//! Chunks are fed with explicit arrival times so debounce behaviour is
//! deterministic, and a recording effector stands in for the scripts.
//!
//! # Properties Tested
//!
//! 1. Question markers, prompts and spinners drive the documented transitions
//! 2. Each fired effect calls the effector exactly once
//! 3. The debounce window drops chunks strictly inside it, accepts its boundary
//! 4. A disabled session ignores everything
//! 5. Enabled changes reach the flag file; external changes do not write back
//! 6. Manual triggers never touch state or debounce

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use claude_watcher::effector::Effector;
use claude_watcher::flag::EnabledFlag;
use claude_watcher::session::{SessionOptions, WatcherSession};
use claude_watcher::types::{
    ChunkOutcome, DropReason, Effect, TerminalChunk, TransitionReason, WatcherState,
};
use claude_watcher::utils::DebounceGate;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

const WINDOW: Duration = Duration::from_millis(500);

/// Records effector calls instead of running scripts.
#[derive(Debug, Clone, Default)]
struct RecordingEffector {
    calls: Arc<Mutex<Vec<Effect>>>,
}

impl RecordingEffector {
    fn calls(&self) -> Vec<Effect> {
        self.calls.lock().unwrap().clone()
    }
}

impl Effector for RecordingEffector {
    fn pause_and_focus(&self) {
        self.calls.lock().unwrap().push(Effect::PauseAndFocus);
    }

    fn resume(&self) {
        self.calls.lock().unwrap().push(Effect::Resume);
    }
}

/// A session plus a clock that only moves when told to.
struct Harness {
    session: WatcherSession<RecordingEffector>,
    effector: RecordingEffector,
    now: Instant,
}

impl Harness {
    fn new() -> Self {
        Self::with_options(SessionOptions {
            enabled: true,
            gate: DebounceGate::new(WINDOW),
        })
    }

    fn with_options(options: SessionOptions) -> Self {
        let effector = RecordingEffector::default();
        let session = WatcherSession::new(options, effector.clone(), None).unwrap();
        Self {
            session,
            effector,
            now: Instant::now(),
        }
    }

    /// Advances the clock by `ms` and feeds `data`.
    fn feed_after(&mut self, ms: u64, data: &str) -> ChunkOutcome {
        self.now += Duration::from_millis(ms);
        let chunk = TerminalChunk::at("claude", data, self.now);
        self.session.process_chunk(&chunk)
    }

    /// Feeds `data` well outside any debounce window.
    fn feed(&mut self, data: &str) -> ChunkOutcome {
        self.feed_after(10_000, data)
    }

    fn state(&self) -> WatcherState {
        self.session.state()
    }

    fn calls(&self) -> Vec<Effect> {
        self.effector.calls()
    }

    /// Drives the session into `WaitingInput` and forgets the effect.
    fn into_waiting(mut self) -> Self {
        self.feed("Do you want to proceed?");
        assert_eq!(self.state(), WatcherState::WaitingInput);
        self.effector.calls.lock().unwrap().clear();
        self
    }

    /// Drives the session into `Processing` and forgets the effect.
    fn into_processing(mut self) -> Self {
        self.feed("Thinking");
        assert_eq!(self.state(), WatcherState::Processing);
        self.effector.calls.lock().unwrap().clear();
        self
    }
}

// =============================================================================
// Transitions
// =============================================================================

#[test]
fn question_marker_from_idle_waits_for_input() {
    for chunk in ["? Which file should I edit", "output\n? Pick one", "done\r\n? Continue"] {
        let mut h = Harness::new();
        let outcome = h.feed(chunk);

        assert_eq!(h.state(), WatcherState::WaitingInput, "{chunk:?}");
        assert_eq!(h.calls(), [Effect::PauseAndFocus], "{chunk:?}");
        assert_eq!(
            outcome.transition().map(|t| t.reason),
            Some(TransitionReason::InputRequested)
        );
    }
}

#[test]
fn prompt_from_processing_returns_to_idle() {
    let mut h = Harness::new().into_processing();
    h.feed("\r\n> ");

    assert_eq!(h.state(), WatcherState::Idle);
    assert_eq!(h.calls(), [Effect::PauseAndFocus]);
}

#[test]
fn choose_an_option_from_idle() {
    let mut h = Harness::new();
    h.feed("Choose an option:\n1) Yes\n2) No");

    assert_eq!(h.state(), WatcherState::WaitingInput);
    assert_eq!(h.calls(), [Effect::PauseAndFocus]);
}

#[test]
fn clear_line_from_waiting_resumes() {
    let mut h = Harness::new().into_waiting();
    let outcome = h.feed("\x1b[2K");

    assert_eq!(h.state(), WatcherState::Processing);
    assert_eq!(h.calls(), [Effect::Resume]);
    assert_eq!(
        outcome.transition().map(|t| t.reason),
        Some(TransitionReason::AnswerSubmitted)
    );
}

#[test]
fn bare_prompt_line_from_processing() {
    let mut h = Harness::new().into_processing();
    h.feed("> ");

    assert_eq!(h.state(), WatcherState::Idle);
    assert_eq!(h.calls(), [Effect::PauseAndFocus]);
}

#[test]
fn unmatched_text_from_idle_does_nothing() {
    let mut h = Harness::new();
    let outcome = h.feed("hello world");

    assert_eq!(h.state(), WatcherState::Idle);
    assert!(h.calls().is_empty());
    match outcome {
        ChunkOutcome::Accepted { signals, transition } => {
            assert_eq!(signals, Default::default());
            assert!(transition.is_none());
        }
        ChunkOutcome::Dropped(reason) => panic!("unexpected drop: {reason:?}"),
    }
}

#[test]
fn spinner_from_idle_resumes() {
    let mut h = Harness::new();
    h.feed("\u{280B} Reading files");

    assert_eq!(h.state(), WatcherState::Processing);
    assert_eq!(h.calls(), [Effect::Resume]);
}

#[test]
fn input_request_while_processing() {
    let mut h = Harness::new().into_processing();
    h.feed("Permission required to edit src/main.rs");

    assert_eq!(h.state(), WatcherState::WaitingInput);
    assert_eq!(h.calls(), [Effect::PauseAndFocus]);
}

#[test]
fn processing_ignores_more_spinners() {
    let mut h = Harness::new().into_processing();
    let outcome = h.feed("\u{2819} Thinking...");

    assert_eq!(h.state(), WatcherState::Processing);
    assert!(h.calls().is_empty());
    assert!(outcome.transition().is_none());
}

#[test]
fn redrawn_status_line_keeps_processing() {
    for chunk in [
        "Entering plan mode\r\x1b[2K\u{273B} Thinking: 3s",
        "Selected 3 files\rstatus: ok",
        "Waiting for build\rno input needed",
    ] {
        let mut h = Harness::new().into_processing();
        let outcome = h.feed(chunk);

        assert_eq!(h.state(), WatcherState::Processing, "{chunk:?}");
        assert!(h.calls().is_empty(), "{chunk:?}");
        assert!(outcome.transition().is_none(), "{chunk:?}");
    }
}

#[test]
fn same_line_prompt_after_redraw_still_waits() {
    let mut h = Harness::new().into_processing();
    h.feed("\u{280B} Working\rEnter a commit message:");

    assert_eq!(h.state(), WatcherState::WaitingInput);
    assert_eq!(h.calls(), [Effect::PauseAndFocus]);
}

#[test]
fn repeated_question_reasserts_pause() {
    let mut h = Harness::new().into_waiting();
    let outcome = h.feed("Would you like to continue? (y/n)");

    assert_eq!(h.state(), WatcherState::WaitingInput);
    assert_eq!(h.calls(), [Effect::PauseAndFocus]);
    let t = outcome.transition().copied().unwrap();
    assert_eq!(t.from, WatcherState::WaitingInput);
    assert_eq!(t.to, WatcherState::WaitingInput);
    assert_eq!(t.reason, TransitionReason::QuestionReasserted);
}

#[test]
fn full_cycle() {
    let mut h = Harness::new();
    h.feed("? Apply this edit");
    h.feed("\x1b[1A\x1b[2K");
    h.feed("\r\n> \r\n");

    assert_eq!(h.state(), WatcherState::Idle);
    assert_eq!(
        h.calls(),
        [Effect::PauseAndFocus, Effect::Resume, Effect::PauseAndFocus]
    );
}

// =============================================================================
// Debounce
// =============================================================================

#[test]
fn second_spinner_inside_window_is_dropped() {
    let mut h = Harness::new();
    h.feed("Thinking");
    let second = h.feed_after(100, "Thinking");

    assert_eq!(second, ChunkOutcome::Dropped(DropReason::Debounced));
    assert_eq!(h.state(), WatcherState::Processing);
    assert_eq!(h.calls(), [Effect::Resume]);
}

#[test]
fn chunk_at_window_boundary_is_accepted() {
    let mut h = Harness::new();
    h.feed("Choose an option");
    let before = h.feed_after(499, "Thinking");
    assert!(before.is_dropped());

    let at = h.feed_after(1, "Thinking");
    assert!(!at.is_dropped());
    assert_eq!(h.state(), WatcherState::Processing);
    assert_eq!(h.calls(), [Effect::PauseAndFocus, Effect::Resume]);
}

#[test]
fn dropped_chunk_does_not_move_the_window() {
    let mut h = Harness::new();
    h.feed("Choose an option");
    let first = h.session.last_trigger();

    h.feed_after(400, "Thinking");
    assert_eq!(h.session.last_trigger(), first);

    // 500 ms after the accepted chunk, not after the dropped one.
    assert!(!h.feed_after(100, "Thinking").is_dropped());
}

#[test]
fn accepted_chunk_without_effect_leaves_window_closed() {
    let mut h = Harness::new();
    h.feed("Thinking");
    let marked = h.session.last_trigger();

    // Outside the window, accepted, but nothing fires.
    h.feed_after(600, "hello world");
    assert_eq!(h.session.last_trigger(), marked);

    // Still measured from the spinner, so this one is accepted too.
    assert!(!h.feed_after(1, "\r\n> ").is_dropped());
    assert_eq!(h.state(), WatcherState::Idle);
}

#[test]
fn reassert_resets_the_window() {
    let mut h = Harness::new().into_waiting();
    h.feed_after(600, "Do you want to proceed?");
    assert_eq!(h.calls(), [Effect::PauseAndFocus]);

    // Inside the window opened by the re-assert.
    assert!(h.feed_after(200, "Thinking").is_dropped());
    assert_eq!(h.state(), WatcherState::WaitingInput);
}

#[test]
fn zero_window_accepts_back_to_back_chunks() {
    let mut h = Harness::with_options(SessionOptions {
        enabled: true,
        gate: DebounceGate::new(Duration::ZERO),
    });
    h.feed_after(0, "? Pick one");
    h.feed_after(0, "Thinking");

    assert_eq!(h.state(), WatcherState::Processing);
    assert_eq!(h.calls(), [Effect::PauseAndFocus, Effect::Resume]);
}

// =============================================================================
// Enabled flag
// =============================================================================

#[test]
fn disabled_session_ignores_everything() {
    let mut h = Harness::with_options(SessionOptions {
        enabled: false,
        gate: DebounceGate::new(WINDOW),
    });

    for chunk in ["? Pick", "Thinking", "\x1b[2K", "> ", "Choose an option"] {
        assert_eq!(h.feed(chunk), ChunkOutcome::Dropped(DropReason::Disabled));
    }
    assert_eq!(h.state(), WatcherState::Idle);
    assert!(h.calls().is_empty());
    assert!(h.session.last_trigger().is_none());
}

#[test]
fn disabling_mid_session_freezes_state() {
    let mut h = Harness::new().into_processing();
    h.session.set_enabled(false);
    h.feed("> ");
    assert_eq!(h.state(), WatcherState::Processing);

    h.session.set_enabled(true);
    h.feed("> ");
    assert_eq!(h.state(), WatcherState::Idle);
}

#[test]
fn session_writes_initial_flag() {
    let dir = TempDir::new().unwrap();
    let flag = EnabledFlag::new(dir.path().join(".claude-watcher-enabled"));

    let options = SessionOptions {
        enabled: false,
        gate: DebounceGate::new(WINDOW),
    };
    let _session =
        WatcherSession::new(options, RecordingEffector::default(), Some(flag.clone())).unwrap();

    assert!(!flag.read());
}

#[test]
fn set_enabled_and_toggle_write_the_flag() {
    let dir = TempDir::new().unwrap();
    let flag = EnabledFlag::new(dir.path().join(".claude-watcher-enabled"));
    let mut session = WatcherSession::new(
        SessionOptions::default(),
        RecordingEffector::default(),
        Some(flag.clone()),
    )
    .unwrap();
    assert!(flag.read());

    session.set_enabled(false);
    assert!(!session.is_enabled());
    assert!(!flag.read());

    assert!(session.toggle());
    assert!(flag.read());
}

#[test]
fn external_change_does_not_write_back() {
    let dir = TempDir::new().unwrap();
    let flag = EnabledFlag::new(dir.path().join(".claude-watcher-enabled"));
    let mut session = WatcherSession::new(
        SessionOptions::default(),
        RecordingEffector::default(),
        Some(flag.clone()),
    )
    .unwrap();

    // Another process wrote something unexpected; we only adopt the value.
    std::fs::write(flag.path(), "off").unwrap();
    session.apply_external_enabled(flag.read());

    assert!(!session.is_enabled());
    assert_eq!(std::fs::read_to_string(flag.path()).unwrap(), "off");
}

// =============================================================================
// Manual triggers and diagnostics
// =============================================================================

#[test]
fn manual_triggers_leave_state_and_window_alone() {
    let mut h = Harness::new().into_processing();
    let marked = h.session.last_trigger();

    h.session.force_pause_and_focus();
    h.session.force_resume();

    assert_eq!(h.calls(), [Effect::PauseAndFocus, Effect::Resume]);
    assert_eq!(h.state(), WatcherState::Processing);
    assert_eq!(h.session.last_trigger(), marked);
}

#[test]
fn manual_triggers_work_while_disabled() {
    let mut h = Harness::new();
    h.session.set_enabled(false);
    h.session.force_resume();
    assert_eq!(h.calls(), [Effect::Resume]);
}

#[test]
fn debug_state_reports_the_session() {
    let mut h = Harness::new();
    let fresh = h.session.debug_state(h.now);
    assert_eq!(fresh.state, WatcherState::Idle);
    assert!(fresh.last_trigger.is_none());
    assert!(fresh.since_last_trigger_ms.is_none());
    assert_eq!(fresh.debounce_ms, 500);
    assert!(!fresh.listener_active);

    h.feed("Thinking");
    h.session.set_listener_active(true);
    let later = h.now + Duration::from_millis(250);
    let snapshot = h.session.debug_state(later);

    assert_eq!(snapshot.state, WatcherState::Processing);
    assert!(snapshot.enabled);
    assert!(snapshot.last_trigger.is_some());
    assert_eq!(snapshot.since_last_trigger_ms, Some(250));
    assert!(snapshot.listener_active);
}
