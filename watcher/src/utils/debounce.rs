//! Leading-edge debounce gate for terminal chunks.
//!
//! Terminals redraw in bursts, and a single spinner frame or prompt can arrive
//! as many small writes. The gate lets the first chunk of a burst through and
//! rejects every chunk that arrives strictly inside the window opened by the
//! last *accepted* chunk.
//!
//! The gate does not arm itself: [`DebounceGate::is_open`] only checks, and
//! the caller decides with [`DebounceGate::mark`] which chunks restart the
//! window. The session marks only chunks that fired an effect.
//!
//! # Example
//!
//! ```
//! use std::time::{Duration, Instant};
//! use claude_watcher::utils::debounce::DebounceGate;
//!
//! let mut gate = DebounceGate::new(Duration::from_millis(500));
//! let start = Instant::now();
//!
//! assert!(gate.is_open(start));
//! gate.mark(start);
//!
//! assert!(!gate.is_open(start + Duration::from_millis(499)));
//! assert!(gate.is_open(start + Duration::from_millis(500)));
//! ```

use std::time::{Duration, Instant};

use tracing::trace;

/// Default debounce window in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Tracks the last accepted instant and the window that follows it.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    /// How long the gate stays closed after a mark.
    window: Duration,
    /// When the gate was last marked. `None` until the first mark.
    last_accepted: Option<Instant>,
}

impl DebounceGate {
    /// Creates an open gate with the given window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Creates an open gate with the default 500ms window.
    #[must_use]
    pub fn with_default_window() -> Self {
        Self::new(Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }

    /// Returns `true` if a chunk arriving at `now` may be processed.
    ///
    /// A chunk landing exactly on `last_accepted + window` is let through.
    /// Instants earlier than the last mark are treated as zero elapsed time.
    #[must_use]
    pub fn is_open(&self, now: Instant) -> bool {
        match self.last_accepted {
            None => true,
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                trace!(
                    elapsed_ms = elapsed.as_millis(),
                    window_ms = self.window.as_millis(),
                    "Debounce check"
                );
                elapsed >= self.window
            }
        }
    }

    /// Restarts the window at `at`.
    pub fn mark(&mut self, at: Instant) {
        self.last_accepted = Some(at);
    }

    /// Time since the last mark, if any.
    #[must_use]
    pub fn elapsed_since_mark(&self, now: Instant) -> Option<Duration> {
        self.last_accepted
            .map(|last| now.saturating_duration_since(last))
    }

    /// The last marked instant.
    #[must_use]
    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }

    /// The configured window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replaces the window without touching the last mark.
    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::with_default_window()
    }
}
