//! Utility modules for the watcher.
//!
//! # Modules
//!
//! - [`debounce`]: Leading-edge debounce gate for terminal chunks
//! - [`preview`]: Log previews of raw terminal output

pub mod debounce;
pub mod preview;

pub use debounce::{DebounceGate, DEFAULT_DEBOUNCE_MS};
pub use preview::{hex_preview, preview};
