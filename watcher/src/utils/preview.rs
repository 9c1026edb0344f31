//! Log previews of raw terminal chunks.
//!
//! Chunks are logged with control whitespace collapsed and a length cap, plus
//! a hex dump prefix so hidden escape bytes stay visible. These helpers only
//! shape log output; classification always sees the untouched chunk.

use std::fmt::Write;

/// Character cap for chunk previews in processing logs.
pub const PREVIEW_CHARS: usize = 100;

/// Character cap for previews embedded in transition logs.
pub const TRANSITION_PREVIEW_CHARS: usize = 50;

/// Byte cap for hex previews.
pub const HEX_PREVIEW_BYTES: usize = 50;

/// Collapses whitespace runs (including `\r`, `\n`, `\t`) to single spaces,
/// trims, and caps the result at `max_chars` characters followed by `...`.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.chars().count() <= max_chars {
        return cleaned;
    }

    let mut truncated: String = cleaned.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

/// Lowercase hex of the first `max_bytes` bytes of `text`.
#[must_use]
pub fn hex_preview(text: &str, max_bytes: usize) -> String {
    text.as_bytes()
        .iter()
        .take(max_bytes)
        .fold(String::with_capacity(max_bytes * 2), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}
