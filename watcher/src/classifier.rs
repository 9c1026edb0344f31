//! Pattern classifier for raw terminal output.
//!
//! Each chunk of terminal output is tested against four fixed pattern sets.
//! A set matches when any one of its rules matches anywhere in the chunk. The
//! text is matched as-is: escape sequences are part of the input, and some
//! rules (the answer-submitted redraw artifacts) depend on them.
//!
//! Line-anchored rules use CRLF-aware multiline mode, so `^` and `$` treat
//! `\r`, `\n` and `\r\n` as line boundaries the way terminal output uses them.
//! Rules built on `.` use the same mode, so a wildcard never runs across a
//! bare `\r` redraw into the next line fragment.
//!
//! # Example
//!
//! ```
//! use claude_watcher::classifier::Classifier;
//!
//! let classifier = Classifier::new().unwrap();
//! let signals = classifier.classify("Do you want to proceed? (y/n)");
//! assert!(signals.input_required);
//! assert!(!signals.prompt_ready);
//! ```

use regex::Regex;
use thiserror::Error;

use crate::types::Signals;

/// Rules meaning the assistant is blocked waiting for the user.
const INPUT_REQUIRED_PATTERNS: &[&str] = &[
    r"(?mR)^\? ",
    r"(?i)\(y/n\)",
    r"\(Y/n\)",
    r"(?i)\[y/N\]",
    r"(?i)Permission required",
    r"(?iR)Waiting for.*input",
    r"(?i)Press Enter",
    r"(?i)Choose an option",
    r"(?iR)Select.*:",
    r"(?iR)Enter.*:",
    r"(?R)\? .*\[.*\]",
    r"(?i)Would you like to",
    r"(?i)Do you want to",
    r"(?i)Please confirm",
    r"(?i)\(press enter to continue\)",
];

/// A line holding only the `>` prompt.
const PROMPT_READY_PATTERNS: &[&str] = &[r"(?mR)^>\s*$"];

/// Redraw artifacts left behind once a pending question is answered.
const ANSWER_SUBMITTED_PATTERNS: &[&str] = &[
    r"\x1b\[2K",
    r"\x1b\[\d*A",
    r"\x1b\[\d*J",
    "✓",
    "›",
    r"(?mR)^[A-Z][a-z].*\(Recommended\)",
];

/// Spinner glyphs and status verbs printed while work is in progress.
const PROCESSING_PATTERNS: &[&str] = &[
    r"[\x{2800}-\x{28FF}]",
    r"\x{25CF}",
    r"\x{2022}",
    r"\x{00B7}",
    r"\x{2026}",
    r"\.{3,}",
    r"(?i)Thinking",
    r"(?i)Processing",
    r"(?i)Working",
    r"(?i)Reading",
    r"(?i)Writing",
    r"(?i)Running",
    r"(?i)Searching",
    r"(?i)Editing",
];

/// Errors raised while compiling the pattern sets.
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// A rule failed to compile.
    #[error("invalid pattern in {set} set: {pattern}: {source}")]
    InvalidPattern {
        set: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A named, immutable list of compiled rules with "any match wins" semantics.
#[derive(Debug, Clone)]
pub struct PatternSet {
    name: &'static str,
    rules: Vec<Regex>,
}

impl PatternSet {
    /// Compiles every rule in `patterns`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::InvalidPattern`] for the first rule that
    /// does not compile.
    pub fn new(name: &'static str, patterns: &[&str]) -> Result<Self, ClassifierError> {
        let rules = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ClassifierError::InvalidPattern {
                    set: name,
                    pattern: (*pattern).to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { name, rules })
    }

    /// Set name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of rules in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the set has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns `true` if any rule matches anywhere in `text`.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.rules.iter().any(|rule| rule.is_match(text))
    }
}

/// The four pattern sets, compiled once per session.
#[derive(Debug, Clone)]
pub struct Classifier {
    input_required: PatternSet,
    prompt_ready: PatternSet,
    answer_submitted: PatternSet,
    processing: PatternSet,
}

impl Classifier {
    /// Compiles the built-in pattern sets.
    ///
    /// # Errors
    ///
    /// Only fails if a built-in rule is malformed.
    pub fn new() -> Result<Self, ClassifierError> {
        Ok(Self {
            input_required: PatternSet::new("input_required", INPUT_REQUIRED_PATTERNS)?,
            prompt_ready: PatternSet::new("prompt_ready", PROMPT_READY_PATTERNS)?,
            answer_submitted: PatternSet::new("answer_submitted", ANSWER_SUBMITTED_PATTERNS)?,
            processing: PatternSet::new("processing", PROCESSING_PATTERNS)?,
        })
    }

    /// The assistant is asking the user something.
    #[must_use]
    pub fn is_input_required(&self, text: &str) -> bool {
        self.input_required.matches(text)
    }

    /// The assistant is back at its `>` prompt.
    #[must_use]
    pub fn is_prompt_ready(&self, text: &str) -> bool {
        self.prompt_ready.matches(text)
    }

    /// A pending question was just answered.
    #[must_use]
    pub fn is_answer_submitted(&self, text: &str) -> bool {
        self.answer_submitted.matches(text)
    }

    /// The assistant is busy.
    #[must_use]
    pub fn is_processing(&self, text: &str) -> bool {
        self.processing.matches(text)
    }

    /// Evaluates all four sets against `text`.
    #[must_use]
    pub fn classify(&self, text: &str) -> Signals {
        Signals {
            input_required: self.is_input_required(text),
            processing: self.is_processing(text),
            answer_submitted: self.is_answer_submitted(text),
            prompt_ready: self.is_prompt_ready(text),
        }
    }

    /// The compiled sets, in the order input, prompt, answer, processing.
    #[must_use]
    pub fn sets(&self) -> [&PatternSet; 4] {
        [
            &self.input_required,
            &self.prompt_ready,
            &self.answer_submitted,
            &self.processing,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new().expect("built-in patterns compile")
    }

    #[test]
    fn builtin_sets_compile_with_expected_sizes() {
        let c = classifier();
        let sizes: Vec<_> = c.sets().iter().map(|s| (s.name(), s.len())).collect();
        assert_eq!(
            sizes,
            vec![
                ("input_required", 15),
                ("prompt_ready", 1),
                ("answer_submitted", 6),
                ("processing", 14),
            ]
        );
    }

    #[test]
    fn invalid_pattern_reports_set_and_rule() {
        let err = PatternSet::new("broken", &["(unclosed"]).unwrap_err();
        let ClassifierError::InvalidPattern { set, pattern, .. } = &err;
        assert_eq!(*set, "broken");
        assert_eq!(pattern, "(unclosed");
        assert!(err.to_string().starts_with("invalid pattern in broken set"));
    }

    #[test]
    fn question_marker_only_at_line_start() {
        let c = classifier();
        assert!(c.is_input_required("? Which database should I use"));
        assert!(c.is_input_required("some output\r\n? Pick one"));
        assert!(!c.is_input_required("is it done? yes"));
    }

    #[test]
    fn yes_no_confirmation_styles() {
        let c = classifier();
        assert!(c.is_input_required("Overwrite file? (y/n)"));
        assert!(c.is_input_required("Overwrite file? (Y/N)"));
        assert!(c.is_input_required("Continue (Y/n)"));
        assert!(c.is_input_required("Delete branch [y/N]"));
        assert!(c.is_input_required("Delete branch [Y/n]"));
    }

    #[test]
    fn explicit_input_phrases() {
        let c = classifier();
        for text in [
            "Permission required to run bash",
            "Waiting for your input",
            "press enter to start",
            "Choose an option:\n1) Yes\n2) No",
            "Select a file: ",
            "Enter the branch name: ",
            "Would you like to continue",
            "Do you want to make this edit to main.rs?",
            "please CONFIRM the deletion",
            "(Press Enter to continue)",
        ] {
            assert!(c.is_input_required(text), "expected input match for {text:?}");
        }
    }

    #[test]
    fn question_with_bracketed_options() {
        let c = classifier();
        assert!(c.is_input_required("Proceed? [yes/no/always]"));
    }

    #[test]
    fn select_and_enter_need_a_colon_on_the_same_line() {
        let c = classifier();
        assert!(!c.is_input_required("Selected 3 files\nsummary: done"));
        assert!(!c.is_input_required("entered the loop"));
    }

    #[test]
    fn waiting_for_input_stays_on_one_line() {
        let c = classifier();
        assert!(c.is_input_required("Waiting for your input"));
        assert!(!c.is_input_required("Waiting for build\rno input needed"));
        assert!(!c.is_input_required("Waiting for build\nno input needed"));
    }

    #[test]
    fn select_does_not_cross_carriage_return() {
        let c = classifier();
        assert!(c.is_input_required("Select a model:"));
        assert!(!c.is_input_required("Selected 3 files\rstatus: ok"));
    }

    #[test]
    fn enter_does_not_cross_carriage_return() {
        let c = classifier();
        assert!(c.is_input_required("Enter your API key:"));
        assert!(!c.is_input_required("Entering plan mode\r\x1b[2K✻ Thinking: 3s"));
    }

    #[test]
    fn bracketed_options_do_not_cross_carriage_return() {
        let c = classifier();
        assert!(c.is_input_required("Continue? [2 files changed]"));
        assert!(!c.is_input_required("Continue? \r[2 files changed]"));
    }

    #[test]
    fn plain_text_matches_nothing() {
        let signals = classifier().classify("hello world");
        assert_eq!(signals, Signals::default());
    }

    #[test]
    fn prompt_ready_is_a_bare_chevron_line() {
        let c = classifier();
        assert!(c.is_prompt_ready("> "));
        assert!(c.is_prompt_ready(">"));
        assert!(c.is_prompt_ready("done\r\n>   \r\n"));
        assert!(c.is_prompt_ready("output\n>\nmore"));
        assert!(!c.is_prompt_ready("> fix the tests"));
        assert!(!c.is_prompt_ready("a > b"));
    }

    #[test]
    fn answer_submitted_escape_sequences() {
        let c = classifier();
        assert!(c.is_answer_submitted("\x1b[2K"));
        assert!(c.is_answer_submitted("\x1b[A"));
        assert!(c.is_answer_submitted("\x1b[12A"));
        assert!(c.is_answer_submitted("\x1b[J"));
        assert!(c.is_answer_submitted("\x1b[0J"));
        assert!(!c.is_answer_submitted("\x1b[31mred\x1b[0m"));
    }

    #[test]
    fn answer_submitted_glyphs_and_echo() {
        let c = classifier();
        assert!(c.is_answer_submitted("✓ Saved"));
        assert!(c.is_answer_submitted("› Option two"));
        assert!(c.is_answer_submitted("Postgres (Recommended)"));
        assert!(c.is_answer_submitted("picked:\r\nSqlite (Recommended)"));
        assert!(!c.is_answer_submitted("POSTGRES (Recommended)"));
    }

    #[test]
    fn processing_spinners() {
        let c = classifier();
        for glyph in ["⠋", "⠙", "⠹", "⣿", "●", "•", "·", "…", "..."] {
            assert!(c.is_processing(glyph), "expected spinner match for {glyph:?}");
        }
        assert!(!c.is_processing(".."));
    }

    #[test]
    fn processing_status_verbs_any_case() {
        let c = classifier();
        for verb in [
            "Thinking",
            "PROCESSING",
            "working",
            "Reading src/lib.rs",
            "writing tests",
            "Running cargo",
            "searching",
            "Editing main.rs",
        ] {
            assert!(c.is_processing(verb), "expected verb match for {verb:?}");
        }
    }

    #[test]
    fn classify_reports_every_set() {
        let signals = classifier().classify("\x1b[2K⠋ Thinking\r\n? Continue [y/N]\r\n> ");
        assert!(signals.input_required);
        assert!(signals.processing);
        assert!(signals.answer_submitted);
        assert!(signals.prompt_ready);
    }
}
