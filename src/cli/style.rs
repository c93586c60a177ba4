//! Terminal styling shared by the commands
//!
//! Colors are applied unconditionally; `anstream::println` strips them when
//! stdout is not a terminal or `NO_COLOR` is set.

use indicatif::ProgressStyle;
use owo_colors::OwoColorize;
use std::fmt::Display;

/// Check mark for finished steps
pub const CHECK: &str = "✓";

/// Cross for failed steps
pub const CROSS: &str = "✗";

/// Semantic styles for command output
pub trait Stylize: Display + Sized {
    /// Secondary text
    fn muted(&self) -> String {
        self.dimmed().to_string()
    }

    /// Names the user typed or should notice
    fn emphasis(&self) -> String {
        self.bold().to_string()
    }

    /// Ids, branches and counts
    fn accent(&self) -> String {
        self.cyan().to_string()
    }

    /// Completed actions
    fn success(&self) -> String {
        self.green().to_string()
    }

    /// Problems that did not stop the command
    fn warn(&self) -> String {
        self.yellow().to_string()
    }

    /// Failures
    fn error(&self) -> String {
        self.red().to_string()
    }
}

impl<T: Display> Stylize for T {}

/// Styled check mark
pub fn check() -> String {
    CHECK.green().to_string()
}

/// Styled cross
pub fn cross() -> String {
    CROSS.red().to_string()
}

/// Spinner used while waiting on the store or a merge
pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}
