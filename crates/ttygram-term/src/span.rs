// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Attributed character spans read out of the terminal grid.

use std::fmt;

/// Normalized foreground color of a terminal cell.
///
/// The 16 ANSI colors map to the classic names (index 3 is `brown`, the
/// bright range gets a `light` prefix).  Indexed colors above 15 and
/// truecolor cells normalize to a lowercase hex triplet — those are theme
/// colors, never part of the syntax-highlight set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fg {
    Default,
    Black,
    Red,
    Green,
    Brown,
    Blue,
    Magenta,
    Cyan,
    White,
    LightBlack,
    LightRed,
    LightGreen,
    LightBrown,
    LightBlue,
    LightMagenta,
    LightCyan,
    LightWhite,
    Hex(String),
}

impl Fg {
    /// The TUI paints code with syntax highlighting and prose in the default
    /// foreground, so these colors are a ground-truth code signal.
    pub fn is_code_color(&self) -> bool {
        matches!(
            self,
            Fg::Blue
                | Fg::Red
                | Fg::Cyan
                | Fg::Brown
                | Fg::Green
                | Fg::LightBlue
                | Fg::LightRed
                | Fg::LightCyan
                | Fg::LightGreen
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Fg::Default => "default",
            Fg::Black => "black",
            Fg::Red => "red",
            Fg::Green => "green",
            Fg::Brown => "brown",
            Fg::Blue => "blue",
            Fg::Magenta => "magenta",
            Fg::Cyan => "cyan",
            Fg::White => "white",
            Fg::LightBlack => "lightblack",
            Fg::LightRed => "lightred",
            Fg::LightGreen => "lightgreen",
            Fg::LightBrown => "lightbrown",
            Fg::LightBlue => "lightblue",
            Fg::LightMagenta => "lightmagenta",
            Fg::LightCyan => "lightcyan",
            Fg::LightWhite => "lightwhite",
            Fg::Hex(h) => h,
        }
    }
}

impl fmt::Display for Fg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A contiguous run of characters sharing the same terminal attributes.
///
/// Produced by [`crate::TerminalEmulator::get_attributed_lines`]; adjacent
/// cells with identical `(fg, bold, italic)` are coalesced into one span,
/// and trailing whitespace-only spans are trimmed when a line is exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharSpan {
    pub text: String,
    pub fg: Fg,
    pub bold: bool,
    pub italic: bool,
}

impl CharSpan {
    pub fn new(text: impl Into<String>, fg: Fg, bold: bool, italic: bool) -> Self {
        Self {
            text: text.into(),
            fg,
            bold,
            italic,
        }
    }

    /// A span in the default foreground with no attributes.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, Fg::Default, false, false)
    }

    /// A span in the given color with no attributes.
    pub fn colored(text: impl Into<String>, fg: Fg) -> Self {
        Self::new(text, fg, false, false)
    }
}

/// Concatenate span texts into a single string.
pub(crate) fn spans_to_text(spans: &[CharSpan]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// The right-stripped text of a span list.
pub(crate) fn line_text(spans: &[CharSpan]) -> String {
    spans_to_text(spans).trim_end().to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_color_set_is_exact() {
        for fg in [
            Fg::Blue,
            Fg::Red,
            Fg::Cyan,
            Fg::Brown,
            Fg::Green,
            Fg::LightBlue,
            Fg::LightRed,
            Fg::LightCyan,
            Fg::LightGreen,
        ] {
            assert!(fg.is_code_color(), "{fg} should be a code color");
        }
        for fg in [
            Fg::Default,
            Fg::Black,
            Fg::White,
            Fg::Magenta,
            Fg::LightMagenta,
            Fg::Hex("b1b9f9".into()),
        ] {
            assert!(!fg.is_code_color(), "{fg} should not be a code color");
        }
    }

    #[test]
    fn line_text_strips_trailing_whitespace_only() {
        let spans = vec![CharSpan::plain("  hello"), CharSpan::plain("   ")];
        assert_eq!(line_text(&spans), "  hello");
    }
}
