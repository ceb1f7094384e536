// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Virtual terminal reconstruction.
//!
//! Instead of regex-stripping ANSI codes from the PTY stream, raw bytes are
//! fed into a real terminal emulator ([`alacritty_terminal`]) and the screen
//! buffer is read back out.  Scrollback is preserved so a fast response that
//! scrolls past the visible grid is not lost before the poll loop reads it.

use alacritty_terminal::event::{Event, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::cell::Flags;
use alacritty_terminal::term::test::TermSize;
use alacritty_terminal::term::{Config, Term};
use alacritty_terminal::vte::ansi::{Color, NamedColor, Processor, Rgb};

use crate::span::{CharSpan, Fg};

/// Terminal events (bell, title, clipboard) are irrelevant here; responses
/// to queries are handled by the CLI's own terminal on the host.
#[derive(Clone)]
struct EventProxy;

impl EventListener for EventProxy {
    fn send_event(&self, _event: Event) {}
}

/// Virtual terminal with scrollback and a change-detection snapshot.
///
/// Exposes the grid two ways, always in lockstep because both views read the
/// same buffer: plain right-stripped lines for regex classification, and
/// attributed [`CharSpan`] lines for color-driven region classification.
pub struct TerminalEmulator {
    term: Term<EventProxy>,
    parser: Processor,
    rows: u16,
    cols: u16,
    prev_display: Vec<String>,
}

impl TerminalEmulator {
    pub fn new(rows: u16, cols: u16, scrollback: usize) -> Self {
        let size = TermSize::new(cols as usize, rows as usize);
        let config = Config {
            scrolling_history: scrollback,
            ..Config::default()
        };
        Self {
            term: Term::new(config, &size, EventProxy),
            parser: Processor::new(),
            rows,
            cols,
            prev_display: vec![String::new(); rows as usize],
        }
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    /// Feed raw PTY bytes into the emulator.  Never fails: the VTE state
    /// machine consumes arbitrary byte sequences, replacing invalid UTF-8.
    pub fn feed(&mut self, data: &[u8]) {
        self.parser.advance(&mut self.term, data);
    }

    pub fn feed_str(&mut self, data: &str) {
        self.feed(data.as_bytes());
    }

    /// Visible screen lines, right-stripped.
    pub fn get_display(&self) -> Vec<String> {
        (0..self.rows as i32)
            .map(|y| self.row_text(Line(y)))
            .collect()
    }

    /// Scrollback history (oldest first) followed by the visible screen.
    ///
    /// Everything written since the last [`reset`](Self::reset) or
    /// [`clear_history`](Self::clear_history), up to the scrollback limit.
    pub fn get_full_display(&self) -> Vec<String> {
        let history = self.term.grid().history_size();
        let mut lines = Vec::with_capacity(history + self.rows as usize);
        for i in (1..=history).rev() {
            lines.push(self.row_text(Line(-(i as i32))));
        }
        lines.extend(self.get_display());
        lines
    }

    /// Visible screen lines as attributed span lists.
    pub fn get_attributed_lines(&self) -> Vec<Vec<CharSpan>> {
        (0..self.rows as i32)
            .map(|y| self.row_spans(Line(y)))
            .collect()
    }

    /// Scrollback + visible screen as attributed span lists.  History rows
    /// keep full cell attributes, so styling is not lost when lines scroll
    /// off the visible area.
    pub fn get_full_attributed_lines(&self) -> Vec<Vec<CharSpan>> {
        let history = self.term.grid().history_size();
        let mut lines = Vec::with_capacity(history + self.rows as usize);
        for i in (1..=history).rev() {
            lines.push(self.row_spans(Line(-(i as i32))));
        }
        lines.extend(self.get_attributed_lines());
        lines
    }

    /// Lines whose text changed since the previous call and are non-blank.
    /// Updates the snapshot, so calling twice in a row yields nothing new.
    pub fn get_changes(&mut self) -> Vec<String> {
        let current = self.get_display();
        let changed = self
            .changed_indices(&current)
            .into_iter()
            .map(|i| current[i].clone())
            .collect();
        self.prev_display = current;
        changed
    }

    /// Attributed spans for the lines [`get_changes`](Self::get_changes)
    /// would return.  Shares the snapshot with `get_changes`.
    pub fn get_attributed_changes(&mut self) -> Vec<Vec<CharSpan>> {
        let current = self.get_display();
        let indices = self.changed_indices(&current);
        self.prev_display = current;
        indices
            .into_iter()
            .map(|i| self.row_spans(Line(i as i32)))
            .collect()
    }

    /// Discard the scrollback history, keeping the visible screen.
    ///
    /// Issued as `ED 3` (erase saved lines) so it goes through the same
    /// escape machinery as everything else.
    pub fn clear_history(&mut self) {
        self.feed(b"\x1b[3J");
    }

    /// Clear screen, scrollback, and the change snapshot.
    pub fn reset(&mut self) {
        // RIS resets grid and modes; ED 3 makes sure saved lines go with it.
        self.feed(b"\x1bc\x1b[3J");
        self.prev_display = vec![String::new(); self.rows as usize];
    }

    fn changed_indices(&self, current: &[String]) -> Vec<usize> {
        current
            .iter()
            .zip(&self.prev_display)
            .enumerate()
            .filter(|(_, (cur, prev))| cur != prev && !cur.trim().is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    fn row_text(&self, line: Line) -> String {
        let grid = self.term.grid();
        let row = &grid[line];
        let mut text = String::with_capacity(self.cols as usize);
        for col in 0..self.cols as usize {
            let c = row[Column(col)].c;
            text.push(if c == '\0' { ' ' } else { c });
        }
        text.truncate(text.trim_end().len());
        text
    }

    /// Convert one grid row into coalesced spans, mirroring `row_text`'s
    /// right-strip: trailing whitespace-only spans are dropped and the last
    /// surviving span is right-stripped.
    fn row_spans(&self, line: Line) -> Vec<CharSpan> {
        let grid = self.term.grid();
        let row = &grid[line];

        let mut spans: Vec<CharSpan> = Vec::new();
        let mut cur_text = String::new();
        let mut cur_fg = Fg::Default;
        let mut cur_bold = false;
        let mut cur_italic = false;

        for col in 0..self.cols as usize {
            let cell = &row[Column(col)];
            let c = if cell.c == '\0' { ' ' } else { cell.c };
            let fg = normalize_fg(cell.fg);
            let bold = cell.flags.contains(Flags::BOLD);
            let italic = cell.flags.contains(Flags::ITALIC);

            if fg == cur_fg && bold == cur_bold && italic == cur_italic {
                cur_text.push(c);
            } else {
                if !cur_text.is_empty() {
                    spans.push(CharSpan::new(
                        std::mem::take(&mut cur_text),
                        cur_fg.clone(),
                        cur_bold,
                        cur_italic,
                    ));
                }
                cur_text.push(c);
                cur_fg = fg;
                cur_bold = bold;
                cur_italic = italic;
            }
        }
        if !cur_text.is_empty() {
            spans.push(CharSpan::new(cur_text, cur_fg, cur_bold, cur_italic));
        }

        while spans
            .last()
            .is_some_and(|s| s.text.trim().is_empty())
        {
            spans.pop();
        }
        if let Some(last) = spans.last_mut() {
            let stripped = last.text.trim_end().len();
            last.text.truncate(stripped);
        }
        spans
    }
}

impl Default for TerminalEmulator {
    fn default() -> Self {
        Self::new(40, 120, 1000)
    }
}

/// Map an alacritty cell color onto the normalized name set.
fn normalize_fg(color: Color) -> Fg {
    match color {
        Color::Named(named) => match named {
            NamedColor::Black | NamedColor::DimBlack => Fg::Black,
            NamedColor::Red | NamedColor::DimRed => Fg::Red,
            NamedColor::Green | NamedColor::DimGreen => Fg::Green,
            NamedColor::Yellow | NamedColor::DimYellow => Fg::Brown,
            NamedColor::Blue | NamedColor::DimBlue => Fg::Blue,
            NamedColor::Magenta | NamedColor::DimMagenta => Fg::Magenta,
            NamedColor::Cyan | NamedColor::DimCyan => Fg::Cyan,
            NamedColor::White | NamedColor::DimWhite => Fg::White,
            NamedColor::BrightBlack => Fg::LightBlack,
            NamedColor::BrightRed => Fg::LightRed,
            NamedColor::BrightGreen => Fg::LightGreen,
            NamedColor::BrightYellow => Fg::LightBrown,
            NamedColor::BrightBlue => Fg::LightBlue,
            NamedColor::BrightMagenta => Fg::LightMagenta,
            NamedColor::BrightCyan => Fg::LightCyan,
            NamedColor::BrightWhite => Fg::LightWhite,
            _ => Fg::Default,
        },
        Color::Indexed(i) => match i {
            0 => Fg::Black,
            1 => Fg::Red,
            2 => Fg::Green,
            3 => Fg::Brown,
            4 => Fg::Blue,
            5 => Fg::Magenta,
            6 => Fg::Cyan,
            7 => Fg::White,
            8 => Fg::LightBlack,
            9 => Fg::LightRed,
            10 => Fg::LightGreen,
            11 => Fg::LightBrown,
            12 => Fg::LightBlue,
            13 => Fg::LightMagenta,
            14 => Fg::LightCyan,
            15 => Fg::LightWhite,
            _ => Fg::Hex(xterm_hex(i)),
        },
        Color::Spec(Rgb { r, g, b }) => Fg::Hex(format!("{r:02x}{g:02x}{b:02x}")),
    }
}

/// Hex triplet for the xterm 256-color palette above the ANSI range.
fn xterm_hex(index: u8) -> String {
    if index >= 232 {
        // Grayscale ramp
        let v = 8 + 10 * (index as u32 - 232);
        return format!("{v:02x}{v:02x}{v:02x}");
    }
    // 6x6x6 color cube
    const LEVELS: [u32; 6] = [0, 95, 135, 175, 215, 255];
    let i = index as u32 - 16;
    let r = LEVELS[(i / 36) as usize];
    let g = LEVELS[((i / 6) % 6) as usize];
    let b = LEVELS[(i % 6) as usize];
    format!("{r:02x}{g:02x}{b:02x}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
