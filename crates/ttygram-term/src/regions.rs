// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Semantic content regions over attributed lines.
//!
//! The TUI paints code with syntax-highlight colors and prose in the
//! default foreground, so per-cell foreground color is a ground-truth
//! code-vs-prose signal that beats any text heuristic.  Lines classify
//! individually, then merge into ordered regions with a one-line gap
//! tolerance that keeps unhighlighted comments inside code blocks.

use std::sync::LazyLock;

use regex::Regex;

use crate::span::{line_text, CharSpan, Fg};

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(?:[-*•]\s|\d+[.)]\s)").unwrap());
static REGION_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\x{2500}-\x{257F}\x{FFFD}\s]+$").unwrap());

/// Per-line semantic type, before region grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    Code,
    Prose,
    Heading,
    ListItem,
    Separator,
    Blank,
}

/// Semantic category of a merged region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionType {
    CodeBlock,
    Prose,
    Heading,
    List,
    Separator,
    Blank,
}

/// A contiguous block of semantically uniform content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRegion {
    pub kind: RegionType,
    /// Plain text; prose/list regions may carry backtick markers for
    /// inline code.
    pub text: String,
    /// Language hint for code blocks; empty when unknown.
    pub language: String,
}

impl ContentRegion {
    fn new(kind: RegionType, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            language: String::new(),
        }
    }
}

fn has_code_colors(spans: &[CharSpan]) -> bool {
    spans
        .iter()
        .any(|s| !s.text.trim().is_empty() && s.fg.is_code_color())
}

fn all_default_fg(spans: &[CharSpan]) -> bool {
    spans
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .all(|s| s.fg == Fg::Default)
}

fn first_nonblank_bold(spans: &[CharSpan]) -> bool {
    spans
        .iter()
        .find(|s| !s.text.trim().is_empty())
        .map(|s| s.bold)
        .unwrap_or(false)
}

/// Classify a single attributed line into a semantic type.
pub fn classify_attr_line(spans: &[CharSpan]) -> LineType {
    if spans.is_empty() {
        return LineType::Blank;
    }
    let text = line_text(spans);
    if text.trim().is_empty() {
        return LineType::Blank;
    }
    if REGION_SEPARATOR_RE.is_match(&text) {
        return LineType::Separator;
    }
    if LIST_ITEM_RE.is_match(&text) {
        return LineType::ListItem;
    }
    if has_code_colors(spans) {
        return LineType::Code;
    }
    if all_default_fg(spans) && first_nonblank_bold(spans) {
        return LineType::Heading;
    }
    LineType::Prose
}

/// Build prose text with backtick markers around colored spans.
///
/// Within a prose line, a short colored span is an inline code reference
/// (a variable name, a function call).  Surrounding whitespace stays
/// outside the backticks.
fn insert_inline_code_markers(spans: &[CharSpan]) -> String {
    let mut parts = String::new();
    for span in spans {
        let text = &span.text;
        if text.is_empty() {
            continue;
        }
        let stripped = text.trim();
        if span.fg.is_code_color() && !stripped.is_empty() && stripped.chars().count() < 60 {
            let leading = &text[..text.len() - text.trim_start().len()];
            let trailing = &text[text.trim_end().len()..];
            parts.push_str(leading);
            parts.push('`');
            parts.push_str(stripped);
            parts.push('`');
            parts.push_str(trailing);
        } else {
            parts.push_str(text);
        }
    }
    parts.trim_end().to_string()
}

/// Classify attributed lines into an ordered list of content regions.
///
/// Adjacent same-type lines merge (blank and separator lines stay
/// one-line regions).  A single prose/blank line sandwiched between two
/// code lines is reclassified as code.
pub fn classify_regions(attributed_lines: &[Vec<CharSpan>]) -> Vec<ContentRegion> {
    if attributed_lines.is_empty() {
        return Vec::new();
    }

    // Step 1: classify each line; prose and list lines get inline markers.
    let mut line_types: Vec<LineType> = Vec::with_capacity(attributed_lines.len());
    let mut line_texts: Vec<String> = Vec::with_capacity(attributed_lines.len());
    for spans in attributed_lines {
        let lt = classify_attr_line(spans);
        line_types.push(lt);
        line_texts.push(match lt {
            LineType::Prose | LineType::ListItem => insert_inline_code_markers(spans),
            _ => line_text(spans),
        });
    }

    // Step 2: one-line gap tolerance for code blocks.  A lone unhighlighted
    // line between two code lines is likely a comment.
    for i in 1..line_types.len().saturating_sub(1) {
        if matches!(line_types[i], LineType::Prose | LineType::Blank)
            && line_types[i - 1] == LineType::Code
            && line_types[i + 1] == LineType::Code
        {
            line_types[i] = LineType::Code;
            // Re-extract without inline code markers.
            line_texts[i] = line_text(&attributed_lines[i]);
        }
    }

    // Step 3: group adjacent same-type lines into regions.
    let mut regions: Vec<ContentRegion> = Vec::new();
    let mut i = 0;
    while i < line_types.len() {
        match line_types[i] {
            LineType::Blank => {
                regions.push(ContentRegion::new(RegionType::Blank, ""));
                i += 1;
            }
            LineType::Separator => {
                regions.push(ContentRegion::new(RegionType::Separator, line_texts[i].clone()));
                i += 1;
            }
            LineType::Heading => {
                regions.push(ContentRegion::new(RegionType::Heading, line_texts[i].clone()));
                i += 1;
            }
            LineType::Code => {
                let start = i;
                while i < line_types.len() && line_types[i] == LineType::Code {
                    i += 1;
                }
                regions.push(ContentRegion::new(
                    RegionType::CodeBlock,
                    line_texts[start..i].join("\n"),
                ));
            }
            LineType::ListItem => {
                let start = i;
                while i < line_types.len() && line_types[i] == LineType::ListItem {
                    i += 1;
                }
                regions.push(ContentRegion::new(
                    RegionType::List,
                    line_texts[start..i].join("\n"),
                ));
            }
            LineType::Prose => {
                let start = i;
                while i < line_types.len() && line_types[i] == LineType::Prose {
                    i += 1;
                }
                regions.push(ContentRegion::new(
                    RegionType::Prose,
                    line_texts[start..i].join("\n"),
                ));
            }
        }
    }
    regions
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> Vec<CharSpan> {
        vec![CharSpan::plain(text)]
    }

    #[test]
    fn blank_and_separator_lines() {
        assert_eq!(classify_attr_line(&[]), LineType::Blank);
        assert_eq!(classify_attr_line(&plain("   ")), LineType::Blank);
        assert_eq!(classify_attr_line(&plain("────────")), LineType::Separator);
    }

    #[test]
    fn colored_line_is_code() {
        let spans = vec![
            CharSpan::colored("def", Fg::Blue),
            CharSpan::plain(" greet():"),
        ];
        assert_eq!(classify_attr_line(&spans), LineType::Code);
    }

    #[test]
    fn bold_default_line_is_heading() {
        let spans = vec![CharSpan::new("Summary", Fg::Default, true, false)];
        assert_eq!(classify_attr_line(&spans), LineType::Heading);
    }

    #[test]
    fn list_markers() {
        assert_eq!(classify_attr_line(&plain("- item")), LineType::ListItem);
        assert_eq!(classify_attr_line(&plain("  * item")), LineType::ListItem);
        assert_eq!(classify_attr_line(&plain("• item")), LineType::ListItem);
        assert_eq!(classify_attr_line(&plain("1. item")), LineType::ListItem);
        assert_eq!(classify_attr_line(&plain("2) item")), LineType::ListItem);
    }

    #[test]
    fn default_text_is_prose() {
        assert_eq!(classify_attr_line(&plain("just words")), LineType::Prose);
    }

    /// A typical response shape: prose, a highlighted Python snippet,
    /// prose, then a list with inline code references.
    #[test]
    fn python_response_regions() {
        let lines: Vec<Vec<CharSpan>> = vec![
            plain("Here is a Python function:"),
            vec![CharSpan::colored("def", Fg::Blue), CharSpan::plain(" greet(name):")],
            vec![
                CharSpan::plain("    "),
                CharSpan::colored("print", Fg::Cyan),
                CharSpan::plain("("),
                CharSpan::colored("f\"Hello, {name}!\"", Fg::Red),
                CharSpan::plain(")"),
            ],
            plain("This function:"),
            vec![
                CharSpan::plain("- Takes a "),
                CharSpan::colored("name", Fg::Brown),
                CharSpan::plain(" parameter"),
            ],
            vec![
                CharSpan::plain("- Uses "),
                CharSpan::colored("print", Fg::Cyan),
                CharSpan::plain(" to output"),
            ],
        ];
        let regions = classify_regions(&lines);
        let kinds: Vec<RegionType> = regions.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RegionType::Prose,
                RegionType::CodeBlock,
                RegionType::Prose,
                RegionType::List
            ]
        );
        assert_eq!(regions[0].text, "Here is a Python function:");
        assert_eq!(
            regions[1].text,
            "def greet(name):\n    print(f\"Hello, {name}!\")"
        );
        assert_eq!(regions[2].text, "This function:");
        assert_eq!(
            regions[3].text,
            "- Takes a `name` parameter\n- Uses `print` to output"
        );
    }

    #[test]
    fn gap_tolerance_keeps_comment_in_code_block() {
        let lines: Vec<Vec<CharSpan>> = vec![
            vec![CharSpan::colored("let x = 1;", Fg::Blue)],
            plain("// unhighlighted comment"),
            vec![CharSpan::colored("let y = 2;", Fg::Blue)],
        ];
        let regions = classify_regions(&lines);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].kind, RegionType::CodeBlock);
        assert_eq!(
            regions[0].text,
            "let x = 1;\n// unhighlighted comment\nlet y = 2;"
        );
    }

    #[test]
    fn two_line_gap_breaks_code_block() {
        let lines: Vec<Vec<CharSpan>> = vec![
            vec![CharSpan::colored("code", Fg::Blue)],
            plain("prose one"),
            plain("prose two"),
            vec![CharSpan::colored("code", Fg::Blue)],
        ];
        let regions = classify_regions(&lines);
        let kinds: Vec<RegionType> = regions.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![RegionType::CodeBlock, RegionType::Prose, RegionType::CodeBlock]
        );
    }

    #[test]
    fn long_colored_span_is_not_inline_code() {
        let long = "x".repeat(70);
        let lines = vec![vec![
            CharSpan::plain("- prefix "),
            CharSpan::colored(long.clone(), Fg::Cyan),
        ]];
        let regions = classify_regions(&lines);
        // List item keeps the span verbatim — 70 chars is too long for an
        // inline code reference.
        assert_eq!(regions[0].text, format!("- prefix {long}"));
    }

    #[test]
    fn determinism() {
        let lines = vec![
            plain("alpha"),
            vec![CharSpan::colored("beta", Fg::Green)],
            plain(""),
        ];
        assert_eq!(classify_regions(&lines), classify_regions(&lines));
    }

    #[test]
    fn blank_lines_are_single_regions() {
        let lines = vec![plain("a"), plain(""), plain(""), plain("b")];
        let regions = classify_regions(&lines);
        let kinds: Vec<RegionType> = regions.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RegionType::Prose,
                RegionType::Blank,
                RegionType::Blank,
                RegionType::Prose
            ]
        );
    }
}
