// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Response content extraction.
//!
//! Keeps content/response/tool-connector lines, replaces the `⏺`/`⎿`
//! markers with an equal count of spaces (dedent later relies on the
//! preserved column alignment), skips wrapped user-prompt continuations,
//! and removes the common terminal margin.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::patterns::{classify_text_line, LineCategory};
use crate::span::{spans_to_text, CharSpan};

static RESPONSE_STRIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"⏺\s?").unwrap());
static CONNECTOR_STRIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"⎿\s*").unwrap());

/// Replace the first regex match with an equal number of spaces.
fn blank_marker(re: &Regex, line: &str) -> String {
    re.replace(line, |caps: &regex::Captures| {
        " ".repeat(caps[0].chars().count())
    })
    .into_owned()
}

/// Remove the largest common leading-whitespace prefix across non-empty
/// lines, preserving relative indentation.
fn dedent(text: &str) -> String {
    let mut margin: Option<String> = None;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
        margin = Some(match margin {
            None => indent,
            Some(prev) => prev
                .chars()
                .zip(indent.chars())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    let margin = margin.unwrap_or_default();
    if margin.is_empty() {
        return text.to_string();
    }
    text.lines()
        .map(|line| line.strip_prefix(margin.as_str()).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract meaningful content from screen lines, filtering UI chrome.
///
/// Tracks prompt continuation state: lines between a ❯ prompt and the next
/// response/tool/thinking/separator line are the user's wrapped input, not
/// the assistant's output, and are skipped.
pub fn extract_content(lines: &[String]) -> String {
    let mut content_lines: Vec<String> = Vec::new();
    let mut in_prompt = false;

    for line in lines {
        let category = classify_text_line(line);
        if category == LineCategory::Prompt {
            in_prompt = true;
            continue;
        }
        if in_prompt {
            if matches!(
                category,
                LineCategory::Response
                    | LineCategory::ToolConnector
                    | LineCategory::ToolHeader
                    | LineCategory::Thinking
                    | LineCategory::Separator
            ) {
                in_prompt = false;
            } else {
                continue;
            }
        }
        match category {
            LineCategory::Content => {
                // Keep leading whitespace (indentation); strip only trailing.
                content_lines.push(line.trim_end().to_string());
            }
            LineCategory::Response => {
                let replaced = blank_marker(&RESPONSE_STRIP_RE, line);
                if !replaced.trim().is_empty() {
                    content_lines.push(replaced.trim_end().to_string());
                }
            }
            LineCategory::ToolConnector => {
                let replaced = blank_marker(&CONNECTOR_STRIP_RE, line);
                if !replaced.trim().is_empty() {
                    content_lines.push(replaced.trim_end().to_string());
                }
            }
            _ => {}
        }
    }

    dedent(&content_lines.join("\n")).trim().to_string()
}

// ─── Attributed-span analogues ───────────────────────────────────────────────

/// Remove a leading Unicode marker (`⏺` or `⎿`) plus one following space
/// from the first span that carries it.  Returns a new span list.
fn strip_marker_from_spans(spans: &[CharSpan], marker: char) -> Vec<CharSpan> {
    let mut result = Vec::with_capacity(spans.len());
    let mut stripped = false;
    for span in spans {
        if !stripped && span.text.contains(marker) {
            let mut new_text = span.text.replacen(marker, "", 1);
            if let Some(rest) = new_text.strip_prefix(' ') {
                new_text = rest.to_string();
            }
            stripped = true;
            if !new_text.is_empty() {
                result.push(CharSpan::new(new_text, span.fg.clone(), span.bold, span.italic));
            }
        } else {
            result.push(span.clone());
        }
    }
    result
}

/// Strip exactly `n` leading characters from a span list, splitting the
/// boundary span when needed.
fn lstrip_n_chars(spans: &[CharSpan], n: usize) -> Vec<CharSpan> {
    let mut remaining = n;
    let mut result = Vec::with_capacity(spans.len());
    for span in spans {
        if remaining == 0 {
            result.push(span.clone());
            continue;
        }
        let len = span.text.chars().count();
        if len <= remaining {
            remaining -= len;
            continue;
        }
        let text: String = span.text.chars().skip(remaining).collect();
        result.push(CharSpan::new(text, span.fg.clone(), span.bold, span.italic));
        remaining = 0;
    }
    result
}

/// Remove common leading whitespace from attributed lines.
///
/// Lines whose index is in `skip_indices` do not participate in the
/// minimum-indent computation — a marker-stripped `⏺ ` line would
/// otherwise wrongly set the margin to zero.
pub fn dedent_attr_lines(
    lines: &[Vec<CharSpan>],
    skip_indices: &HashSet<usize>,
) -> Vec<Vec<CharSpan>> {
    let mut min_indent: Option<usize> = None;
    for (i, spans) in lines.iter().enumerate() {
        if skip_indices.contains(&i) {
            continue;
        }
        let text = spans_to_text(spans);
        let trimmed = text.trim_start();
        if !trimmed.is_empty() {
            let indent = text.chars().count() - trimmed.chars().count();
            min_indent = Some(min_indent.map_or(indent, |m| m.min(indent)));
        }
    }
    let Some(min_indent) = min_indent.filter(|&m| m > 0) else {
        return lines.to_vec();
    };
    lines
        .iter()
        .map(|spans| {
            let text = spans_to_text(spans);
            let trimmed = text.trim_start();
            let indent = if trimmed.is_empty() {
                0
            } else {
                text.chars().count() - trimmed.chars().count()
            };
            if indent >= min_indent {
                lstrip_n_chars(spans, min_indent)
            } else {
                spans.clone()
            }
        })
        .collect()
}

/// Filter attributed lines down to response content.
///
/// The plain-text projection of each line decides its category; marker
/// lines get their `⏺`/`⎿` prefix stripped in place, and the survivors are
/// dedented with marker lines excluded from the margin computation.
pub fn filter_response_attr(
    source: &[String],
    attr: &[Vec<CharSpan>],
) -> Vec<Vec<CharSpan>> {
    let mut result: Vec<Vec<CharSpan>> = Vec::new();
    let mut marker_indices: HashSet<usize> = HashSet::new();
    let mut in_prompt = false;

    for (plain, spans) in source.iter().zip(attr) {
        let category = classify_text_line(plain);
        if category == LineCategory::Prompt {
            in_prompt = true;
            continue;
        }
        if in_prompt {
            if matches!(
                category,
                LineCategory::Response
                    | LineCategory::ToolConnector
                    | LineCategory::ToolHeader
                    | LineCategory::Thinking
                    | LineCategory::Separator
            ) {
                in_prompt = false;
            } else {
                continue;
            }
        }
        match category {
            LineCategory::Content => result.push(spans.clone()),
            LineCategory::Response => {
                marker_indices.insert(result.len());
                result.push(strip_marker_from_spans(spans, '⏺'));
            }
            LineCategory::ToolConnector => {
                marker_indices.insert(result.len());
                result.push(strip_marker_from_spans(spans, '⎿'));
            }
            _ => {}
        }
    }
    dedent_attr_lines(&result, &marker_indices)
}

/// Strip markers and chrome from attributed change lines; the plain
/// projection is derived from the spans themselves.
pub fn strip_response_markers(attr: &[Vec<CharSpan>]) -> Vec<Vec<CharSpan>> {
    let source: Vec<String> = attr.iter().map(|spans| spans_to_text(spans)).collect();
    filter_response_attr(&source, attr)
}

/// Index of the last user prompt line that has response content below it.
pub fn find_last_prompt(display: &[String]) -> Option<usize> {
    let mut result = None;
    for (i, line) in display.iter().enumerate() {
        let stripped = line.trim();
        if stripped.starts_with('❯') && stripped.chars().count() > 2 {
            let has_response_below = display[i + 1..]
                .iter()
                .any(|dl| dl.trim().starts_with('⏺'));
            if has_response_below {
                result = Some(i);
            }
        }
    }
    result
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Fg;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    // ── Plain extraction ─────────────────────────────────────────────────────

    #[test]
    fn strips_chrome_keeps_content() {
        let content = extract_content(&lines(&[
            "────────────────────────────────────────────",
            "⏺ The answer is 4.",
            "",
            "  my-project │ ⎇ main │ Usage: 7% ▋░░░░░░░░░ ↻ 9:59",
        ]));
        assert_eq!(content, "The answer is 4.");
    }

    #[test]
    fn marker_replacement_preserves_column_alignment() {
        // The ⏺ marker plus its space becomes two spaces, so the code body
        // keeps its indentation relative to the first line after dedent.
        let content = extract_content(&lines(&[
            "⏺ def greet(name):",
            "      print(name)",
        ]));
        assert_eq!(content, "def greet(name):\n    print(name)");
    }

    #[test]
    fn connector_lines_are_kept_and_blanked() {
        let content = extract_content(&lines(&[
            "  ⎿  Added 4 lines, removed 1 line",
        ]));
        assert_eq!(content, "Added 4 lines, removed 1 line");
    }

    #[test]
    fn prompt_continuation_is_elided() {
        // The wrapped tail of the user's input classifies as content but
        // belongs to the prompt, not to the response.
        let content = extract_content(&lines(&[
            "❯ please write a long function that does the",
            "thing we talked about yesterday",
            "⏺ Here it is:",
            "  done",
        ]));
        assert_eq!(content, "Here it is:\ndone".to_string());
    }

    #[test]
    fn separator_ends_prompt_continuation() {
        let content = extract_content(&lines(&[
            "❯ some question",
            "wrapped input tail",
            "────────────────────────────────────────────",
            "real content",
        ]));
        assert_eq!(content, "real content");
    }

    #[test]
    fn dedent_removes_terminal_margin() {
        let content = extract_content(&lines(&[
            "    first line",
            "      indented more",
            "    back to margin",
        ]));
        assert_eq!(content, "first line\n  indented more\nback to margin");
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert_eq!(extract_content(&[]), "");
        assert_eq!(extract_content(&lines(&["", "────────"])), "");
    }

    // ── Span helpers ─────────────────────────────────────────────────────────

    #[test]
    fn strip_marker_leaves_attributes() {
        let spans = vec![
            CharSpan::plain("⏺ hello"),
            CharSpan::colored("world", Fg::Blue),
        ];
        let out = strip_marker_from_spans(&spans, '⏺');
        assert_eq!(out[0], CharSpan::plain("hello"));
        assert_eq!(out[1], CharSpan::colored("world", Fg::Blue));
    }

    #[test]
    fn strip_marker_drops_emptied_span() {
        let spans = vec![CharSpan::plain("⏺ "), CharSpan::plain("rest")];
        let out = strip_marker_from_spans(&spans, '⏺');
        assert_eq!(out, vec![CharSpan::plain("rest")]);
    }

    #[test]
    fn lstrip_splits_span_at_boundary() {
        let spans = vec![CharSpan::plain("    "), CharSpan::colored("code", Fg::Cyan)];
        let out = lstrip_n_chars(&spans, 2);
        assert_eq!(out[0], CharSpan::plain("  "));
        assert_eq!(out[1], CharSpan::colored("code", Fg::Cyan));
        let out = lstrip_n_chars(&spans, 6);
        assert_eq!(out, vec![CharSpan::colored("de", Fg::Cyan)]);
    }

    #[test]
    fn dedent_attr_skips_marker_lines_in_margin_computation() {
        let marker_line = vec![CharSpan::plain("short")];
        let indented = vec![CharSpan::plain("    indented")];
        let mut skip = HashSet::new();
        skip.insert(0usize);
        let out = dedent_attr_lines(&[marker_line.clone(), indented], &skip);
        // Margin is 4 (from the indented line only); the marker line has
        // indent 0 < 4 and is left alone.
        assert_eq!(out[0], marker_line);
        assert_eq!(spans_to_text(&out[1]), "indented");
    }

    #[test]
    fn filter_response_attr_matches_plain_extraction() {
        let source = lines(&[
            "❯ question",
            "⏺ answer line",
            "────────────────────────────────────────────",
        ]);
        let attr: Vec<Vec<CharSpan>> =
            source.iter().map(|l| vec![CharSpan::plain(l.clone())]).collect();
        let out = filter_response_attr(&source, &attr);
        assert_eq!(out.len(), 1);
        assert_eq!(spans_to_text(&out[0]), "answer line");
    }

    #[test]
    fn find_last_prompt_requires_response_below() {
        let display = lines(&[
            "❯ first question",
            "⏺ first answer",
            "❯ second question",
            "no response yet",
        ]);
        assert_eq!(find_last_prompt(&display), Some(0));
        let display = lines(&["❯ q", "plain"]);
        assert_eq!(find_last_prompt(&display), None);
    }
}
