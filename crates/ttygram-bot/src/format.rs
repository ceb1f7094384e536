// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Rendering into the chat-HTML subset.
//!
//! Two pipelines produce the same output format: the heuristic path works
//! on plain extracted text and guesses code blocks from language
//! signatures; the ANSI path gets its regions from terminal colors and
//! only needs the markdown-to-HTML step.  Allowed tags: `<b>`, `<i>`,
//! `<code>`, `<pre><code>`, `<a>`; everything else is escaped.

use std::sync::LazyLock;

use regex::Regex;

use ttygram_term::{
    classify_regions, filter_response_attr, CharSpan, ContentRegion, RegionType,
};

/// Platform message length ceiling.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(\w*)\n(.*?)```").unwrap());
static INLINE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ITALIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static LIST_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\s*)- (.+)$").unwrap());
static FROM_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^from\s+\S+\s+import\s").unwrap());
static DECORATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^@\w+").unwrap());
static ORDERED_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s").unwrap());

/// Escape the HTML special characters the chat platform requires.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Whether a line starts with an obvious language signature.
fn is_code_signature(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("def ")
        || t.starts_with("async def ")
        || t.starts_with("class ")
        || t.starts_with("import ")
        || t.starts_with("function ")
        || t.starts_with("const ")
        || t.starts_with("#!/")
        || FROM_IMPORT_RE.is_match(t)
        || DECORATOR_RE.is_match(t)
}

/// Heuristic code detection over plain text: when any line carries a
/// language signature, the whole block is fenced.  Already-fenced text is
/// left alone.
pub fn wrap_code_blocks(text: &str) -> String {
    if text.contains("```") {
        return text.to_string();
    }
    if text.lines().any(is_code_signature) {
        return format!("```\n{text}\n```");
    }
    text.to_string()
}

/// Soft-wrap reflow.
///
/// Terminal lines are hard-wrapped at column width; chat clients re-wrap.
/// Within a paragraph, a line joins its successor with a single space
/// unless it ends with sentence-final punctuation.  Code fences and their
/// contents are never reflowed, and list/heading starters always begin a
/// new line.
pub fn reflow(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            out.push(line.to_string());
            continue;
        }
        if in_fence || trimmed.is_empty() {
            out.push(line.to_string());
            continue;
        }
        let starts_block = trimmed.starts_with('-')
            || trimmed.starts_with('*')
            || trimmed.starts_with('•')
            || trimmed.starts_with('#')
            || trimmed.starts_with('>')
            || ORDERED_ITEM_RE.is_match(trimmed);
        match out.last_mut() {
            Some(prev)
                if !starts_block
                    && !prev.trim().is_empty()
                    && !prev.trim_start().starts_with("```")
                    && !prev
                        .trim_end()
                        .ends_with(['.', '!', '?', ':', ';']) =>
            {
                let joined = format!("{} {}", prev.trim_end(), trimmed);
                *prev = joined;
            }
            _ => out.push(line.to_string()),
        }
    }
    out.join("\n")
}

/// Whether a line reads as a short section header: ends with a colon and
/// is a phrase, not a URL or a tag soup.
fn is_section_header(line: &str) -> bool {
    let t = line.trim();
    t.ends_with(':')
        && !t.contains("://")
        && !t.contains('<')
        && t.chars().count() <= 60
        && t.chars().any(|c| c.is_alphabetic())
}

/// Inline transforms on an HTML-escaped, fence-free segment.
fn format_inline(segment: &str) -> String {
    let escaped = escape_html(segment);
    let with_code = INLINE_CODE_RE.replace_all(&escaped, "<code>$1</code>");
    let with_bold = BOLD_RE.replace_all(&with_code, "<b>$1</b>");
    let with_italic = ITALIC_RE.replace_all(&with_bold, "<i>$1</i>");

    let mut lines: Vec<String> = Vec::new();
    for line in with_italic.lines() {
        if let Some(caps) = LIST_LINE_RE.captures(line) {
            let body = caps[2].to_string();
            let rendered = match body.split_once(" — ") {
                // Do not double-wrap an already-bold label
                Some((label, desc)) if !label.contains("<b>") => {
                    format!("{}• <b>{}</b> — {}", &caps[1], label, desc)
                }
                _ => format!("{}• {}", &caps[1], body),
            };
            lines.push(rendered);
            continue;
        }
        if is_section_header(line) {
            lines.push(format!("<b>{}</b>", line.trim()));
            continue;
        }
        lines.push(line.to_string());
    }
    let mut joined = lines.join("\n");
    if with_italic.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

/// Convert markdown-ish text into the chat-HTML subset.
///
/// Code blocks are emitted first so their contents see only HTML escaping;
/// the inline transforms never touch them.
pub fn format_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut out = String::new();
    let mut last_end = 0;
    for caps in CODE_BLOCK_RE.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        out.push_str(&format_inline(&text[last_end..whole.start()]));
        let lang = &caps[1];
        let body = caps[2].trim_end_matches('\n');
        if lang.is_empty() {
            out.push_str(&format!("<pre><code>{}</code></pre>", escape_html(body)));
        } else {
            out.push_str(&format!(
                "<pre><code class=\"language-{lang}\">{}</code></pre>",
                escape_html(body)
            ));
        }
        last_end = whole.end();
    }
    out.push_str(&format_inline(&text[last_end..]));
    out
}

/// Render classified regions into the markdown intermediate the
/// [`format_html`] step consumes.
pub fn render_regions(regions: &[ContentRegion]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for region in regions {
        match region.kind {
            RegionType::CodeBlock => {
                parts.push(format!("```{}\n{}\n```", region.language, region.text));
            }
            RegionType::Prose | RegionType::List => parts.push(region.text.clone()),
            RegionType::Heading => parts.push(format!("**{}**", region.text.trim())),
            RegionType::Separator | RegionType::Blank => parts.push(String::new()),
        }
    }
    parts.join("\n")
}

/// Heuristic pipeline: plain text in, chat HTML out.
pub fn render_heuristic(content: &str) -> String {
    format_html(&reflow(&wrap_code_blocks(content)))
}

/// ANSI pipeline: attributed display lines in, chat HTML out.  Regions
/// come from terminal colors instead of keyword guessing.
pub fn render_ansi(source: &[String], attr: &[Vec<CharSpan>]) -> String {
    let filtered = filter_response_attr(source, attr);
    let regions = classify_regions(&filtered);
    format_html(&reflow(&render_regions(&regions)))
}

/// Byte offset of the `n`th character, clamped to the string length.
fn char_offset(text: &str, n: usize) -> usize {
    text.char_indices()
        .nth(n)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Split a long message into chunks within the platform ceiling,
/// preferring paragraph breaks, then line breaks, then spaces, falling
/// back to a hard cut.
pub fn split_message(text: &str, max_length: usize) -> Vec<String> {
    if text.chars().count() <= max_length {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text.to_string();

    while !remaining.is_empty() {
        if remaining.chars().count() <= max_length {
            chunks.push(remaining);
            break;
        }
        let window_end = char_offset(&remaining, max_length);
        let window = &remaining[..window_end];

        let split_at = window
            .rfind("\n\n")
            .or_else(|| window.rfind('\n'))
            .or_else(|| window.rfind(' '))
            .unwrap_or(window_end);

        chunks.push(remaining[..split_at].trim_end().to_string());
        remaining = remaining[split_at..].trim_start().to_string();
    }

    if chunks.is_empty() {
        vec![String::new()]
    } else {
        chunks
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
