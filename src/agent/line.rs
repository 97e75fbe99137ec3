//! Line classification heuristics for agent output.
//!
//! Everything here is pattern matching on raw text: ANSI stripping, tool
//! marker detection, and error line extraction. The patterns are coupled
//! to the agent's output formatting and kept table-driven so they can be
//! revised without touching control flow, and so tests can feed synthetic
//! lines directly.

use regex::Regex;
use std::collections::HashMap;

/// Error line cap per iteration.
const MAX_ERRORS: usize = 10;

/// Error lines are truncated to this many bytes.
const MAX_ERROR_LEN: usize = 200;

/// Substrings that flag a line as an error (matched case-insensitively).
const ERROR_MARKERS: &[&str] = &[
    "error:",
    "failed:",
    "exception:",
    "typeerror",
    "syntaxerror",
    "referenceerror",
];

/// Remove ANSI color escape sequences.
#[must_use]
pub fn strip_ansi(input: &str) -> String {
    let re = Regex::new(r"\x1B\[[0-9;]*m").expect("valid ansi regex");
    re.replace_all(input, "").into_owned()
}

/// Extract the tool name from a tool-marker line.
///
/// Marker lines start with `| ` followed by the tool name, terminated by
/// whitespace, another pipe, or a colon. The input should already be
/// ANSI-stripped.
#[must_use]
pub fn tool_marker(line: &str) -> Option<String> {
    let rest = line.strip_prefix("| ")?;
    let name: String = rest
        .trim_start_matches(' ')
        .chars()
        .take_while(|c| !matches!(c, ' ' | '\t' | '|' | ':'))
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Derive a tool histogram from captured text (buffered mode).
#[must_use]
pub fn tool_counts_from_text(text: &str) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for line in text.lines() {
        if let Some(tool) = tool_marker(&strip_ansi(line)) {
            *counts.entry(tool).or_insert(0) += 1;
        }
    }
    counts
}

/// Extract error-looking lines from combined output.
///
/// An approximate signal for the struggle heuristic, not a structured
/// error protocol: lines are matched case-insensitively against the
/// marker table plus the test/fail combination, trimmed, truncated to
/// 200 characters, deduplicated, and capped at 10.
#[must_use]
pub fn extract_errors(output: &str) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();

    for line in output.lines() {
        let lower = line.to_lowercase();
        if !is_error_line(&lower) {
            continue;
        }

        let cleaned = truncate(line.trim(), MAX_ERROR_LEN);
        if cleaned.is_empty() || errors.iter().any(|e| e == &cleaned) {
            continue;
        }
        errors.push(cleaned);
        if errors.len() == MAX_ERRORS {
            break;
        }
    }

    errors
}

fn is_error_line(lower: &str) -> bool {
    ERROR_MARKERS.iter().any(|marker| lower.contains(marker))
        || (lower.contains("test") && lower.contains("fail"))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
