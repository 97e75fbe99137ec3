//! Completion sentinel detection.
//!
//! The agent signals that the task is done by emitting
//! `<promise>PHRASE</promise>`. Agents also echo the phrase in examples,
//! code samples, and commentary, so detection is deliberately strict:
//! fenced code blocks are stripped first (the most common source of
//! accidental echoes), and the tag must then be the last non-whitespace
//! content of the output. A bare mention of the phrase never matches.

use regex::Regex;

/// Check whether `output` ends with the completion sentinel for `promise`.
///
/// Matching is case-insensitive and tolerates whitespace inside the tag;
/// the promise itself is matched literally, so regex metacharacters in a
/// caller-supplied phrase are inert.
#[must_use]
pub fn is_complete(output: &str, promise: &str) -> bool {
    let stripped = remove_code_blocks(output);

    let escaped = regex::escape(promise);
    let pattern = Regex::new(&format!(r"(?i)<promise>\s*{escaped}\s*</promise>"))
        .expect("escaped promise regex is valid");

    let Some(last) = pattern.find_iter(&stripped).last() else {
        return false;
    };

    stripped[last.end()..].trim().is_empty()
}

/// Detect the unusable placeholder-integration signature in agent output.
///
/// Seeing this means the agent loaded a stub integration instead of a
/// working one; the loop cannot make progress and must stop.
#[must_use]
pub fn is_placeholder_integration(output: &str) -> bool {
    output.contains("is not yet ready for use. This is a placeholder package.")
}

/// Remove paired triple-backtick regions.
fn remove_code_blocks(s: &str) -> String {
    let re = Regex::new(r"(?s)```.*?```").expect("valid code block regex");
    re.replace_all(s, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_tag_at_end() {
        assert!(is_complete("work done\n<promise>COMPLETE</promise>", "COMPLETE"));
        assert!(is_complete("<promise>COMPLETE</promise>\n", "COMPLETE"));
    }

    #[test]
    fn test_case_insensitive_and_whitespace_tolerant() {
        assert!(is_complete("<PROMISE>  complete  </PROMISE>", "COMPLETE"));
        assert!(is_complete("<promise>\nCOMPLETE\n</promise>", "complete"));
    }

    #[test]
    fn test_plain_mention_never_matches() {
        assert!(!is_complete("mentioning COMPLETE casually", "COMPLETE"));
        assert!(!is_complete("I will output COMPLETE when done", "COMPLETE"));
    }

    #[test]
    fn test_metacharacter_phrases_match_literally() {
        for phrase in ["ALL TESTS (100%) PASS", "done.*", "a+b", "x[1]"] {
            let text = format!("<promise>{phrase}</promise>");
            assert!(is_complete(&text, phrase), "phrase {phrase:?} should match");
            let casual = format!("mentioning {phrase} casually");
            assert!(!is_complete(&casual, phrase), "phrase {phrase:?} must not match");
        }
    }

    #[test]
    fn test_tag_inside_code_block_is_ignored() {
        let text = "example:\n```\n<promise>COMPLETE</promise>\n```\nstill working";
        assert!(!is_complete(text, "COMPLETE"));
    }

    #[test]
    fn test_tag_after_code_block_matches() {
        let text = "```\nsome code\n```\nall done\n<promise>COMPLETE</promise>";
        assert!(is_complete(text, "COMPLETE"));
    }

    #[test]
    fn test_trailing_commentary_disqualifies() {
        let text = "<promise>COMPLETE</promise>\nand one more thing...";
        assert!(!is_complete(text, "COMPLETE"));
    }

    #[test]
    fn test_trailing_code_block_is_stripped_before_anchoring() {
        let text = "<promise>COMPLETE</promise>\n```\nleftover sample\n```\n";
        assert!(is_complete(text, "COMPLETE"));
    }

    #[test]
    fn test_last_of_multiple_tags_decides() {
        let text = "<promise>COMPLETE</promise>\nmore work\n<promise>COMPLETE</promise>";
        assert!(is_complete(text, "COMPLETE"));
    }

    #[test]
    fn test_wrong_phrase_does_not_match() {
        assert!(!is_complete("<promise>DONE</promise>", "COMPLETE"));
    }

    #[test]
    fn test_empty_output() {
        assert!(!is_complete("", "COMPLETE"));
    }

    #[test]
    fn test_placeholder_integration_signature() {
        let output = "loader: some-plugin is not yet ready for use. This is a placeholder package.";
        assert!(is_placeholder_integration(output));
        assert!(!is_placeholder_integration("normal agent output"));
    }
}
