//! Duration and summary formatting helpers.
//!
//! Small presentation utilities shared by the stream monitor, the status
//! renderer, and the loop banners.

use std::collections::HashMap;
use std::time::Duration;

/// Format a millisecond count compactly: `m:ss`, or `h:mm:ss` past an hour.
#[must_use]
pub fn format_duration(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Format a millisecond count the long way: `1h 2m 3s`, `4m 5s`, or `6s`.
#[must_use]
pub fn format_duration_long(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Parse a timeout argument like `90s`, `30m`, `1h` or `1h30m`.
///
/// A bare `0` disables the timeout and yields `None`. A bare number is
/// taken as seconds.
pub fn parse_timeout(input: &str) -> Result<Option<Duration>, String> {
    let trimmed = input.trim();
    if trimmed == "0" {
        return Ok(None);
    }
    if trimmed.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total_secs: u64 = 0;
    let mut digits = String::new();
    for c in trimmed.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration: {input}"))?;
        digits.clear();
        let unit_secs = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => return Err(format!("invalid duration unit '{c}' in: {input}")),
        };
        total_secs += value * unit_secs;
    }
    if !digits.is_empty() {
        // Trailing bare number means seconds
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration: {input}"))?;
        total_secs += value;
    }

    if total_secs == 0 {
        Ok(None)
    } else {
        Ok(Some(Duration::from_secs(total_secs)))
    }
}

/// Render a tool histogram as `name count • name count • +N more`.
///
/// Entries are sorted by descending count, ties broken by name so output
/// is stable. Returns an empty string for an empty histogram.
#[must_use]
pub fn tool_summary(counts: &HashMap<String, u64>, max_items: usize) -> String {
    if counts.is_empty() {
        return String::new();
    }

    let mut sorted: Vec<(&str, u64)> = counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let shown = max_items.min(sorted.len());
    let mut parts: Vec<String> = sorted[..shown]
        .iter()
        .map(|(name, count)| format!("{name} {count}"))
        .collect();

    let remaining = sorted.len() - shown;
    if remaining > 0 {
        parts.push(format!("+{remaining} more"));
    }

    parts.join(" • ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_compact() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(59_000), "0:59");
        assert_eq!(format_duration(61_000), "1:01");
        assert_eq!(format_duration(3_661_000), "1:01:01");
    }

    #[test]
    fn test_format_duration_long() {
        assert_eq!(format_duration_long(0), "0s");
        assert_eq!(format_duration_long(59_000), "59s");
        assert_eq!(format_duration_long(61_000), "1m 1s");
        assert_eq!(format_duration_long(3_661_000), "1h 1m 1s");
    }

    #[test]
    fn test_parse_timeout_units() {
        assert_eq!(parse_timeout("90s").unwrap(), Some(Duration::from_secs(90)));
        assert_eq!(
            parse_timeout("30m").unwrap(),
            Some(Duration::from_secs(1800))
        );
        assert_eq!(parse_timeout("1h").unwrap(), Some(Duration::from_secs(3600)));
        assert_eq!(
            parse_timeout("1h30m").unwrap(),
            Some(Duration::from_secs(5400))
        );
    }

    #[test]
    fn test_parse_timeout_bare_seconds() {
        assert_eq!(parse_timeout("45").unwrap(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_parse_timeout_disabled() {
        assert_eq!(parse_timeout("0").unwrap(), None);
        assert_eq!(parse_timeout("0s").unwrap(), None);
    }

    #[test]
    fn test_parse_timeout_invalid() {
        assert!(parse_timeout("").is_err());
        assert!(parse_timeout("abc").is_err());
        assert!(parse_timeout("5d").is_err());
    }

    #[test]
    fn test_tool_summary_empty() {
        assert_eq!(tool_summary(&HashMap::new(), 6), "");
    }

    #[test]
    fn test_tool_summary_sorted_and_capped() {
        let mut counts = HashMap::new();
        counts.insert("bash".to_string(), 5);
        counts.insert("edit".to_string(), 2);
        counts.insert("read".to_string(), 9);
        counts.insert("grep".to_string(), 2);

        let summary = tool_summary(&counts, 2);
        assert_eq!(summary, "read 9 • bash 5 • +2 more");
    }

    #[test]
    fn test_tool_summary_tie_order_is_stable() {
        let mut counts = HashMap::new();
        counts.insert("edit".to_string(), 2);
        counts.insert("bash".to_string(), 2);

        assert_eq!(tool_summary(&counts, 6), "bash 2 • edit 2");
    }
}
