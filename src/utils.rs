//! Utility functions for identifiers, clocks, and text clean-up.
//!
//! This module provides helper functions used throughout the application:
//! - Article identifiers derived from the generation timestamp
//! - The Korean wall clock used for generation timestamps
//! - Markdown and code-fence stripping for model output
//! - String truncation for logging

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Offset of Korea Standard Time from UTC, in seconds.
pub const KST_OFFSET_SECS: i32 = 9 * 60 * 60;

/// Length every consumer of article identifiers expects.
pub const ARTICLE_ID_LEN: usize = 10;

const ID_TIMESTAMP_FORMAT: &str = "%y%m%d%H%M%S";
const DECODE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

static HEADING_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*").unwrap());
static EMPHASIS_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*{1,3}|_{2,3}|~~").unwrap());
static OPENING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\n?").unwrap());
static CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n?```[ \t]*$").unwrap());

/// Current time on the Korean wall clock.
pub fn kst_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&kst())
}

pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).unwrap()
}

/// Derive an article identifier from a wall-clock timestamp.
///
/// The timestamp is formatted as the twelve decimal digits `YYMMDDHHMMSS`,
/// that decimal number is rendered in lowercase hexadecimal. Stored IDs were
/// produced this way, so the transform must not change.
///
/// # Examples
///
/// ```ignore
/// // 2024-08-01 12:34:56 -> 240801123456 -> 0x3810dd8c80
/// assert_eq!(article_id(ts), "3810dd8c80");
/// ```
pub fn article_id(timestamp: NaiveDateTime) -> String {
    let digits = timestamp.format(ID_TIMESTAMP_FORMAT).to_string();
    // twelve ASCII digits always fit a u64
    let value: u64 = digits.parse().unwrap_or_default();
    format!("{value:x}")
}

/// Reverse [`article_id`]: recover the timestamp an identifier was derived from.
///
/// Returns `None` for anything that is not a ten character hex string
/// decoding to a valid `YYMMDDHHMMSS` timestamp. Identifiers are only ever
/// produced from 20xx timestamps, so the two-digit year is always read as
/// 2000-2099.
pub fn decode_article_id(id: &str) -> Option<NaiveDateTime> {
    if id.len() != ARTICLE_ID_LEN {
        return None;
    }
    let value = u64::from_str_radix(id, 16).ok()?;
    let digits = format!("{value:012}");
    if digits.len() != 12 {
        return None;
    }
    // `%y` would map 69-99 to the 1900s
    NaiveDateTime::parse_from_str(&format!("20{digits}"), DECODE_TIMESTAMP_FORMAT).ok()
}

/// Remove markdown heading and emphasis markers from model output.
///
/// The persona prompt asks for plain text, but models still sprinkle
/// `## Title` or `**bold**` into the response.
pub fn strip_markdown(s: &str) -> String {
    let without_headings = HEADING_MARKER.replace_all(s, "");
    EMPHASIS_MARKER
        .replace_all(&without_headings, "")
        .trim()
        .to_string()
}

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````).
///
/// Structured responses are requested as raw JSON, but some backends wrap
/// them anyway.
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let start = OPENING_FENCE.find(trimmed).map(|m| m.end()).unwrap_or(0);
    let rest = &trimmed[start..];
    let end = CLOSING_FENCE
        .find(rest)
        .map(|m| m.start())
        .unwrap_or(rest.len());
    rest[..end].trim()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to roughly `max` bytes with an ellipsis and
/// byte count indicator appended. The cut is moved back to a character
/// boundary since model output is mostly Hangul.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the response is cut off by the output token limit the JSON fails
/// with an EOF error rather than a syntax error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_article_id_known_value() {
        assert_eq!(article_id(ts(2024, 8, 1, 12, 34, 56)), "3810dd8c80");
        assert_eq!(article_id(ts(2026, 1, 1, 0, 0, 0)), "3c8f3a4b40");
    }

    #[test]
    fn test_article_id_is_ten_hex_chars_and_decodes() {
        let samples = [
            ts(2024, 1, 1, 0, 0, 0),
            ts(2024, 12, 31, 23, 59, 59),
            ts(2025, 6, 15, 9, 5, 1),
            ts(2026, 10, 19, 18, 42, 7),
            ts(2099, 12, 31, 23, 59, 59),
        ];
        for sample in samples {
            let id = article_id(sample);
            assert_eq!(id.len(), ARTICLE_ID_LEN, "{id}");
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
            assert_eq!(decode_article_id(&id), Some(sample));
        }
    }

    #[test]
    fn test_decode_article_id_keeps_late_century_years_in_2000s() {
        for year in [2069, 2070, 2099] {
            let sample = ts(year, 3, 4, 5, 6, 7);
            assert_eq!(decode_article_id(&article_id(sample)), Some(sample));
        }
    }

    #[test]
    fn test_decode_article_id_rejects_bad_input() {
        assert_eq!(decode_article_id("3810dd8c8"), None);
        assert_eq!(decode_article_id("zzzzzzzzzz"), None);
        // 0xffffffffff is 1099511627775, more than twelve digits
        assert_eq!(decode_article_id("ffffffffff"), None);
    }

    #[test]
    fn test_kst_offset() {
        assert_eq!(kst_now().offset().local_minus_utc(), KST_OFFSET_SECS);
    }

    #[test]
    fn test_strip_markdown() {
        assert_eq!(strip_markdown("## **Big** news"), "Big news");
        assert_eq!(
            strip_markdown("# Title\nline with *stars* and __under__"),
            "Title\nline with stars and under"
        );
        assert_eq!(strip_markdown("plain♡"), "plain♡");
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  [3]  "), "[3]");
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundary() {
        let s = "허접♡허접♡";
        let result = truncate_for_log(s, 4);
        assert!(result.starts_with("허"));
    }

    #[test]
    fn test_looks_truncated() {
        let json_eof = r#"{"field": "value"#;
        let result: Result<serde_json::Value, _> = serde_json::from_str(json_eof);
        assert!(looks_truncated(&result.unwrap_err()));
    }
}
