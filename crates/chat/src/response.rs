//! Final response cleanup.

use std::sync::LazyLock;

use regex::Regex;

/// Appended when a response is cut to the configured length.
pub const TRUNCATION_MARKER: &str = "\n\n... (response truncated)";

static ANSI_ESCAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07]*\x07").ok());

/// Remove ANSI escape sequences and control characters other than `\n`/`\t`.
pub fn strip_control(text: &str) -> String {
    let without_ansi = match ANSI_ESCAPE.as_ref() {
        Some(re) => re.replace_all(text, ""),
        None => text.into(),
    };
    without_ansi
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

/// Cut to `max_chars` characters plus [`TRUNCATION_MARKER`].
///
/// Text already truncated to this limit is returned unchanged.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if let Some(body) = text.strip_suffix(TRUNCATION_MARKER)
        && body.chars().count() <= max_chars
    {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

/// Strip, trim and truncate an agent response for delivery.
pub fn clean_response(text: &str, max_chars: usize) -> String {
    truncate(strip_control(text).trim(), max_chars)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("\x1b[31mred\x1b[0m text", "red text")]
    #[case("bell\x07 and\r\nnewline\ttab", "bell and\nnewline\ttab")]
    #[case("\x1b]0;title\x07plain", "plain")]
    fn strips_escapes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_control(input), expected);
    }

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(clean_response("  Hi there \n", 100), "Hi there");
        assert_eq!(truncate("exact", 5), "exact");
    }

    #[test]
    fn long_text_is_cut_to_limit_plus_marker() {
        let text = "é".repeat(20);
        let cut = truncate(&text, 8);
        assert_eq!(cut, format!("{}{TRUNCATION_MARKER}", "é".repeat(8)));
    }

    #[test]
    fn truncation_is_idempotent() {
        let once = clean_response(&"word ".repeat(100), 42);
        assert_eq!(truncate(&once, 42), once);
        assert_eq!(clean_response(&once, 42), once);
    }
}
