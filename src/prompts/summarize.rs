//! Summarization prompt for scientific paper text.

/// System instruction sent with every summarization request.
pub const SYSTEM_PROMPT: &str = "Summarize the following scientific text.";

/// Truncate paper text to a single call's worth of payload.
///
/// Cuts on a char boundary at `max_chars`; callers needing the full document
/// must chunk and re-aggregate themselves.
pub fn build_payload(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_payload_truncates() {
        let text = "abcdef";
        assert_eq!(build_payload(text, 4), "abcd");
        assert_eq!(build_payload(text, 10), "abcdef");
    }

    #[test]
    fn test_build_payload_char_boundary() {
        let text = "ααββ";
        assert_eq!(build_payload(text, 2), "αα");
    }
}
