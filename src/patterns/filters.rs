//! False-Positive Suppression and Confidence Scoring Helpers
//!
//! Placeholder filtering, context extraction and Shannon entropy used by the
//! pattern bank to keep docs, fixtures and sample configs out of the results.

use std::collections::HashMap;

/// Context window captured on each side of a match, in bytes.
const CONTEXT_WINDOW: usize = 50;

/// Substrings that mark a candidate (or its surroundings) as a placeholder.
const PLACEHOLDER_INDICATORS: &[&str] = &[
    "example",
    "sample",
    "test",
    "demo",
    "fake",
    "dummy",
    "placeholder",
    "your_",
    "_here",
    "changeme",
    "change_me",
    "xxxx",
    "insert_",
    "replace_",
    "todo",
    "fixme",
    "lorem",
];

/// Values that are secret-shaped words rather than secrets.
const RESERVED_WORDS: &[&str] = &[
    "password", "secretkey", "secret_key", "api_key", "apikey", "token", "secret", "key",
    "credential", "changeit",
];

/// Shannon entropy of a string in bits per symbol.
///
/// Empty input yields 0.0. A value drawn from a uniform alphabet of n
/// symbols approaches log2(n); placeholder strings like "aaaabbbb" land
/// well below 2.0 bits.
pub fn shannon_entropy(value: &str) -> f64 {
    if value.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in value.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }
    let total = total as f64;
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Extract a ±50-char window around a match, newline-collapsed.
/// Byte offsets are clamped to char boundaries before slicing.
pub fn extract_context(content: &str, start: usize, end: usize) -> String {
    let mut ctx_start = start.saturating_sub(CONTEXT_WINDOW);
    while ctx_start > 0 && !content.is_char_boundary(ctx_start) {
        ctx_start -= 1;
    }
    let mut ctx_end = (end + CONTEXT_WINDOW).min(content.len());
    while ctx_end < content.len() && !content.is_char_boundary(ctx_end) {
        ctx_end += 1;
    }
    content[ctx_start..ctx_end]
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}

/// True when the candidate should be suppressed as a likely false positive.
///
/// Checks, in order: placeholder indicators in the value or its context,
/// reserved secret-shaped words, degenerate character diversity, sequential
/// digit runs, and HTML-tag-shaped values like `<api-key>`.
pub fn is_false_positive(value: &str, context: &str) -> bool {
    let value_lower = value.to_lowercase();
    let context_lower = context.to_lowercase();

    if PLACEHOLDER_INDICATORS
        .iter()
        .any(|kw| value_lower.contains(kw) || context_lower.contains(kw))
    {
        return true;
    }

    if RESERVED_WORDS.iter().any(|w| value_lower == *w) {
        return true;
    }

    if distinct_chars(value) <= 2 {
        return true;
    }

    if is_sequential_digits(value) {
        return true;
    }

    // <something> is markup, not a credential
    if value.starts_with('<') && value.ends_with('>') {
        return true;
    }

    false
}

fn distinct_chars(value: &str) -> usize {
    let mut seen: Vec<char> = Vec::new();
    for c in value.chars() {
        if !seen.contains(&c) {
            seen.push(c);
            if seen.len() > 2 {
                break;
            }
        }
    }
    seen.len()
}

/// A long run of sequentially incrementing digits ("123456789012...") is a
/// counter or a made-up sample, not key material.
fn is_sequential_digits(value: &str) -> bool {
    if value.len() < 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    value
        .as_bytes()
        .windows(2)
        .all(|w| (w[0] - b'0' + 1) % 10 == w[1] - b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entropy_of_uniform_string() {
        // 4 distinct chars, uniformly distributed -> exactly 2 bits
        let e = shannon_entropy("abcdabcdabcdabcd");
        assert!((e - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_of_degenerate_string() {
        assert_eq!(shannon_entropy("aaaaaaaa"), 0.0);
        assert_eq!(shannon_entropy(""), 0.0);
    }

    #[test]
    fn test_entropy_of_random_looking_string() {
        let e = shannon_entropy("q8Zk2mXw9TfR4vLp");
        assert!(e > 3.0, "random-looking key should exceed 3 bits, got {e}");
    }

    #[test]
    fn test_placeholder_value_suppressed() {
        assert!(is_false_positive("your_api_key_here_1234567890", ""));
        assert!(is_false_positive("sk_live_example_abcdefghij", ""));
    }

    #[test]
    fn test_placeholder_context_suppressed() {
        assert!(is_false_positive(
            "q8Zk2mXw9TfR4vLp",
            "this is just a demo value for the docs"
        ));
    }

    #[test]
    fn test_reserved_word_suppressed() {
        assert!(is_false_positive("password", ""));
        assert!(is_false_positive("API_KEY", ""));
    }

    #[test]
    fn test_low_diversity_suppressed() {
        assert!(is_false_positive("ababababababab", ""));
        assert!(is_false_positive("00000000000000", ""));
    }

    #[test]
    fn test_sequential_digits_suppressed() {
        assert!(is_false_positive("1234567890123456", ""));
        assert!(!is_false_positive("1928374655647382", ""));
    }

    #[test]
    fn test_tag_shaped_value_suppressed() {
        assert!(is_false_positive("<insert-key-value>", ""));
    }

    #[test]
    fn test_real_secret_not_suppressed() {
        assert!(!is_false_positive(
            "AKIAQ7RZPK3MXW9TFVLP",
            "aws_access_key_id = AKIAQ7RZPK3MXW9TFVLP"
        ));
    }

    #[test]
    fn test_context_window_collapses_newlines() {
        let content = "line one\nSECRET=q8Zk2mXw9TfR4vLp\nline three";
        let start = content.find("q8Zk").unwrap();
        let ctx = extract_context(content, start, start + 16);
        assert!(!ctx.contains('\n'));
        assert!(ctx.contains("SECRET="));
    }

    #[test]
    fn test_context_window_char_boundary_safe() {
        let content = "émoji héader çontent q8Zk2mXw9TfR4vLp trailing téxt with áccents and more";
        let start = content.find("q8Zk").unwrap();
        // Must not panic on non-ASCII boundaries
        let ctx = extract_context(content, start, start + 16);
        assert!(ctx.contains("q8Zk2mXw9TfR4vLp"));
    }
}
