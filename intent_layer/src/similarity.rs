//! Token normalization and string similarity
//!
//! Shared by the classifier for keyword coverage, typo-tolerant keyword
//! matching and phrase-template matching.

use ahash::AHashSet;

/// Words that carry no intent signal on their own
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "for", "of", "in", "on", "at", "to", "me", "my", "please", "is", "are",
    "and", "with", "from", "can", "you", "i", "it", "its", "s", "be", "by", "all", "now", "this",
    "that", "could", "would", "us", "our", "let",
];

/// A lowercased word with its byte offsets in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Split text into lowercased alphanumeric tokens, keeping source offsets.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if ch.is_alphanumeric() {
            if current.is_none() {
                current = Some(idx);
            }
        } else if let Some(start) = current.take() {
            tokens.push(make_token(text, start, idx));
        }
    }
    if let Some(start) = current {
        tokens.push(make_token(text, start, text.len()));
    }

    tokens
}

fn make_token(text: &str, start: usize, end: usize) -> Token {
    Token {
        text: text[start..end].to_lowercase(),
        start,
        end,
    }
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// True when `token` equals `keyword` or is a close misspelling of it.
///
/// Fuzzy matching only applies to words of five or more characters; short
/// words differ by too little to tell a typo from another word.
pub fn keyword_matches(token: &str, keyword: &str, fuzzy_threshold: f64) -> bool {
    if token == keyword {
        return true;
    }
    let token_len = token.chars().count();
    let keyword_len = keyword.chars().count();
    if token_len < 5 || keyword_len < 5 {
        return false;
    }
    if token_len.abs_diff(keyword_len) > 2 {
        return false;
    }
    sequence_ratio(token, keyword) >= fuzzy_threshold
}

/// Calculate similarity score between input and pattern (0.0-1.0)
///
/// Uses a multi-stage approach:
/// 1. Exact substring match → 1.0
/// 2. Token-based overlap → 0.0-1.0
/// 3. Sequence similarity → 0.0-1.0
pub fn calculate_similarity(input: &str, pattern: &str) -> f64 {
    if pattern.is_empty() {
        return 0.0;
    }

    if input.contains(pattern) {
        return 1.0;
    }

    let input_lower = input.to_lowercase();
    let pattern_lower = pattern.to_lowercase();

    if input_lower.contains(&pattern_lower) {
        return 0.95;
    }

    let input_tokens: AHashSet<&str> = input_lower.split_whitespace().collect();
    let pattern_tokens: AHashSet<&str> = pattern_lower.split_whitespace().collect();

    if pattern_tokens.is_empty() {
        return 0.0;
    }

    let token_overlap = input_tokens.intersection(&pattern_tokens).count() as f64
        / pattern_tokens.len() as f64;

    if token_overlap < 0.3 {
        return token_overlap * 0.6;
    }

    let sequence_similarity = sequence_ratio(&input_lower, &pattern_lower);

    (token_overlap * 0.6) + (sequence_similarity * 0.4)
}

/// Sequence similarity ratio, `2 * lcs / (len(a) + len(b))`
pub fn sequence_ratio(s1: &str, s2: &str) -> f64 {
    if s1.is_empty() && s2.is_empty() {
        return 1.0;
    }
    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }

    let lcs_len = longest_common_subsequence(s1, s2);
    let total_len = s1.chars().count() + s2.chars().count();

    (2.0 * lcs_len as f64) / total_len as f64
}

fn longest_common_subsequence(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    let n = s2_chars.len();

    // Two rolling rows
    let mut prev = vec![0; n + 1];
    let mut curr = vec![0; n + 1];

    for c1 in &s1_chars {
        for j in 1..=n {
            if *c1 == s2_chars[j - 1] {
                curr[j] = prev[j - 1] + 1;
            } else {
                curr[j] = prev[j].max(curr[j - 1]);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_keeps_offsets() {
        let text = "Show AHU-1 temperature!";
        let tokens = tokenize(text);
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["show", "ahu", "1", "temperature"]);
        for token in &tokens {
            assert_eq!(text[token.start..token.end].to_lowercase(), token.text);
        }
    }

    #[test]
    fn test_tokenize_multibyte() {
        let tokens = tokenize("set 26°C für Zone");
        assert_eq!(tokens[1].text, "26");
        assert_eq!(tokens[2].text, "c");
        assert_eq!(tokens[3].text, "für");
    }

    #[test]
    fn test_keyword_exact_and_fuzzy() {
        assert!(keyword_matches("chart", "chart", 0.85));
        assert!(keyword_matches("acknowlege", "acknowledge", 0.85));
        assert!(keyword_matches("charts", "chart", 0.85));
        assert!(!keyword_matches("status", "start", 0.85));
        assert!(!keyword_matches("shw", "show", 0.85));
    }

    #[test]
    fn test_exact_match() {
        assert!((calculate_similarity("show me the trend", "show me the trend") - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_substring_match() {
        assert!(calculate_similarity("what is the status of ahu-1", "what is the status") > 0.9);
    }

    #[test]
    fn test_no_match() {
        let score = calculate_similarity("hello world", "turn on");
        assert!(score < 0.3);
    }

    #[test]
    fn test_sequence_ratio_bounds() {
        assert_eq!(sequence_ratio("", ""), 1.0);
        assert_eq!(sequence_ratio("abc", ""), 0.0);
        assert!((sequence_ratio("abc", "abc") - 1.0).abs() < f64::EPSILON);
    }
}
