//! Text normalization and tokenization utilities
//!
//! Shared by the ingredient recognizer, quantity parser, canonical matcher,
//! and dish knowledge lookups so that all of them agree on what "the same
//! text" means.

/// A word token with its byte range in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Byte offset of the token start
    pub start: usize,
    /// Byte offset one past the token end
    pub end: usize,
}

/// Normalize free text for matching
///
/// Lowercases, strips punctuation (apostrophes and in-word hyphens survive),
/// and collapses runs of whitespace to single spaces.
///
/// ```
/// use sous_common::text::normalize;
/// assert_eq!(normalize("  Romaine  Lettuce, "), "romaine lettuce");
/// assert_eq!(normalize("Half-and-Half"), "half-and-half");
/// ```
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Invert a single "tail, head" comma form
///
/// Index-style ingredient listings write "lettuce, romaine" for
/// "romaine lettuce". Returns the inverted, normalized form, or None when the
/// text does not have exactly one comma with text on both sides.
pub fn comma_inverted(text: &str) -> Option<String> {
    let mut parts = text.splitn(2, ',');
    let head = parts.next()?.trim();
    let tail = parts.next()?.trim();
    if head.is_empty() || tail.is_empty() || tail.contains(',') {
        return None;
    }
    Some(normalize(&format!("{} {}", tail, head)))
}

/// Tokenize text into word tokens with byte offsets
///
/// A token is a maximal run of alphanumeric characters. Offsets index the
/// original string, so callers can relate tokens back to spans.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            tokens.push(Token { start: s, end: i });
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            start: s,
            end: text.len(),
        });
    }
    tokens
}

/// Count word tokens strictly inside the byte range `[from, to)`
///
/// Used for bounded token-distance windows: tokens partially overlapping the
/// range edges are not counted.
pub fn tokens_between(tokens: &[Token], from: usize, to: usize) -> usize {
    if from >= to {
        return 0;
    }
    tokens
        .iter()
        .filter(|t| t.start >= from && t.end <= to)
        .count()
}
