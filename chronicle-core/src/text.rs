//! Small text helpers shared by prompt and chapter code.

/// The first `max` characters of `s`, never splitting a code point.
pub fn clip(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Replace every run of whitespace with one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split prose into sentences, breaking after `.`, `!` or `?` when followed by
/// whitespace. Terminal punctuation stays with its sentence.
pub fn sentences(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = s.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_idx, next)) = chars.peek() {
                if next.is_whitespace() {
                    let sentence = s[start..next_idx].trim();
                    if !sentence.is_empty() {
                        out.push(sentence);
                    }
                    start = next_idx;
                }
            }
        }
    }
    let tail = s[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}
