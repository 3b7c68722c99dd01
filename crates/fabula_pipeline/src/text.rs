//! Shared text analysis helpers for the quality gates and the trim pass.

/// Split prose into sentences on terminal punctuation.
///
/// Keeps the terminator attached to its sentence. Ellipses and quoted
/// punctuation produce acceptable-enough splits for gate thresholds; this is
/// a heuristic, not a parser.
pub fn split_sentences(text: &str) -> Vec<&str> {
    const TERMINATORS: [char; 3] = ['.', '!', '?'];
    const TRAILERS: [char; 7] = ['.', '!', '?', '"', '\u{201c}', '\u{201d}', '\u{00bb}'];

    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if TERMINATORS.contains(&c) {
            // Consume trailing punctuation runs and closing quotes
            let mut end = i + c.len_utf8();
            while let Some(&(j, n)) = chars.peek() {
                if TRAILERS.contains(&n) {
                    end = j + n.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Count words by whitespace splitting.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Count dialogue lines: sentences carrying an opening dialogue marker.
///
/// Recognizes straight quotes, German low quotes, and guillemets.
pub fn dialogue_line_count(text: &str) -> usize {
    split_sentences(text)
        .iter()
        .filter(|s| has_dialogue_marker(s))
        .count()
}

/// Whether a span of text contains any dialogue marker.
pub fn has_dialogue_marker(text: &str) -> bool {
    text.contains('"')
        || text.contains('\u{201e}') // „
        || text.contains('\u{201c}') // “
        || text.contains('\u{00bb}') // »
        || text.contains('\u{00ab}') // «
}

/// Levenshtein edit distance between two strings, by character.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Length-normalized similarity in [0, 1]: 1.0 means identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

/// Case-insensitive substring search.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_split() {
        let s = split_sentences("Lena lief los. \u{201e}Warte!\u{201c} rief Theo. Dann war es still.");
        assert_eq!(s.len(), 3);
        assert!(s[0].starts_with("Lena"));
    }

    #[test]
    fn test_dialogue_detection() {
        assert!(has_dialogue_marker("\u{201e}Hallo\u{201c}, sagte sie."));
        assert!(has_dialogue_marker("\"Hello,\" she said."));
        assert!(!has_dialogue_marker("Nobody spoke."));
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_similarity_bounds() {
        assert!(similarity("abcdefghij", "abcdefghix") > 0.85);
        assert!(similarity("abcdefghij", "zzzzzzzzzz") < 0.2);
        assert_eq!(similarity("", ""), 1.0);
    }
}
