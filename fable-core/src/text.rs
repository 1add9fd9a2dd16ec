//! Sentence-boundary splitting for narration.

/// Texts shorter than this are never split: too short to benefit from
/// a fast first chunk, and splitting risks mid-word cuts.
pub const MIN_SPLIT_LEN: usize = 50;

/// Split text into the first sentence and the remainder.
///
/// The boundary is the first `.`, `!`, or `?` followed by whitespace
/// or end-of-string. If no boundary exists (or the text is below
/// [`MIN_SPLIT_LEN`]), the whole text is the first part and the
/// remainder is empty. Both halves are trimmed.
pub fn split_first_sentence(text: &str) -> (String, String) {
    if text.is_empty() {
        return (String::new(), String::new());
    }
    if text.chars().count() < MIN_SPLIT_LEN {
        return (text.to_string(), String::new());
    }

    let mut chars = text.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        if !is_terminator(ch) {
            continue;
        }
        let followed_by_space = match chars.peek() {
            Some((_, next)) => next.is_whitespace(),
            None => true,
        };
        if !followed_by_space {
            continue;
        }

        let split_at = index + ch.len_utf8();
        let first = text[..split_at].trim().to_string();
        let rest = text[split_at..].trim().to_string();
        return (first, rest);
    }

    // No terminator found.
    (text.trim().to_string(), String::new())
}

/// Split text into an ordered list of sentences.
///
/// Trailing text without a terminator forms a final sentence; a
/// non-empty input always yields at least one entry.
pub fn split_sentences(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = trimmed.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if !is_terminator(ch) {
            continue;
        }
        // Absorb runs of terminators ("?!", "...") and a closing quote.
        while let Some((_, next)) = chars.peek() {
            if is_terminator(*next) || *next == '"' || *next == '\'' {
                chars.next();
            } else {
                break;
            }
        }
        let end = chars.peek().map(|(i, _)| *i).unwrap_or(trimmed.len());
        let boundary_ok = end == trimmed.len()
            || trimmed[end..]
                .chars()
                .next()
                .map(|c| c.is_whitespace())
                .unwrap_or(true);
        if !boundary_ok {
            continue;
        }

        let sentence = trimmed[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = end;
    }

    let tail = trimmed[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    if sentences.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

fn is_terminator(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_at_first_sentence() {
        let (first, rest) = split_first_sentence(
            "Hello there, traveler of the long winding road. More text follows.",
        );
        assert_eq!(first, "Hello there, traveler of the long winding road.");
        assert_eq!(rest, "More text follows.");
    }

    #[test]
    fn test_short_text_is_never_split() {
        let (first, rest) = split_first_sentence("Hi");
        assert_eq!(first, "Hi");
        assert_eq!(rest, "");

        let (first, rest) = split_first_sentence("Oh. A short one.");
        assert_eq!(first, "Oh. A short one.");
        assert_eq!(rest, "");
    }

    #[test]
    fn test_no_terminator_returns_whole_text() {
        let text = "a narration fragment without any ending punctuation at all";
        let (first, rest) = split_first_sentence(text);
        assert_eq!(first, text);
        assert_eq!(rest, "");
    }

    #[test]
    fn test_single_sentence_has_empty_remainder() {
        let text = "The cavern mouth yawns wide beneath the cliff face today.";
        let (first, rest) = split_first_sentence(text);
        assert_eq!(first, text);
        assert_eq!(rest, "");
    }

    #[test]
    fn test_terminator_mid_word_is_skipped() {
        let text = "Version 2.5 of the map shows a pass! The rest is uncharted territory.";
        let (first, rest) = split_first_sentence(text);
        assert_eq!(first, "Version 2.5 of the map shows a pass!");
        assert_eq!(rest, "The rest is uncharted territory.");
    }

    #[test]
    fn test_exclamation_and_question_boundaries() {
        let (first, rest) =
            split_first_sentence("Watch out for the falling rocks ahead! Do you run or hide?");
        assert_eq!(first, "Watch out for the falling rocks ahead!");
        assert_eq!(rest, "Do you run or hide?");
    }

    #[test]
    fn test_split_sentences_basic() {
        let sentences = split_sentences("One. Two! Three?");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?"]);
    }

    #[test]
    fn test_split_sentences_trailing_fragment() {
        let sentences = split_sentences("A full stop. and then a fragment");
        assert_eq!(sentences, vec!["A full stop.", "and then a fragment"]);
    }

    #[test]
    fn test_split_sentences_with_quotes_and_runs() {
        let sentences = split_sentences("\"Halt!\" the guard cries. You freeze...");
        assert_eq!(
            sentences,
            vec!["\"Halt!\"", "the guard cries.", "You freeze..."]
        );
    }

    #[test]
    fn test_split_sentences_empty() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_split_sentences_never_empty_for_content() {
        assert_eq!(split_sentences("no punctuation"), vec!["no punctuation"]);
    }
}
