//! Text segmentation for synthesis.
//!
//! Splits a block's prose into sentence-bounded chunks. Each chunk is one
//! synthesis request: long enough for natural prosody, short enough that the
//! first audio of a block arrives quickly.

/// Default soft character bound per chunk.
pub const DEFAULT_CHUNK_CHARS: usize = 300;

/// Split text into synthesis chunks of at most `max_chars` characters.
///
/// Sentences end at `.`, `!`, `?` or `;` followed by whitespace (or the end
/// of the text), and at every newline. The terminator stays with its
/// sentence. Consecutive sentences are joined with a single space while the
/// run stays within the bound. A sentence longer than the bound is split at
/// clause punctuation, then at word boundaries.
///
/// Returns an empty list for whitespace-only input. Removing whitespace from
/// the concatenated chunks always reproduces the input with whitespace
/// removed.
#[must_use]
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        let sentence_len = char_len(sentence);

        if !current.is_empty() && char_len(&current) + 1 + sentence_len > max_chars {
            chunks.push(std::mem::take(&mut current));
        }

        if sentence_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(split_long_sentence(sentence, max_chars));
            continue;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

const fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | ';')
}

/// Split text into trimmed, non-empty sentences.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = i + c.len_utf8();
        let boundary = c == '\n'
            || (is_terminator(c) && chars.peek().is_none_or(|&(_, next)| next.is_whitespace()));

        if boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}

/// Split an overly long sentence at clause boundaries (, : — –).
fn split_long_sentence(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();

    for part in sentence.split_inclusive(&[',', ':', '—', '–'][..]) {
        if !current.is_empty() && char_len(&current) + char_len(part) > max_chars {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                clauses.push(trimmed);
            }
            current.clear();
        }
        current.push_str(part);
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        clauses.push(trimmed.to_string());
    }

    let mut chunks = Vec::new();
    for clause in clauses {
        if char_len(&clause) > max_chars {
            chunks.extend(hard_split(&clause, max_chars));
        } else {
            chunks.push(clause);
        }
    }
    chunks
}

/// Last-resort split at word boundaries. A single word longer than the bound
/// is kept whole.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && char_len(&current) + 1 + char_len(word) > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn assert_reassembles(text: &str, chunks: &[String]) {
        assert_eq!(squash(&chunks.concat()), squash(text));
    }

    #[test]
    fn test_split_short_text() {
        let chunks = split_into_chunks("Hello world.", DEFAULT_CHUNK_CHARS);
        assert_eq!(chunks, vec!["Hello world."]);
    }

    #[test]
    fn test_no_terminator_is_single_chunk() {
        let chunks = split_into_chunks("  drift along the quiet river  ", DEFAULT_CHUNK_CHARS);
        assert_eq!(chunks, vec!["drift along the quiet river"]);
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        assert!(split_into_chunks(" \n\t ", DEFAULT_CHUNK_CHARS).is_empty());
    }

    #[test]
    fn test_short_sentences_are_merged() {
        let text = "Breathe in. Hold it! Now release? Good; again.";
        let chunks = split_into_chunks(text, DEFAULT_CHUNK_CHARS);
        assert_eq!(chunks, vec![text]);
    }

    #[test]
    fn test_terminators_retained_at_bound() {
        let chunks = split_into_chunks("One two. Three four! Five six?", 12);
        assert_eq!(chunks, vec!["One two.", "Three four!", "Five six?"]);
    }

    #[test]
    fn test_newline_splits() {
        let chunks = split_into_chunks("first line\nsecond line", 12);
        assert_eq!(chunks, vec!["first line", "second line"]);
    }

    #[test]
    fn test_decimal_point_does_not_split() {
        let sentences = split_sentences("Breathe for 4.5 seconds. Then rest.");
        assert_eq!(sentences, vec!["Breathe for 4.5 seconds.", "Then rest."]);
    }

    #[test]
    fn test_split_long_text() {
        let sentences: Vec<String> = (1..=20)
            .map(|i| format!("This is sentence number {i} and it carries enough words to matter."))
            .collect();
        let text = sentences.join(" ");
        let chunks = split_into_chunks(&text, DEFAULT_CHUNK_CHARS);
        assert!(chunks.len() > 1, "Expected multiple chunks, got {}", chunks.len());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= DEFAULT_CHUNK_CHARS, "Chunk too long: {chunk}");
        }
        assert_reassembles(&text, &chunks);
    }

    #[test]
    fn test_long_sentence_split_at_clauses() {
        let text = "the tide comes in, the tide goes out, the shore remains, and you remain with it";
        let chunks = split_into_chunks(text, 40);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40, "Chunk too long: {chunk}");
        }
        assert_reassembles(text, &chunks);
    }

    #[test]
    fn test_oversized_word_kept_whole() {
        let word = "a".repeat(50);
        let chunks = split_into_chunks(&word, 10);
        assert_eq!(chunks, vec![word]);
    }

    #[test]
    fn test_reassembly_with_unicode_and_mixed_whitespace() {
        let text = "Sieh die Wellen… Atme ein!\n\nUnd aus; ganz langsam — ruhig.  Ende?";
        for bound in [1, 5, 17, 300] {
            let chunks = split_into_chunks(text, bound);
            assert!(chunks.iter().all(|c| !c.is_empty()));
            assert_reassembles(text, &chunks);
        }
    }
}
