//! Boundary-aware text chunker with overlap.
//!
//! Splits document text into fragments of at most `max_size` characters,
//! where consecutive fragments share up to `overlap` characters of
//! context. Splitting prefers paragraph boundaries (`\n\n`), then line
//! breaks, then spaces, and only cuts inside a word when a single word is
//! longer than `max_size`.
//!
//! # Algorithm
//!
//! 1. Break the text into *pieces* no longer than `max_size`, keeping each
//!    separator attached to the piece before it so the pieces concatenate
//!    back to the exact input. Oversized pieces are re-split with the next
//!    finer separator; a hard character split is the last resort.
//! 2. Slide a window over the pieces. When the next piece would overflow
//!    the window, emit the window as a fragment, then drop pieces from its
//!    front until what remains fits in `overlap` and leaves room for the
//!    next piece.
//! 3. Fragments are trimmed; whitespace-only fragments are dropped.
//!
//! Lengths are measured in `char`s, never bytes, so multi-byte text is never
//! cut inside a code point.
//!
//! # Example
//!
//! ```rust
//! use kbroute_core::chunk::split_text;
//!
//! let parts = split_text("Primeiro parágrafo.\n\nSegundo parágrafo.", 1000, 200);
//! assert_eq!(parts.len(), 1);
//! assert!(split_text("", 1000, 200).is_empty());
//! ```

use std::collections::VecDeque;

use crate::models::{Fragment, SourceDocument};

/// Separators tried in order, coarsest first.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Split `text` into ordered, overlapping fragments of at most `max_size`
/// characters.
///
/// # Guarantees
///
/// - Empty or whitespace-only input yields an empty vector.
/// - Every fragment is non-empty and at most `max_size` characters long.
/// - Consecutive fragments share at most `overlap` characters.
/// - The output depends only on the arguments.
///
/// A `max_size` of zero is treated as one. An `overlap` that is not smaller
/// than `max_size` is reduced to `max_size / 2`.
pub fn split_text(text: &str, max_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let max_size = max_size.max(1);
    let overlap = if overlap >= max_size {
        max_size / 2
    } else {
        overlap
    };

    let pieces = split_pieces(text, max_size, &SEPARATORS);
    merge_pieces(&pieces, max_size, overlap)
}

/// Chunk a document's content into fragments with contiguous sequence
/// indices starting at 0. Embeddings are left empty.
pub fn chunk_document(doc: &SourceDocument, max_size: usize, overlap: usize) -> Vec<Fragment> {
    split_text(&doc.raw_content, max_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Fragment {
            parent_id: doc.external_id,
            sequence_index: i as i64,
            clean_text: text,
            embedding: None,
            embedding_model: None,
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Break `text` into pieces of at most `max_size` chars that concatenate
/// back to `text`.
fn split_pieces<'a>(text: &'a str, max_size: usize, separators: &[&str]) -> Vec<&'a str> {
    if char_len(text) <= max_size {
        return vec![text];
    }

    let Some((sep, finer)) = separators.split_first() else {
        return hard_split(text, max_size);
    };

    let mut pieces = Vec::new();
    for part in text.split_inclusive(*sep) {
        if char_len(part) <= max_size {
            pieces.push(part);
        } else {
            pieces.extend(split_pieces(part, max_size, finer));
        }
    }
    pieces
}

/// Cut `text` every `max_size` chars.
fn hard_split(text: &str, max_size: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, _) in text.char_indices() {
        if count == max_size {
            pieces.push(&text[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn merge_pieces(pieces: &[&str], max_size: usize, overlap: usize) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut window_len = 0usize;
    // Whether the window holds text not yet emitted in a fragment.
    let mut fresh = false;

    for piece in pieces {
        let len = char_len(piece);

        if window_len + len > max_size && !window.is_empty() {
            if fresh {
                emit(&window, &mut fragments);
                fresh = false;
            }
            while let Some(&(_, front_len)) = window.front() {
                if window_len > overlap || window_len + len > max_size {
                    window.pop_front();
                    window_len -= front_len;
                } else {
                    break;
                }
            }
        }

        window.push_back((*piece, len));
        window_len += len;
        fresh |= !piece.trim().is_empty();
    }

    if fresh {
        emit(&window, &mut fragments);
    }

    fragments
}

fn emit(window: &VecDeque<(&str, usize)>, fragments: &mut Vec<String>) {
    let joined: String = window.iter().map(|(p, _)| *p).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        fragments.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Rebuild the word sequence by dropping the longest word overlap
    /// between consecutive fragments. Only valid for texts whose words are
    /// all distinct.
    fn rebuild_words(fragments: &[String]) -> Vec<String> {
        let mut words: Vec<String> = Vec::new();
        for frag in fragments {
            let next: Vec<String> = frag.split_whitespace().map(String::from).collect();
            let max_k = words.len().min(next.len());
            let shared = (0..=max_k)
                .rev()
                .find(|&k| words[words.len() - k..] == next[..k])
                .unwrap_or(0);
            words.extend(next.into_iter().skip(shared));
        }
        words
    }

    #[test]
    fn test_empty_text() {
        assert!(split_text("", 500, 50).is_empty());
        assert!(split_text("  \n\n \t ", 500, 50).is_empty());
    }

    #[test]
    fn test_small_text_single_fragment() {
        let parts = split_text("Olá, mundo!", 500, 50);
        assert_eq!(parts, vec!["Olá, mundo!".to_string()]);
    }

    #[test]
    fn test_fragments_respect_max_size() {
        let text = numbered_words(400);
        for (max, overlap) in [(50, 10), (100, 50), (500, 50), (1000, 200), (7, 3)] {
            for part in split_text(&text, max, overlap) {
                assert!(
                    part.chars().count() <= max,
                    "fragment of {} chars exceeds {}",
                    part.chars().count(),
                    max
                );
                assert!(!part.is_empty());
            }
        }
    }

    #[test]
    fn test_reconstructs_input_words() {
        let text = numbered_words(300);
        let parts = split_text(&text, 120, 40);
        assert!(parts.len() > 1);
        let rebuilt = rebuild_words(&parts);
        let expected: Vec<String> = text.split_whitespace().map(String::from).collect();
        assert_eq!(rebuilt, expected);
    }

    #[test]
    fn test_consecutive_fragments_overlap() {
        let text = numbered_words(200);
        let parts = split_text(&text, 100, 30);
        for pair in parts.windows(2) {
            let first_word_of_next = pair[1].split_whitespace().next().unwrap();
            assert!(
                pair[0].contains(first_word_of_next),
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_zero_overlap_has_no_shared_words() {
        let text = numbered_words(100);
        let parts = split_text(&text, 60, 0);
        let total: usize = parts.iter().map(|p| p.split_whitespace().count()).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para_a = "a".repeat(40);
        let para_b = "b".repeat(40);
        let text = format!("{}\n\n{}", para_a, para_b);
        let parts = split_text(&text, 50, 0);
        assert_eq!(parts, vec![para_a, para_b]);
    }

    #[test]
    fn test_long_word_is_hard_split() {
        let text = "x".repeat(25);
        let parts = split_text(&text, 10, 0);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.concat(), text);
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "ção ".repeat(100);
        for part in split_text(&text, 13, 4) {
            assert!(part.chars().count() <= 13);
        }
    }

    #[test]
    fn test_invalid_overlap_is_clamped() {
        let text = numbered_words(50);
        let parts = split_text(&text, 20, 40);
        assert!(!parts.is_empty());
        for part in &parts {
            assert!(part.chars().count() <= 20);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = format!("{}\n\n{}", numbered_words(120), numbered_words(80));
        assert_eq!(split_text(&text, 90, 20), split_text(&text, 90, 20));
    }

    #[test]
    fn test_chunk_document_indices_contiguous() {
        let doc = SourceDocument::new(10, "Doc", numbered_words(200), vec![]);
        let fragments = chunk_document(&doc, 80, 20);
        assert!(fragments.len() > 1);
        for (i, f) in fragments.iter().enumerate() {
            assert_eq!(f.sequence_index, i as i64);
            assert_eq!(f.parent_id, 10);
            assert!(f.embedding.is_none());
        }
    }
}
