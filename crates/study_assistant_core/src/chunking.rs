//! crates/study_assistant_core/src/chunking.rs
//!
//! Two separate ways of cutting up a document:
//!
//! - Generation chunks: consecutive, non-overlapping character spans of a fixed size,
//!   optionally down-sampled with an even stride so a document never costs more than a
//!   fixed number of generation calls.
//! - Retrieval windows: overlapping word windows used only for lexical scoring.

use crate::domain::Chunk;

/// Errors raised when chunking parameters are unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkingError {
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    #[error("window size must be greater than zero")]
    InvalidWindowSize,
}

/// Splits `text` into chunks of exactly `unit_size` characters; the last one may be shorter.
///
/// Sizes are counted in `char`s, so multi-byte text is never cut inside a code point.
/// Concatenating the chunks in order reproduces `text`.
pub fn split_into_chunks(text: &str, unit_size: usize) -> Result<Vec<Chunk>, ChunkingError> {
    if unit_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chars_in_chunk = 0;

    for (offset, _) in text.char_indices() {
        if chars_in_chunk == unit_size {
            chunks.push(Chunk {
                index: chunks.len(),
                text: text[start..offset].to_string(),
            });
            start = offset;
            chars_in_chunk = 0;
        }
        chars_in_chunk += 1;
    }
    if start < text.len() {
        chunks.push(Chunk {
            index: chunks.len(),
            text: text[start..].to_string(),
        });
    }

    Ok(chunks)
}

/// Down-samples `chunks` to at most `max_units` by even-stride selection.
///
/// When there are more chunks than the budget, position `i` of the result is the chunk at
/// `floor(i * total / max_units)`. Selected chunks keep their text and relative order; the
/// content between them is skipped for this pass.
pub fn cap_chunks(chunks: Vec<Chunk>, max_units: usize) -> Vec<Chunk> {
    let total = chunks.len();
    if max_units == 0 || total <= max_units {
        return chunks;
    }

    let mut slots: Vec<Option<Chunk>> = chunks.into_iter().map(Some).collect();
    (0..max_units)
        .filter_map(|i| slots[i * total / max_units].take())
        .collect()
}

/// Produces overlapping windows of `window_size` words, advancing `window_size - overlap`
/// words at a time. Each window is re-joined with single spaces.
///
/// An overlap at or above the window size degrades to a step of one word.
pub fn word_windows(
    text: &str,
    window_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if window_size == 0 {
        return Err(ChunkingError::InvalidWindowSize);
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let step = window_size.saturating_sub(overlap).max(1);

    Ok((0..words.len())
        .step_by(step)
        .map(|start| {
            let end = (start + window_size).min(words.len());
            words[start..end].join(" ")
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn split_produces_fixed_size_chunks_with_short_tail() {
        let chunks = split_into_chunks("abcdefghij", 4).unwrap();
        assert_eq!(texts(&chunks), vec!["abcd", "efgh", "ij"]);
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn split_counts_characters_not_bytes() {
        let chunks = split_into_chunks("héllo wörld", 5).unwrap();
        assert_eq!(texts(&chunks), vec!["héllo", " wörl", "d"]);
    }

    #[test]
    fn split_of_empty_text_is_empty() {
        assert!(split_into_chunks("", 10).unwrap().is_empty());
    }

    #[test]
    fn split_rejects_zero_unit_size() {
        assert_eq!(
            split_into_chunks("abc", 0).unwrap_err(),
            ChunkingError::InvalidChunkSize
        );
    }

    #[test]
    fn chunk_count_is_ceiling_of_length_over_size() {
        let text = "x".repeat(9000);
        assert_eq!(split_into_chunks(&text, 4000).unwrap().len(), 3);
        let exact = "x".repeat(8000);
        assert_eq!(split_into_chunks(&exact, 4000).unwrap().len(), 2);
    }

    #[test]
    fn cap_leaves_small_inputs_alone() {
        let chunks = split_into_chunks("abcdef", 2).unwrap();
        assert_eq!(cap_chunks(chunks.clone(), 15), chunks);
    }

    #[test]
    fn cap_uses_even_stride() {
        let chunks = split_into_chunks(&"x".repeat(40), 1).unwrap();
        let capped = cap_chunks(chunks, 15);
        let indices: Vec<usize> = capped.iter().map(|c| c.index).collect();
        let expected: Vec<usize> = (0..15).map(|i| i * 40 / 15).collect();
        assert_eq!(indices, expected);
        assert_eq!(indices[0], 0);
        assert_eq!(indices[14], 37);
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let text = "w0 w1 w2 w3 w4 w5 w6";
        let windows = word_windows(text, 3, 1).unwrap();
        assert_eq!(windows, vec!["w0 w1 w2", "w2 w3 w4", "w4 w5 w6", "w6"]);
    }

    #[test]
    fn windows_of_empty_text_are_empty() {
        assert!(word_windows("   ", 500, 50).unwrap().is_empty());
    }

    #[test]
    fn oversized_overlap_still_advances() {
        let windows = word_windows("a b c", 2, 5).unwrap();
        assert_eq!(windows, vec!["a b", "b c", "c"]);
    }
}
