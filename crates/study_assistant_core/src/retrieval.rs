//! crates/study_assistant_core/src/retrieval.rs
//!
//! Picks the excerpts of a document that share the most vocabulary with a question.
//! Scoring is plain set overlap of lowercase whitespace tokens; there is no stemming
//! and no embedding model involved.

use std::collections::HashSet;

use crate::chunking::{word_windows, ChunkingError};

/// Separator placed between excerpts when they are rendered as prompt context.
pub const EXCERPT_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub window_words: usize,
    pub overlap_words: usize,
    pub top_k: usize,
    /// Characters of raw text returned when nothing matches.
    pub fallback_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            window_words: 500,
            overlap_words: 50,
            top_k: 3,
            fallback_chars: 2000,
        }
    }
}

/// Grounding context for a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievedContext {
    /// Best-scoring windows, highest score first.
    Excerpts(Vec<String>),
    /// No window shared a word with the query; this is a prefix of the raw text.
    Prefix(String),
}

impl RetrievedContext {
    pub fn render(&self) -> String {
        match self {
            Self::Excerpts(excerpts) => excerpts.join(EXCERPT_SEPARATOR),
            Self::Prefix(prefix) => prefix.clone(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Prefix(_))
    }
}

/// Scores every window against `query` and keeps the `top_k` best.
///
/// Ties keep their original window order. Returns a prefix of `text` when no window
/// scores above zero, so a non-empty document always yields non-empty context.
pub fn retrieve(
    text: &str,
    query: &str,
    settings: &RetrievalSettings,
) -> Result<RetrievedContext, ChunkingError> {
    let windows = word_windows(text, settings.window_words, settings.overlap_words)?;
    let query_words = lowercase_words(query);

    let mut scored: Vec<(usize, String)> = windows
        .into_iter()
        .filter_map(|window| {
            let score = lowercase_words(&window).intersection(&query_words).count();
            (score > 0).then_some((score, window))
        })
        .collect();

    if scored.is_empty() {
        let prefix: String = text.chars().take(settings.fallback_chars).collect();
        return Ok(RetrievedContext::Prefix(prefix));
    }

    // `sort_by` is stable, so equal scores stay in document order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(RetrievedContext::Excerpts(
        scored
            .into_iter()
            .take(settings.top_k)
            .map(|(_, window)| window)
            .collect(),
    ))
}

fn lowercase_words(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Sentences quoted when a document defines a term.
const DEFINITION_SENTENCES: usize = 2;
/// Longest in-document definition returned.
const DEFINITION_CHARS: usize = 300;

/// Finds a definition of `term` in `text` by quoting the first sentences that mention it.
///
/// Matching is a case-insensitive substring test per `". "`-separated sentence. Returns
/// `None` for very short texts, when no sentence mentions the term, or when the quoted
/// sentences are too short to be useful.
pub fn define_from_text(text: &str, term: &str) -> Option<String> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() || text.chars().count() <= 20 {
        return None;
    }

    let sentences: Vec<&str> = text
        .split(". ")
        .map(str::trim)
        .filter(|sentence| sentence.to_lowercase().contains(&needle))
        .take(DEFINITION_SENTENCES)
        .collect();
    if sentences.is_empty() {
        return None;
    }

    let definition = format!("{}.", sentences.join(". "));
    if definition.chars().count() <= 10 {
        return None;
    }
    Some(definition.chars().take(DEFINITION_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_windows(top_k: usize) -> RetrievalSettings {
        RetrievalSettings {
            window_words: 4,
            overlap_words: 0,
            top_k,
            fallback_chars: 10,
        }
    }

    #[test]
    fn unmatched_query_falls_back_to_prefix() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let context = retrieve(text, "quantum", &small_windows(3)).unwrap();
        assert_eq!(context, RetrievedContext::Prefix("alpha beta".to_string()));
        assert!(context.is_fallback());
    }

    #[test]
    fn single_matching_window_comes_first() {
        let text = "alpha beta gamma delta mitochondria powers the cell";
        let context = retrieve(text, "What are MITOCHONDRIA?", &small_windows(3)).unwrap();
        // "mitochondria?" with punctuation does not match; the bare word does.
        assert!(context.is_fallback());

        let context = retrieve(text, "tell me about Mitochondria", &small_windows(3)).unwrap();
        assert_eq!(
            context,
            RetrievedContext::Excerpts(vec!["mitochondria powers the cell".to_string()])
        );
    }

    #[test]
    fn top_k_bounds_the_result() {
        let text = "cell one two three cell four five six cell seven eight nine";
        let context = retrieve(text, "cell", &small_windows(2)).unwrap();
        match context {
            RetrievedContext::Excerpts(excerpts) => assert_eq!(excerpts.len(), 2),
            other => panic!("expected excerpts, got {other:?}"),
        }
    }

    #[test]
    fn higher_scores_rank_first_and_ties_keep_order() {
        let text = "cell one two three cell wall membrane x cell six seven eight";
        let context = retrieve(text, "cell wall membrane", &small_windows(3)).unwrap();
        assert_eq!(
            context,
            RetrievedContext::Excerpts(vec![
                "cell wall membrane x".to_string(),
                "cell one two three".to_string(),
                "cell six seven eight".to_string(),
            ])
        );
    }

    #[test]
    fn render_joins_with_separator() {
        let context = RetrievedContext::Excerpts(vec!["a".into(), "b".into()]);
        assert_eq!(context.render(), "a\n---\nb");
    }

    #[test]
    fn definitions_quote_the_first_two_mentions() {
        let text = "Cells are small. The Mitochondria makes energy. Plants grow. \
                    Each mitochondria has two membranes. Mitochondria divide on their own.";
        assert_eq!(
            define_from_text(text, "mitochondria").as_deref(),
            Some("The Mitochondria makes energy. Each mitochondria has two membranes.")
        );
    }

    #[test]
    fn definitions_need_a_mention_and_enough_text() {
        assert_eq!(define_from_text("Cells are small. Plants grow tall.", "ribosome"), None);
        assert_eq!(define_from_text("atom. atom.", "atom"), None);
        assert_eq!(define_from_text("Atoms are tiny particles of matter.", "  "), None);
    }

    #[test]
    fn definitions_are_capped() {
        let text = format!("Enzymes {}", "speed up reactions ".repeat(40));
        let definition = define_from_text(&text, "enzymes").unwrap();
        assert_eq!(definition.chars().count(), 300);
    }
}
