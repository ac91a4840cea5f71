//! crates/study_assistant_core/src/quality.rs
//!
//! Decides whether extracted document text is readable enough to spend a generation
//! call on. The checks run in a fixed order and stop at the first failure.

use std::fmt;

/// Thresholds used by [`assess_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub min_words: usize,
    /// Minimum share of tokens that contain at least two alphabetic characters.
    pub min_word_ratio: f64,
    pub min_mean_token_len: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_words: 30,
            min_word_ratio: 0.4,
            min_mean_token_len: 2.0,
        }
    }
}

/// Why a document was turned away.
#[derive(Debug, Clone, PartialEq)]
pub enum QualityRejection {
    Empty,
    TooFewWords { count: usize },
    LowQuality { ratio: f64 },
    Fragmented { mean_len: f64 },
}

impl fmt::Display for QualityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str(
                "The document appears to be empty or unreadable. It may be a scanned image without OCR.",
            ),
            Self::TooFewWords { count } => write!(
                f,
                "The document contains too little readable text ({count} words found). The content may be handwritten, a scanned image, or in a language we can't process."
            ),
            Self::LowQuality { .. } => f.write_str(
                "The document has low text quality: most of the content couldn't be read clearly. This may be due to poor handwriting, low scan quality, or image-based content.",
            ),
            Self::Fragmented { .. } => f.write_str(
                "The document content appears to be fragmented or corrupted. Please try a clearer version of the document.",
            ),
        }
    }
}

/// The admit/reject decision for a piece of text.
#[derive(Debug, Clone, PartialEq)]
pub enum QualityVerdict {
    Admit,
    Reject(QualityRejection),
}

impl QualityVerdict {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }

    /// Human-readable reason; `"OK"` for admitted text.
    pub fn reason(&self) -> String {
        match self {
            Self::Admit => "OK".to_string(),
            Self::Reject(rejection) => rejection.to_string(),
        }
    }

    pub fn into_result(self) -> Result<(), QualityRejection> {
        match self {
            Self::Admit => Ok(()),
            Self::Reject(rejection) => Err(rejection),
        }
    }
}

/// Assesses text with the default thresholds.
pub fn assess(text: &str) -> QualityVerdict {
    assess_with(text, &QualityThresholds::default())
}

pub fn assess_with(text: &str, thresholds: &QualityThresholds) -> QualityVerdict {
    if text.trim().is_empty() {
        return QualityVerdict::Reject(QualityRejection::Empty);
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < thresholds.min_words {
        return QualityVerdict::Reject(QualityRejection::TooFewWords {
            count: tokens.len(),
        });
    }

    let real_words = tokens.iter().filter(|token| is_real_word(token)).count();
    let ratio = real_words as f64 / tokens.len() as f64;
    if ratio < thresholds.min_word_ratio {
        return QualityVerdict::Reject(QualityRejection::LowQuality { ratio });
    }

    let total_len: usize = tokens.iter().map(|token| token.chars().count()).sum();
    let mean_len = total_len as f64 / tokens.len() as f64;
    if mean_len < thresholds.min_mean_token_len {
        return QualityVerdict::Reject(QualityRejection::Fragmented { mean_len });
    }

    QualityVerdict::Admit
}

fn is_real_word(token: &str) -> bool {
    token.chars().filter(|c| c.is_alphabetic()).take(2).count() >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    const READABLE: &str = "Photosynthesis is the process by which green plants and some other \
        organisms use sunlight to synthesize foods from carbon dioxide and water. It generally \
        involves the green pigment chlorophyll and generates oxygen as a byproduct of the reaction.";

    #[test]
    fn empty_and_whitespace_are_rejected() {
        assert_eq!(assess(""), QualityVerdict::Reject(QualityRejection::Empty));
        assert_eq!(
            assess("  \n\t  "),
            QualityVerdict::Reject(QualityRejection::Empty)
        );
    }

    #[test]
    fn short_text_reports_observed_word_count() {
        let verdict = assess("only five words right here");
        assert_eq!(
            verdict,
            QualityVerdict::Reject(QualityRejection::TooFewWords { count: 5 })
        );
        assert!(verdict.reason().contains("5 words"));
    }

    #[test]
    fn symbol_soup_is_low_quality() {
        let text = std::iter::repeat("%$# 12 a1 !! ok")
            .take(10)
            .collect::<Vec<_>>()
            .join(" ");
        let verdict = assess(&text);
        assert!(matches!(
            verdict,
            QualityVerdict::Reject(QualityRejection::LowQuality { .. })
        ));
    }

    #[test]
    fn single_character_tokens_are_fragmented() {
        // Passes the ratio check through a handful of real words but keeps mean length low.
        let mut tokens = vec!["ab"; 21];
        tokens.extend(vec!["x"; 30]);
        let verdict = assess(&tokens.join(" "));
        assert!(matches!(
            verdict,
            QualityVerdict::Reject(QualityRejection::Fragmented { .. })
        ));
    }

    #[test]
    fn single_character_words_only_are_rejected() {
        let text = vec!["a"; 40].join(" ");
        assert!(!assess(&text).is_admitted());
    }

    #[test]
    fn readable_prose_is_admitted() {
        let verdict = assess(READABLE);
        assert!(verdict.is_admitted());
        assert_eq!(verdict.reason(), "OK");
    }

    #[test]
    fn assessment_is_deterministic() {
        assert_eq!(assess(READABLE), assess(READABLE));
    }

    #[test]
    fn custom_thresholds_apply() {
        let strict = QualityThresholds {
            min_words: 1000,
            ..QualityThresholds::default()
        };
        assert!(matches!(
            assess_with(READABLE, &strict),
            QualityVerdict::Reject(QualityRejection::TooFewWords { .. })
        ));
    }
}
