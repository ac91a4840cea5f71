//! crates/study_assistant_core/src/output.rs
//!
//! Validation of structured replies from the language model. Anything that does not
//! have the requested shape becomes [`StudyError::MalformedOutput`], which callers
//! can tell apart from a failed call.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::{Flashcard, Question};
use crate::error::{StudyError, StudyResult};

/// Fewest questions or flashcards accepted from one reply.
pub const MIN_ITEMS: usize = 5;

/// Removes a surrounding Markdown code fence, preferring a ```json block when present.
pub fn strip_code_fences(raw: &str) -> &str {
    let text = raw.trim();
    if let Some((_, rest)) = text.split_once("```json") {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    let mut parts = text.split("```");
    match (parts.next(), parts.next()) {
        (Some(_), Some(inner)) => inner.trim(),
        _ => text,
    }
}

#[derive(Deserialize)]
struct RawQuestion {
    id: u32,
    question: String,
    options: Vec<String>,
    correct_answer_index: usize,
    explanation: String,
    #[serde(default)]
    wrong_explanation: Option<String>,
}

/// Parses a generated test.
///
/// A `{"error": "unreadable"}` object means the model could not understand the source
/// and maps to [`StudyError::Unreadable`].
pub fn parse_questions(raw: &str) -> StudyResult<Vec<Question>> {
    let value: Value = serde_json::from_str(strip_code_fences(raw)).map_err(|_| {
        StudyError::MalformedOutput("The generator returned an invalid format. Please try again.".to_string())
    })?;

    if value.get("error").and_then(Value::as_str) == Some("unreadable") {
        return Err(StudyError::Unreadable);
    }

    let items = value.as_array().ok_or_else(|| {
        StudyError::MalformedOutput("Too few questions generated (invalid format). Please try again.".to_string())
    })?;
    if items.len() < MIN_ITEMS {
        return Err(StudyError::MalformedOutput(format!(
            "Too few questions generated ({}). Please try again.",
            items.len()
        )));
    }

    items
        .iter()
        .map(|item| {
            let raw: RawQuestion = serde_json::from_value(item.clone()).map_err(|_| {
                StudyError::MalformedOutput("Question missing required fields".to_string())
            })?;
            if raw.correct_answer_index >= raw.options.len() {
                return Err(StudyError::MalformedOutput(format!(
                    "Question {} has no option at its correct answer index",
                    raw.id
                )));
            }
            let wrong_explanation = raw
                .wrong_explanation
                .unwrap_or_else(|| raw.explanation.clone());
            Ok(Question {
                id: raw.id,
                question: raw.question,
                options: raw.options,
                correct_answer_index: raw.correct_answer_index,
                explanation: raw.explanation,
                wrong_explanation,
            })
        })
        .collect()
}

/// Parses generated flashcards, dropping entries without both a term and a definition.
pub fn parse_flashcards(raw: &str) -> StudyResult<Vec<Flashcard>> {
    let value: Value = serde_json::from_str(strip_code_fences(raw)).map_err(|e| {
        StudyError::MalformedOutput(format!("Flashcard output was not valid JSON: {e}"))
    })?;

    let items = match value.as_array() {
        Some(items) if items.len() >= MIN_ITEMS => items,
        _ => {
            return Err(StudyError::MalformedOutput(
                "Could not generate enough flashcards. Please try again.".to_string(),
            ))
        }
    };

    let cards: Vec<Flashcard> = items
        .iter()
        .filter_map(|item| serde_json::from_value::<Flashcard>(item.clone()).ok())
        .collect();
    if cards.len() < MIN_ITEMS {
        return Err(StudyError::MalformedOutput(
            "Could not generate valid flashcards. Please try again.".to_string(),
        ));
    }
    Ok(cards)
}

/// Strips fences and the `mermaid` language tag, and removes double quotes that
/// would break node labels.
pub fn sanitize_mermaid(raw: &str) -> String {
    static QUOTED_LABEL: OnceLock<Regex> = OnceLock::new();

    let mut code = raw.trim();
    if code.starts_with("```") {
        code = code.split("```").nth(1).unwrap_or("");
        code = code
            .strip_prefix("mermaid\n")
            .or_else(|| code.strip_prefix("mermaid"))
            .unwrap_or(code);
        code = code.trim();
    }

    let quoted_label = QUOTED_LABEL.get_or_init(|| {
        Regex::new(r#"\[([^\[\]]*)"([^\[\]]*)"([^\[\]]*)\]"#).expect("quoted-label pattern is valid")
    });
    quoted_label
        .replace_all(code, "[$1$2$3]")
        .replace('"', "'")
}
