//! crates/study_assistant_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP framework; the serde
//! derives only describe how artifacts round-trip through a storage collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Documents and Page Images
//=========================================================================================

/// An uploaded document together with everything generated from it.
///
/// Documents are replaced as a whole record; `version` is bumped by the store on every save.
/// A save carries the version it was loaded at and is refused if the stored record has
/// moved on since. Version 0 marks a fresh upload, which always replaces.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    /// Identity key of the owner. Names are unique within one owner's scope.
    pub owner: String,
    pub name: String,
    /// Raw extracted text.
    pub content: String,
    /// Page images in page order.
    pub images: Vec<PageImage>,
    pub artifacts: Artifacts,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Builds a fresh, never-saved document from extracted content.
    pub fn new(owner: impl Into<String>, name: impl Into<String>, extracted: ExtractedDocument) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            name: name.into(),
            content: extracted.text,
            images: extracted.images,
            artifacts: Artifacts::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The output of the extraction collaborator for one uploaded file.
#[derive(Debug, Clone, Default)]
pub struct ExtractedDocument {
    pub text: String,
    pub images: Vec<PageImage>,
}

/// A single page image captured at upload time. Immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub payload: Vec<u8>,
    pub encoding: ImageEncoding,
    pub width: u32,
    pub height: u32,
    /// 1-based source page number.
    pub page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
}

impl ImageEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Webp => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
            Self::Webp => "image/webp",
        }
    }

    /// Maps a file extension to an encoding, falling back to PNG for anything unknown.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "gif" => Self::Gif,
            "bmp" => Self::Bmp,
            "tif" | "tiff" => Self::Tiff,
            "webp" => Self::Webp,
            _ => Self::Png,
        }
    }
}

//=========================================================================================
// Generated Artifacts
//=========================================================================================

/// Everything generated for a document, replaced field-by-field as whole values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default)]
    pub notes: Option<NotesArtifact>,
    #[serde(default)]
    pub tests: BTreeMap<Difficulty, GeneratedTest>,
    #[serde(default)]
    pub flashcards: Vec<Flashcard>,
    #[serde(default)]
    pub flowchart: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotesArtifact {
    pub text: String,
    pub level: NoteLevel,
}

/// Depth of generated notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoteLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl NoteLevel {
    /// Parses a client-supplied level tag; anything unrecognised becomes `Beginner`.
    pub fn parse_or_default(tag: Option<&str>) -> Self {
        tag.and_then(|t| t.parse().ok()).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl FromStr for NoteLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            _ => Err(()),
        }
    }
}

impl fmt::Display for NoteLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difficulty of a generated multiple-choice test.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    /// Parses a client-supplied difficulty tag; anything unrecognised becomes `Normal`.
    pub fn parse_or_default(tag: Option<&str>) -> Self {
        tag.and_then(|t| t.parse().ok()).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Normal => "normal",
            Self::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "normal" => Ok(Self::Normal),
            "hard" => Ok(Self::Hard),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A multiple-choice question including its answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: u32,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    pub explanation: String,
    pub wrong_explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTest {
    pub difficulty: Difficulty,
    pub questions: Vec<Question>,
}

/// Identifies a stored test: one test per (document, difficulty).
///
/// Rendered as `"{document}_test_{difficulty}"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestId {
    pub document: String,
    pub difficulty: Difficulty,
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_test_{}", self.document, self.difficulty)
    }
}

impl FromStr for TestId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (document, difficulty) = s.rsplit_once("_test_").ok_or(())?;
        if document.is_empty() {
            return Err(());
        }
        Ok(Self {
            document: document.to_string(),
            difficulty: difficulty.parse()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub term: String,
    pub definition: String,
}

//=========================================================================================
// Conversation and Test History
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a conversation sent to the generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A completed test as reported by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    #[serde(default)]
    pub pdf_name: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub total_questions: u32,
}

//=========================================================================================
// Chunks
//=========================================================================================

/// A request-scoped slice of a document's text. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the uncapped split of the document.
    pub index: usize,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_renders_and_parses() {
        let id = TestId {
            document: "bio_test_notes.pdf".to_string(),
            difficulty: Difficulty::Hard,
        };
        let rendered = id.to_string();
        assert_eq!(rendered, "bio_test_notes.pdf_test_hard");
        assert_eq!(rendered.parse::<TestId>(), Ok(id));
    }

    #[test]
    fn test_id_rejects_garbage() {
        assert!("no-separator".parse::<TestId>().is_err());
        assert!("doc_test_extreme".parse::<TestId>().is_err());
        assert!("_test_easy".parse::<TestId>().is_err());
    }

    #[test]
    fn unknown_tags_fall_back_to_defaults() {
        assert_eq!(NoteLevel::parse_or_default(Some("expert")), NoteLevel::Beginner);
        assert_eq!(NoteLevel::parse_or_default(Some("ADVANCED")), NoteLevel::Advanced);
        assert_eq!(Difficulty::parse_or_default(None), Difficulty::Normal);
        assert_eq!(Difficulty::parse_or_default(Some("easy")), Difficulty::Easy);
    }

    #[test]
    fn test_record_reads_client_field_names() {
        let record: TestRecord = serde_json::from_str(
            r#"{"pdfName":"cells.pdf","difficulty":"hard","percentage":80.0,"score":24,"totalQuestions":30}"#,
        )
        .unwrap();
        assert_eq!(record.pdf_name.as_deref(), Some("cells.pdf"));
        assert_eq!(record.total_questions, 30);
    }
}
