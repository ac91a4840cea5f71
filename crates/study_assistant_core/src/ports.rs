//! crates/study_assistant_core/src/ports.rs
//!
//! Defines the service contracts (traits) the pipeline depends on.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to stay independent of the language-model vendor, the database and the PDF toolkit.

use async_trait::async_trait;
use chrono::{Local, NaiveDate};

use crate::domain::{ChatTurn, Document, ExtractedDocument, PageImage, TestRecord};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A write was based on a version that is no longer current.
    #[error("Conflicting update: {0}")]
    Conflict(String),
    /// The collaborator answered, but not in the shape that was asked for.
    #[error("Malformed response: {0}")]
    MalformedOutput(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Generation
//=========================================================================================

/// A single prompt for the language-model collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub turns: Vec<ChatTurn>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Overrides the adapter's configured model when set.
    pub model: Option<String>,
}

impl GenerationRequest {
    /// A one-shot request with a single user turn.
    pub fn prompt(content: impl Into<String>) -> Self {
        Self {
            system: None,
            turns: vec![ChatTurn::user(content)],
            temperature: 0.7,
            max_tokens: 1000,
            model: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// The text of the final user turn, if any.
    pub fn last_user_content(&self) -> Option<&str> {
        self.turns.last().map(|turn| turn.content.as_str())
    }
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Sends a prompt to the language model and returns its text reply.
    async fn generate(&self, request: &GenerationRequest) -> PortResult<String>;
}

//=========================================================================================
// Storage
//=========================================================================================

#[async_trait]
pub trait DocumentStore: Send + Sync {
    // --- Documents ---

    /// Replaces the whole record for `(owner, name)` and returns the stored version.
    ///
    /// A document with `version == 0` is a fresh upload and replaces any existing record,
    /// page images included. Otherwise the stored version must still equal
    /// `document.version`, or the save fails with `PortError::Conflict` and nothing is written.
    async fn save_document(&self, document: &Document) -> PortResult<u64>;

    async fn get_document(&self, owner: &str, name: &str) -> PortResult<Document>;

    async fn list_documents(&self, owner: &str) -> PortResult<Vec<String>>;

    async fn get_page_image(&self, owner: &str, name: &str, index: usize) -> PortResult<PageImage>;

    // --- Test History ---

    /// Prepends a record to the user's history.
    async fn append_test_record(&self, username: &str, record: &TestRecord) -> PortResult<()>;

    /// Returns the user's history, newest first.
    async fn test_history(&self, username: &str) -> PortResult<Vec<TestRecord>>;
}

/// A counter keyed by a composite string.
///
/// Implementations must make `increment_below` a single atomic step, so that concurrent
/// callers (in one process or many) can never push a counter past its cap.
#[async_trait]
pub trait UsageCounter: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<u64>;

    /// Increments the counter and returns the new value.
    async fn increment(&self, key: &str) -> PortResult<u64>;

    /// Increments the counter only while it is below `cap`. Returns the new value, or
    /// `None` when the counter was already at the cap and was left untouched.
    async fn increment_below(&self, key: &str, cap: u64) -> PortResult<Option<u64>>;
}

//=========================================================================================
// Extraction and Time
//=========================================================================================

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Pulls text and page images out of an uploaded file.
    async fn extract(&self, bytes: &[u8], file_name: &str) -> PortResult<ExtractedDocument>;
}

/// Supplies the current calendar day for quota keys.
pub trait Calendar: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// The server's local calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCalendar;

impl Calendar for SystemCalendar {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
