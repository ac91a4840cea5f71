//! crates/study_assistant_core/src/service.rs
//!
//! The study pipeline. `StudyService` owns the collaborator ports and runs every
//! user-facing operation: the quota gate first, then validation and lookups, then the
//! quality gate, and only then any generation call.
//!
//! Each request runs sequentially. Multi-chunk notes issue one generation call per chunk
//! in document order and stop at the first failure; nothing is persisted for a run that
//! did not complete.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::chunking::{cap_chunks, split_into_chunks, ChunkingError};
use crate::domain::{
    ChatTurn, Difficulty, Document, Flashcard, GeneratedTest, NoteLevel, NotesArtifact, PageImage,
    Question, TestId, TestRecord,
};
use crate::entitlement::{Admission, Caller, EntitlementLedger, Feature, TierFlags};
use crate::error::{StudyError, StudyResult};
use crate::images::{image_markers, images_for_chunk};
use crate::output::{parse_flashcards, parse_questions, sanitize_mermaid};
use crate::ports::{DocumentExtractor, DocumentStore, GenerationRequest, TextGenerationService};
use crate::prompts::{self, NotesSection, TutorContext};
use crate::quality::{assess_with, QualityThresholds};
use crate::retrieval::{define_from_text, retrieve, RetrievalSettings};

//=========================================================================================
// Settings
//=========================================================================================

/// Tunables for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Characters per notes chunk.
    pub chunk_size: usize,
    /// Most generation calls one notes run may make.
    pub max_chunks: usize,
    pub retrieval: RetrievalSettings,
    pub quality: QualityThresholds,
    pub test_content_chars: usize,
    pub flashcard_content_chars: usize,
    pub flowchart_content_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 4000,
            max_chunks: 15,
            retrieval: RetrievalSettings::default(),
            quality: QualityThresholds::default(),
            test_content_chars: 4000,
            flashcard_content_chars: 6000,
            flowchart_content_chars: 6000,
        }
    }
}

//=========================================================================================
// Operation Outputs
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub document: String,
    pub image_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotesOutcome {
    pub document: String,
    pub notes: String,
    pub level: NoteLevel,
    /// Number of chunks the notes were generated from.
    pub sections: usize,
}

/// A question as shown to the student: no answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    pub id: u32,
    pub question: String,
    pub options: Vec<String>,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question: q.question.clone(),
            options: q.options.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestOutcome {
    pub test_id: String,
    pub difficulty: Difficulty,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerCheck {
    pub is_correct: bool,
    pub your_answer: String,
    pub correct_answer: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowchartOutcome {
    pub mermaid_code: String,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    /// False when no excerpt matched and a prefix of the document was used instead.
    pub grounded_in_excerpts: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageImageInfo {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub page: u32,
    pub encoding: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureUsage {
    pub feature: String,
    #[serde(flatten)]
    pub admission: Admission,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub tier: String,
    pub flags: TierFlags,
    pub features: Vec<FeatureUsage>,
}

/// Input for the conversational tutor.
#[derive(Debug, Clone, Default)]
pub struct TutorRequest {
    pub message: String,
    /// Loads this user's test history as background.
    pub username: Option<String>,
    /// A flowchart topic the user is looking at.
    pub topic: Option<String>,
    pub history: Vec<ChatTurn>,
    pub model: Option<String>,
}

/// Where a term definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionSource {
    /// Quoted from the document's own sentences.
    Document,
    /// Written by the language model.
    Generated,
    /// Generation failed; the definition is the fixed substitute text.
    Unavailable,
}

impl DefinitionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Generated => "generated",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub term: String,
    pub definition: String,
    pub source: DefinitionSource,
}

/// Input for a term lookup. `document` names a stored document; `content` is text the
/// client already has. A named document wins when both are given.
#[derive(Debug, Clone, Default)]
pub struct DefinitionRequest {
    pub term: String,
    pub context: Option<String>,
    pub document: Option<String>,
    pub content: Option<String>,
}

/// The definition returned when the language model cannot supply one.
pub fn unavailable_definition(term: &str) -> String {
    format!("Definition of {term} not available")
}

/// Input for the flowchart operations.
#[derive(Debug, Clone, Default)]
pub struct FlowchartRequest {
    pub document: Option<String>,
    pub subject: Option<String>,
    pub model: Option<String>,
}

//=========================================================================================
// The Service
//=========================================================================================

pub struct StudyService {
    store: Arc<dyn DocumentStore>,
    generator: Arc<dyn TextGenerationService>,
    extractor: Arc<dyn DocumentExtractor>,
    ledger: EntitlementLedger,
    settings: PipelineSettings,
}

impl StudyService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerationService>,
        extractor: Arc<dyn DocumentExtractor>,
        ledger: EntitlementLedger,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            generator,
            extractor,
            ledger,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    // --- Admission ---

    /// Consumes one unit of `feature` or fails with `QuotaExceeded`.
    async fn admit(&self, caller: &Caller, feature: Feature) -> StudyResult<()> {
        let admission = self
            .ledger
            .admit(caller, feature)
            .await
            .map_err(StudyError::from_storage)?;
        if admission.allowed {
            Ok(())
        } else {
            Err(StudyError::QuotaExceeded {
                feature,
                tier: caller.tier,
                limit: admission.limit,
            })
        }
    }

    /// Today's standing for every gated feature. Does not consume anything.
    pub async fn usage(&self, caller: &Caller) -> StudyResult<UsageReport> {
        let mut features = Vec::with_capacity(Feature::ALL.len());
        for feature in Feature::ALL {
            let admission = self
                .ledger
                .check(caller, feature)
                .await
                .map_err(StudyError::from_storage)?;
            features.push(FeatureUsage {
                feature: feature.as_str().to_string(),
                admission,
            });
        }
        Ok(UsageReport {
            tier: caller.tier.as_str().to_string(),
            flags: self.ledger.limits().flags(caller.tier),
            features,
        })
    }

    /// Today's standing for a feature given by name. Unknown names report a limit of zero.
    pub async fn usage_for(&self, caller: &Caller, feature: &str) -> StudyResult<FeatureUsage> {
        let admission = self
            .ledger
            .check_by_name(caller, feature)
            .await
            .map_err(StudyError::from_storage)?;
        Ok(FeatureUsage {
            feature: feature.to_string(),
            admission,
        })
    }

    // --- Documents ---

    pub async fn ingest_document(
        &self,
        caller: &Caller,
        display_name: Option<&str>,
        file_name: &str,
        bytes: &[u8],
    ) -> StudyResult<IngestOutcome> {
        if bytes.is_empty() || file_name.trim().is_empty() {
            return Err(StudyError::Validation("No file selected".to_string()));
        }
        let name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(file_name)
            .to_string();

        let extracted = self
            .extractor
            .extract(bytes, file_name)
            .await
            .map_err(|e| StudyError::Validation(format!("Could not read the uploaded file: {e}")))?;
        let document = Document::new(caller.identity.key(), name.clone(), extracted);
        let image_count = document.images.len();

        self.store
            .save_document(&document)
            .await
            .map_err(StudyError::from_storage)?;
        info!(document = %name, image_count, chars = document.content.len(), "Document ingested");

        Ok(IngestOutcome {
            document: name,
            image_count,
        })
    }

    pub async fn list_documents(&self, caller: &Caller) -> StudyResult<Vec<String>> {
        self.store
            .list_documents(&caller.identity.key())
            .await
            .map_err(StudyError::from_storage)
    }

    pub async fn page_images(&self, caller: &Caller, name: &str) -> StudyResult<Vec<PageImageInfo>> {
        let document = self.load(caller, name).await?;
        Ok(document
            .images
            .iter()
            .enumerate()
            .map(|(index, image)| PageImageInfo {
                index,
                width: image.width,
                height: image.height,
                page: image.page,
                encoding: image.encoding.as_str(),
            })
            .collect())
    }

    pub async fn page_image(&self, caller: &Caller, name: &str, index: usize) -> StudyResult<PageImage> {
        self.store
            .get_page_image(&caller.identity.key(), name, index)
            .await
            .map_err(StudyError::from_storage)
    }

    // --- Notes ---

    pub async fn generate_notes(
        &self,
        caller: &Caller,
        name: &str,
        level: NoteLevel,
    ) -> StudyResult<NotesOutcome> {
        self.admit(caller, Feature::NoteGenerations).await?;
        let mut document = self.load(caller, require(name, "document name")?).await?;

        let (notes, sections) = self.run_notes(&document, level, None).await?;
        document.artifacts.notes = Some(NotesArtifact {
            text: notes.clone(),
            level,
        });
        self.save(&document).await?;

        Ok(NotesOutcome {
            document: document.name,
            notes,
            level,
            sections,
        })
    }

    pub async fn regenerate_notes(
        &self,
        caller: &Caller,
        name: &str,
        level: NoteLevel,
        previous_notes: &str,
    ) -> StudyResult<NotesOutcome> {
        self.admit(caller, Feature::NoteRegenerations).await?;
        let mut document = self.load(caller, require(name, "document name")?).await?;

        let (notes, sections) = self
            .run_notes(&document, level, Some(previous_notes))
            .await?;
        document.artifacts.notes = Some(NotesArtifact {
            text: notes.clone(),
            level,
        });
        self.save(&document).await?;

        Ok(NotesOutcome {
            document: document.name,
            notes,
            level,
            sections,
        })
    }

    /// Quality-gates the document, samples its chunks and generates one section per chunk.
    async fn run_notes(
        &self,
        document: &Document,
        level: NoteLevel,
        previous_notes: Option<&str>,
    ) -> StudyResult<(String, usize)> {
        self.check_quality(document)?;

        let chunks = split_into_chunks(&document.content, self.settings.chunk_size)
            .map_err(chunking_error)?;
        let source_chunks = chunks.len();
        let chunks = cap_chunks(chunks, self.settings.max_chunks);
        let total = chunks.len();
        let total_images = document.images.len();
        info!(
            document = %document.name,
            chars = document.content.chars().count(),
            source_chunks,
            sections = total,
            total_images,
            "Generating notes"
        );

        let mut sections = Vec::with_capacity(total);
        for (position, chunk) in chunks.iter().enumerate() {
            let markers = image_markers(images_for_chunk(position, total, total_images));
            let section = NotesSection {
                level,
                position,
                total,
                text: &chunk.text,
                image_markers: &markers,
            };
            let request = match previous_notes {
                Some(previous) => prompts::notes_section_regeneration(section, previous),
                None => prompts::notes_section(section),
            };
            let text = self.call(&request).await?;
            info!(section = position + 1, total, "Notes section done");
            sections.push(text);
        }

        Ok((sections.join("\n\n"), total))
    }

    // --- Tests ---

    pub async fn generate_test(
        &self,
        caller: &Caller,
        name: &str,
        difficulty: Difficulty,
    ) -> StudyResult<TestOutcome> {
        self.admit(caller, Feature::Tests).await?;
        let mut document = self.load(caller, require(name, "document name")?).await?;
        self.check_quality(&document)?;

        let content = prefix(&document.content, self.settings.test_content_chars);
        let raw = self.call(&prompts::test_questions(&content, difficulty)).await?;
        let questions = parse_questions(&raw).inspect_err(|e| {
            warn!(document = %document.name, kind = e.kind(), "Rejected generated test");
        })?;

        let views = questions.iter().map(QuestionView::from).collect();
        document.artifacts.tests.insert(
            difficulty,
            GeneratedTest {
                difficulty,
                questions,
            },
        );
        self.save(&document).await?;

        let test_id = TestId {
            document: document.name,
            difficulty,
        };
        Ok(TestOutcome {
            test_id: test_id.to_string(),
            difficulty,
            questions: views,
        })
    }

    pub async fn check_answer(
        &self,
        caller: &Caller,
        test_id: &TestId,
        question_id: u32,
        selected_index: usize,
    ) -> StudyResult<AnswerCheck> {
        let document = self.load(caller, &test_id.document).await?;
        let test = document
            .artifacts
            .tests
            .get(&test_id.difficulty)
            .ok_or_else(|| StudyError::NotFound("Test not found".to_string()))?;
        let question = test
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| StudyError::NotFound("Question not found".to_string()))?;

        let your_answer = question
            .options
            .get(selected_index)
            .cloned()
            .ok_or_else(|| StudyError::Validation("Selected answer index is out of range".to_string()))?;
        let correct_answer = question
            .options
            .get(question.correct_answer_index)
            .cloned()
            .ok_or_else(|| StudyError::Storage("Stored question has no correct option".to_string()))?;
        let is_correct = selected_index == question.correct_answer_index;

        let explanation = if is_correct {
            question.explanation.clone()
        } else if question.wrong_explanation.to_lowercase().starts_with("your answer") {
            question.wrong_explanation.clone()
        } else {
            format!(
                "Your answer '{}' is incorrect. {}",
                your_answer, question.wrong_explanation
            )
        };

        Ok(AnswerCheck {
            is_correct,
            your_answer,
            correct_answer,
            explanation,
        })
    }

    pub async fn regenerate_explanation(
        &self,
        caller: &Caller,
        question: &str,
        student_answer: &str,
        correct_answer: &str,
    ) -> StudyResult<String> {
        self.admit(caller, Feature::Tests).await?;
        if [question, student_answer, correct_answer]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(StudyError::Validation("Missing required fields".to_string()));
        }

        let explanation = self
            .call(&prompts::simpler_explanation(question, student_answer, correct_answer))
            .await?;
        let explanation = explanation.trim();
        if explanation.is_empty() {
            return Err(StudyError::MalformedOutput(
                "Empty explanation received".to_string(),
            ));
        }
        Ok(explanation.to_string())
    }

    // --- Flashcards and Flowcharts ---

    pub async fn generate_flashcards(&self, caller: &Caller, name: &str) -> StudyResult<Vec<Flashcard>> {
        self.admit(caller, Feature::Flashcards).await?;
        let mut document = self.load(caller, require(name, "document name")?).await?;
        self.check_quality(&document)?;

        let content = prefix(&document.content, self.settings.flashcard_content_chars);
        let raw = self.call(&prompts::flashcards(&content)).await?;
        let cards = parse_flashcards(&raw)?;

        document.artifacts.flashcards = cards.clone();
        self.save(&document).await?;
        Ok(cards)
    }

    pub async fn generate_flowchart(
        &self,
        caller: &Caller,
        request: FlowchartRequest,
    ) -> StudyResult<FlowchartOutcome> {
        self.admit(caller, Feature::Flowcharts).await?;
        self.run_flowchart(caller, request, false).await
    }

    pub async fn regenerate_flowchart(
        &self,
        caller: &Caller,
        request: FlowchartRequest,
    ) -> StudyResult<FlowchartOutcome> {
        self.admit(caller, Feature::FlowchartRegenerations).await?;
        self.run_flowchart(caller, request, true).await
    }

    async fn run_flowchart(
        &self,
        caller: &Caller,
        request: FlowchartRequest,
        fresh_layout: bool,
    ) -> StudyResult<FlowchartOutcome> {
        let document_name = request.document.filter(|n| !n.trim().is_empty());
        let subject = request.subject.filter(|s| !s.trim().is_empty());
        if document_name.is_none() && subject.is_none() {
            return Err(StudyError::Validation(
                "Either a document name or a subject is required".to_string(),
            ));
        }

        let document = match &document_name {
            Some(name) => match self.load(caller, name).await {
                Ok(document) => Some(document),
                Err(StudyError::NotFound(_)) if subject.is_some() => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        let content = match (&document, &subject) {
            (Some(document), _) => {
                self.check_quality(document)?;
                format!(
                    "Document content (full chapter):\n{}",
                    prefix(&document.content, self.settings.flowchart_content_chars)
                )
            }
            (None, Some(subject)) => format!("Topic: {subject}"),
            (None, None) => return Err(StudyError::NotFound("Document not found".to_string())),
        };

        let raw = self
            .call(&prompts::flowchart(&content, fresh_layout).with_model(request.model))
            .await?;
        let mermaid_code = sanitize_mermaid(&raw);

        if let Some(mut document) = document {
            document.artifacts.flowchart = Some(mermaid_code.clone());
            self.save(&document).await?;
        }

        Ok(FlowchartOutcome {
            mermaid_code,
            subject: subject.or(document_name).unwrap_or_default(),
        })
    }

    // --- Conversation ---

    /// Answers a question from the most relevant excerpts of a document. Not gated.
    pub async fn chat_with_document(
        &self,
        caller: &Caller,
        name: &str,
        question: &str,
        model: Option<String>,
    ) -> StudyResult<ChatAnswer> {
        let name = require(name, "document name")?;
        let question = require(question, "question")?;
        let document = self.load(caller, name).await?;

        let context = retrieve(&document.content, question, &self.settings.retrieval)
            .map_err(chunking_error)?;
        let request = prompts::document_chat(&context.render(), question).with_model(model);
        let answer = self.call(&request).await?;

        Ok(ChatAnswer {
            answer,
            grounded_in_excerpts: !context.is_fallback(),
        })
    }

    pub async fn tutor(&self, caller: &Caller, request: TutorRequest) -> StudyResult<String> {
        self.admit(caller, Feature::AviatorMessages).await?;
        let message = require(&request.message, "question or message")?;

        let username = request.username.as_deref().filter(|u| !u.trim().is_empty());
        let records = match username {
            Some(username) => self
                .store
                .test_history(username)
                .await
                .map_err(StudyError::from_storage)?,
            None => Vec::new(),
        };
        let context = match (username, request.topic.as_deref()) {
            (Some(_), _) => TutorContext::LearningHistory(&records),
            (None, Some(topic)) if !topic.trim().is_empty() => TutorContext::FlowchartTopic(topic),
            _ => TutorContext::General,
        };

        let prompt = prompts::tutor(context, &request.history, message).with_model(request.model);
        self.call(&prompt).await
    }

    /// Defines a term, preferring the document's own wording. Not gated.
    ///
    /// Falls back to the language model, and when that fails answers with
    /// [`unavailable_definition`] instead of an error.
    pub async fn define_term(&self, caller: &Caller, request: DefinitionRequest) -> StudyResult<Definition> {
        let term = require(&request.term, "term")?.to_string();

        let document_text = match request.document.as_deref().filter(|n| !n.trim().is_empty()) {
            Some(name) => Some(self.load(caller, name.trim()).await?.content),
            None => request.content,
        };
        if let Some(definition) = document_text
            .as_deref()
            .and_then(|text| define_from_text(text, &term))
        {
            return Ok(Definition {
                term,
                definition,
                source: DefinitionSource::Document,
            });
        }

        let context = request.context.unwrap_or_default();
        let generated = self.call(&prompts::term_definition(&term, &context)).await;
        let (definition, source) = match generated {
            Ok(text) if !text.trim().is_empty() => (text.trim().to_string(), DefinitionSource::Generated),
            Ok(_) | Err(_) => {
                warn!(%term, "No definition generated; using the substitute");
                (unavailable_definition(&term), DefinitionSource::Unavailable)
            }
        };
        Ok(Definition {
            term,
            definition,
            source,
        })
    }

    // --- Test History ---

    pub async fn save_test_record(&self, username: &str, record: &TestRecord) -> StudyResult<()> {
        let username = require(username, "username")?;
        self.store
            .append_test_record(username, record)
            .await
            .map_err(StudyError::from_storage)
    }

    pub async fn test_history(&self, username: &str) -> StudyResult<Vec<TestRecord>> {
        let username = require(username, "username")?;
        self.store
            .test_history(username)
            .await
            .map_err(StudyError::from_storage)
    }

    // --- Helpers ---

    async fn load(&self, caller: &Caller, name: &str) -> StudyResult<Document> {
        self.store
            .get_document(&caller.identity.key(), name)
            .await
            .map_err(|e| match StudyError::from_storage(e) {
                StudyError::NotFound(_) => StudyError::NotFound(format!("Document '{name}' not found")),
                other => other,
            })
    }

    async fn save(&self, document: &Document) -> StudyResult<()> {
        let version = self
            .store
            .save_document(document)
            .await
            .map_err(StudyError::from_storage)?;
        info!(document = %document.name, version, "Document saved");
        Ok(())
    }

    fn check_quality(&self, document: &Document) -> StudyResult<()> {
        assess_with(&document.content, &self.settings.quality)
            .into_result()
            .map_err(|rejection| {
                warn!(document = %document.name, reason = %rejection, "Quality gate rejected document");
                StudyError::Quality(rejection)
            })
    }

    async fn call(&self, request: &GenerationRequest) -> StudyResult<String> {
        self.generator.generate(request).await.map_err(|e| {
            error!(error = %e, "Generation call failed");
            StudyError::from_generation(e)
        })
    }
}

fn require<'a>(value: &'a str, field: &str) -> StudyResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(StudyError::Validation(format!("Missing {field}")))
    } else {
        Ok(trimmed)
    }
}

fn prefix(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

fn chunking_error(error: ChunkingError) -> StudyError {
    StudyError::Validation(format!("Invalid pipeline settings: {error}"))
}
