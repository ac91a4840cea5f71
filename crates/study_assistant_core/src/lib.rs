//! Core of the study assistant: document quality checks, chunking, quota
//! enforcement and the generation pipeline, behind ports that the service
//! layer implements.

pub mod chunking;
pub mod domain;
pub mod entitlement;
pub mod error;
pub mod images;
pub mod output;
pub mod ports;
pub mod prompts;
pub mod quality;
pub mod retrieval;
pub mod service;

pub use domain::{
    Artifacts, ChatRole, ChatTurn, Difficulty, Document, ExtractedDocument, Flashcard,
    GeneratedTest, ImageEncoding, NoteLevel, NotesArtifact, PageImage, Question, TestId,
    TestRecord,
};
pub use entitlement::{Admission, Caller, EntitlementLedger, Feature, Identity, Limit, Tier, TierFlags, TierLimits};
pub use error::{StudyError, StudyResult};
pub use ports::{
    Calendar, DocumentExtractor, DocumentStore, GenerationRequest, PortError, PortResult,
    SystemCalendar, TextGenerationService, UsageCounter,
};
pub use quality::{QualityRejection, QualityThresholds, QualityVerdict};
pub use retrieval::RetrievalSettings;
pub use service::{PipelineSettings, StudyService};
