//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Handlers only translate between JSON and the study pipeline; quota checks,
//! quality checks and persistence all happen inside `StudyService`.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use study_assistant_core::{
    service::{DefinitionRequest, FlowchartRequest, TutorRequest},
    Caller, ChatRole, ChatTurn, Difficulty, Limit, NoteLevel, StudyError, TestId, TestRecord,
};
use tracing::info;
use utoipa::{OpenApi, ToSchema};

use crate::error::{ErrorBody, HttpError};
use crate::web::{middleware::attach_caller, state::AppState};

type HttpResult<T> = Result<Json<T>, HttpError>;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        upload_document_handler,
        list_documents_handler,
        list_images_handler,
        get_image_handler,
        generate_notes_handler,
        regenerate_notes_handler,
        generate_test_handler,
        check_answer_handler,
        regenerate_explanation_handler,
        generate_flashcards_handler,
        generate_flowchart_handler,
        regenerate_flowchart_handler,
        chat_handler,
        tutor_handler,
        fetch_definition_handler,
        save_test_history_handler,
        get_test_history_handler,
        usage_handler,
        feature_usage_handler,
    ),
    components(
        schemas(
            ErrorBody, HealthResponse, UploadResponse, DocumentListResponse, ImageInfo,
            ImageListResponse, NotesRequest, RegenerateNotesRequest, NotesResponse,
            TestRequest, QuestionDto, TestResponse, CheckAnswerRequest, CheckAnswerResponse,
            ExplanationRequest, ExplanationResponse, DocumentRequest, FlashcardDto,
            FlashcardsResponse, FlowchartBody, FlowchartResponse, ChatRequest, ChatResponse,
            TurnDto, TutorBody, TutorResponse, DefinitionBody, DefinitionResponse, TestRecordDto, SaveHistoryRequest,
            HistoryResponse, TierFlagsDto, FeatureUsageDto, UsageResponse,
        )
    ),
    tags(
        (name = "Study Assistant API", description = "Document ingestion and quota-gated study material generation.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Router
//=========================================================================================

/// Builds every `/api` route with caller resolution and the upload size limit applied.
pub fn router(state: Arc<AppState>) -> Router {
    let max_upload = state.config.max_upload_bytes;
    Router::new()
        .route("/api/health", get(health_handler))
        .route(
            "/api/documents",
            post(upload_document_handler).get(list_documents_handler),
        )
        .route("/api/documents/{name}/images", get(list_images_handler))
        .route("/api/documents/{name}/images/{index}", get(get_image_handler))
        .route("/api/generate-notes", post(generate_notes_handler))
        .route("/api/regenerate-notes", post(regenerate_notes_handler))
        .route("/api/generate-test", post(generate_test_handler))
        .route("/api/check-answer", post(check_answer_handler))
        .route("/api/regenerate-explanation", post(regenerate_explanation_handler))
        .route("/api/generate-flashcards", post(generate_flashcards_handler))
        .route("/api/generate-flowchart", post(generate_flowchart_handler))
        .route("/api/regenerate-flowchart", post(regenerate_flowchart_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/aviator-chat", post(tutor_handler))
        .route("/api/fetch-definition", post(fetch_definition_handler))
        .route("/api/test-history", post(save_test_history_handler))
        .route("/api/test-history/{username}", get(get_test_history_handler))
        .route("/api/usage", get(usage_handler))
        .route("/api/usage/{feature}", get(feature_usage_handler))
        .layer(axum_middleware::from_fn(attach_caller))
        .layer(DefaultBodyLimit::max(max_upload))
        .with_state(state)
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub generation_configured: bool,
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub pdf_name: String,
    pub image_count: usize,
}

#[derive(Serialize, ToSchema)]
pub struct DocumentListResponse {
    pub pdfs: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ImageInfo {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub page: u32,
    pub encoding: String,
}

#[derive(Serialize, ToSchema)]
pub struct ImageListResponse {
    pub pdf_name: String,
    pub count: usize,
    pub images: Vec<ImageInfo>,
}

#[derive(Deserialize, ToSchema)]
pub struct NotesRequest {
    #[serde(default)]
    pub pdf_name: String,
    /// beginner, intermediate or advanced. Anything else means beginner.
    pub level: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RegenerateNotesRequest {
    #[serde(default)]
    pub pdf_name: String,
    pub level: Option<String>,
    #[serde(default)]
    pub previous_notes: String,
}

#[derive(Serialize, ToSchema)]
pub struct NotesResponse {
    pub notes: String,
    pub level: String,
    pub pdf_name: String,
    pub sections: usize,
}

#[derive(Deserialize, ToSchema)]
pub struct TestRequest {
    #[serde(default)]
    pub pdf_name: String,
    /// easy, normal or hard. Anything else means normal.
    pub difficulty: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct QuestionDto {
    pub id: u32,
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct TestResponse {
    pub test_id: String,
    pub difficulty: String,
    pub total_questions: usize,
    pub questions: Vec<QuestionDto>,
}

/// Names the test either by `test_id` or by `pdf_name` plus `difficulty`.
#[derive(Deserialize, ToSchema)]
pub struct CheckAnswerRequest {
    pub test_id: Option<String>,
    pub pdf_name: Option<String>,
    pub difficulty: Option<String>,
    pub question_id: u32,
    pub selected_answer_index: usize,
}

#[derive(Serialize, ToSchema)]
pub struct CheckAnswerResponse {
    pub is_correct: bool,
    pub your_answer: String,
    pub correct_answer: String,
    pub explanation: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ExplanationRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub student_answer: String,
    #[serde(default)]
    pub correct_answer: String,
}

#[derive(Serialize, ToSchema)]
pub struct ExplanationResponse {
    pub explanation: String,
}

#[derive(Deserialize, ToSchema)]
pub struct DocumentRequest {
    #[serde(default)]
    pub pdf_name: String,
}

#[derive(Serialize, ToSchema)]
pub struct FlashcardDto {
    pub term: String,
    pub definition: String,
}

#[derive(Serialize, ToSchema)]
pub struct FlashcardsResponse {
    pub count: usize,
    pub flashcards: Vec<FlashcardDto>,
}

#[derive(Deserialize, ToSchema)]
pub struct FlowchartBody {
    pub pdf_name: Option<String>,
    pub subject: Option<String>,
    pub model: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct FlowchartResponse {
    pub mermaid_code: String,
    pub subject: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    #[serde(default)]
    pub pdf_name: String,
    #[serde(default)]
    pub question: String,
    pub model: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    pub answer: String,
    /// False when nothing in the document matched and its opening was used instead.
    pub grounded_in_excerpts: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct DefinitionBody {
    #[serde(default)]
    pub term: String,
    pub context: Option<String>,
    /// A stored document to search first.
    pub pdf_name: Option<String>,
    /// Raw text to search when no stored document is named.
    pub pdf_content: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct DefinitionResponse {
    pub term: String,
    pub definition: String,
    /// `document`, `generated` or `unavailable`.
    pub source: String,
}

#[derive(Deserialize, ToSchema)]
pub struct TurnDto {
    pub role: String,
    pub content: String,
}

impl From<TurnDto> for ChatTurn {
    fn from(turn: TurnDto) -> Self {
        let role = match turn.role.to_lowercase().as_str() {
            "assistant" | "bot" => ChatRole::Assistant,
            "system" => ChatRole::System,
            _ => ChatRole::User,
        };
        ChatTurn {
            role,
            content: turn.content,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct TutorBody {
    pub question: Option<String>,
    pub message: Option<String>,
    pub username: Option<String>,
    /// A flowchart topic the user is looking at.
    pub context: Option<String>,
    #[serde(default)]
    pub history: Vec<TurnDto>,
    pub model: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct TutorResponse {
    pub response: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestRecordDto {
    pub pdf_name: Option<String>,
    pub difficulty: Option<String>,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub total_questions: u32,
}

impl From<TestRecordDto> for TestRecord {
    fn from(dto: TestRecordDto) -> Self {
        TestRecord {
            pdf_name: dto.pdf_name,
            difficulty: dto.difficulty,
            percentage: dto.percentage,
            score: dto.score,
            total_questions: dto.total_questions,
        }
    }
}

impl From<TestRecord> for TestRecordDto {
    fn from(record: TestRecord) -> Self {
        TestRecordDto {
            pdf_name: record.pdf_name,
            difficulty: record.difficulty,
            percentage: record.percentage,
            score: record.score,
            total_questions: record.total_questions,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SaveHistoryRequest {
    #[serde(default)]
    pub username: String,
    #[serde(rename = "testRecord")]
    pub test_record: Option<TestRecordDto>,
}

#[derive(Serialize, ToSchema)]
pub struct HistoryResponse {
    pub history: Vec<TestRecordDto>,
}

#[derive(Serialize, ToSchema)]
pub struct TierFlagsDto {
    pub advanced_mode: bool,
    pub all_themes: bool,
    pub no_ads: bool,
}

#[derive(Serialize, ToSchema)]
pub struct FeatureUsageDto {
    pub feature: String,
    pub allowed: bool,
    pub used: u64,
    /// Absent for unlimited features.
    pub remaining: Option<u64>,
    /// A number, or the string "Unlimited".
    #[schema(value_type = Object)]
    pub limit: Limit,
}

#[derive(Serialize, ToSchema)]
pub struct UsageResponse {
    pub tier: String,
    pub flags: TierFlagsDto,
    pub features: Vec<FeatureUsageDto>,
}

impl From<study_assistant_core::service::FeatureUsage> for FeatureUsageDto {
    fn from(usage: study_assistant_core::service::FeatureUsage) -> Self {
        FeatureUsageDto {
            feature: usage.feature,
            allowed: usage.admission.allowed,
            used: usage.admission.used,
            remaining: usage.admission.remaining,
            limit: usage.admission.limit,
        }
    }
}

//=========================================================================================
// Health and Documents
//=========================================================================================

#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "The server is up", body = HealthResponse))
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        generation_configured: state.generation_configured,
    })
}

/// Upload a document.
///
/// Accepts a multipart/form-data request with a `pdf` (or `file`) part and an
/// optional `pdf_name` text part that becomes the display name.
#[utoipa::path(
    post,
    path = "/api/documents",
    request_body(content_type = "multipart/form-data", description = "The document to upload."),
    responses(
        (status = 200, description = "Document stored", body = UploadResponse),
        (status = 400, description = "Missing or unreadable file", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    params(
        ("x-user-id" = Option<String>, Header, description = "The caller's user id."),
        ("x-user-tier" = Option<String>, Header, description = "free, pro or ultra.")
    )
)]
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    mut multipart: Multipart,
) -> HttpResult<UploadResponse> {
    let mut display_name: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::bad_request(format!("Failed to read multipart data: {e}")))?
    {
        let part = field.name().unwrap_or_default().to_string();
        match part.as_str() {
            "pdf_name" | "name" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| HttpError::bad_request(format!("Failed to read pdf_name: {e}")))?;
                display_name = Some(text);
            }
            "pdf" | "file" => {
                let file_name = field.file_name().unwrap_or("untitled.pdf").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| HttpError::bad_request(format!("Failed to read file bytes: {e}")))?;
                file = Some((file_name, data.to_vec()));
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| HttpError::bad_request("No PDF file provided"))?;
    let outcome = state
        .service
        .ingest_document(&caller, display_name.as_deref(), &file_name, &bytes)
        .await?;

    Ok(Json(UploadResponse {
        message: format!(
            "PDF '{}' uploaded successfully with {} images",
            outcome.document, outcome.image_count
        ),
        pdf_name: outcome.document,
        image_count: outcome.image_count,
    }))
}

#[utoipa::path(
    get,
    path = "/api/documents",
    responses((status = 200, description = "The caller's documents", body = DocumentListResponse))
)]
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> HttpResult<DocumentListResponse> {
    let pdfs = state.service.list_documents(&caller).await?;
    Ok(Json(DocumentListResponse { pdfs }))
}

#[utoipa::path(
    get,
    path = "/api/documents/{name}/images",
    params(("name" = String, Path, description = "Document name")),
    responses(
        (status = 200, description = "Page image metadata", body = ImageListResponse),
        (status = 404, description = "Document not found", body = ErrorBody)
    )
)]
pub async fn list_images_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
) -> HttpResult<ImageListResponse> {
    let images: Vec<ImageInfo> = state
        .service
        .page_images(&caller, &name)
        .await?
        .into_iter()
        .map(|info| ImageInfo {
            index: info.index,
            width: info.width,
            height: info.height,
            page: info.page,
            encoding: info.encoding.to_string(),
        })
        .collect();
    Ok(Json(ImageListResponse {
        pdf_name: name,
        count: images.len(),
        images,
    }))
}

#[utoipa::path(
    get,
    path = "/api/documents/{name}/images/{index}",
    params(
        ("name" = String, Path, description = "Document name"),
        ("index" = usize, Path, description = "0-based image index")
    ),
    responses(
        (status = 200, description = "The raw image bytes"),
        (status = 404, description = "Document or image not found", body = ErrorBody)
    )
)]
pub async fn get_image_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((name, index)): Path<(String, usize)>,
) -> Result<Response, HttpError> {
    let image = state.service.page_image(&caller, &name, index).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, image.encoding.mime_type())],
        image.payload,
    )
        .into_response())
}

//=========================================================================================
// Notes
//=========================================================================================

#[utoipa::path(
    post,
    path = "/api/generate-notes",
    request_body = NotesRequest,
    responses(
        (status = 200, description = "Notes generated", body = NotesResponse),
        (status = 400, description = "Missing input or unusable text", body = ErrorBody),
        (status = 404, description = "Document not found", body = ErrorBody),
        (status = 429, description = "Daily limit reached", body = ErrorBody),
        (status = 502, description = "Generation failed", body = ErrorBody)
    )
)]
pub async fn generate_notes_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<NotesRequest>,
) -> HttpResult<NotesResponse> {
    let level = NoteLevel::parse_or_default(req.level.as_deref());
    let outcome = state
        .service
        .generate_notes(&caller, &req.pdf_name, level)
        .await?;
    Ok(Json(NotesResponse {
        notes: outcome.notes,
        level: outcome.level.to_string(),
        pdf_name: outcome.document,
        sections: outcome.sections,
    }))
}

#[utoipa::path(
    post,
    path = "/api/regenerate-notes",
    request_body = RegenerateNotesRequest,
    responses(
        (status = 200, description = "Notes regenerated", body = NotesResponse),
        (status = 400, description = "Missing input or unusable text", body = ErrorBody),
        (status = 429, description = "Daily limit reached", body = ErrorBody)
    )
)]
pub async fn regenerate_notes_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<RegenerateNotesRequest>,
) -> HttpResult<NotesResponse> {
    let level = NoteLevel::parse_or_default(req.level.as_deref());
    let outcome = state
        .service
        .regenerate_notes(&caller, &req.pdf_name, level, &req.previous_notes)
        .await?;
    Ok(Json(NotesResponse {
        notes: outcome.notes,
        level: outcome.level.to_string(),
        pdf_name: outcome.document,
        sections: outcome.sections,
    }))
}

//=========================================================================================
// Tests
//=========================================================================================

#[utoipa::path(
    post,
    path = "/api/generate-test",
    request_body = TestRequest,
    responses(
        (status = 200, description = "Questions without the answer key", body = TestResponse),
        (status = 400, description = "Missing input or unusable text", body = ErrorBody),
        (status = 429, description = "Daily limit reached", body = ErrorBody),
        (status = 500, description = "The generated test was malformed", body = ErrorBody)
    )
)]
pub async fn generate_test_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<TestRequest>,
) -> HttpResult<TestResponse> {
    let difficulty = Difficulty::parse_or_default(req.difficulty.as_deref());
    let outcome = state
        .service
        .generate_test(&caller, &req.pdf_name, difficulty)
        .await?;
    info!(test_id = %outcome.test_id, questions = outcome.questions.len(), "Test generated");

    let questions: Vec<QuestionDto> = outcome
        .questions
        .into_iter()
        .map(|q| QuestionDto {
            id: q.id,
            question: q.question,
            options: q.options,
        })
        .collect();
    Ok(Json(TestResponse {
        test_id: outcome.test_id,
        difficulty: outcome.difficulty.to_string(),
        total_questions: questions.len(),
        questions,
    }))
}

#[utoipa::path(
    post,
    path = "/api/check-answer",
    request_body = CheckAnswerRequest,
    responses(
        (status = 200, description = "Whether the answer was right", body = CheckAnswerResponse),
        (status = 400, description = "Missing test id or answer out of range", body = ErrorBody),
        (status = 404, description = "Test or question not found", body = ErrorBody)
    )
)]
pub async fn check_answer_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CheckAnswerRequest>,
) -> HttpResult<CheckAnswerResponse> {
    let test_id = match (&req.test_id, &req.pdf_name) {
        (Some(id), _) => id
            .parse::<TestId>()
            .map_err(|_| HttpError(StudyError::NotFound("Test not found".to_string())))?,
        (None, Some(pdf_name)) => TestId {
            document: pdf_name.clone(),
            difficulty: Difficulty::parse_or_default(req.difficulty.as_deref()),
        },
        (None, None) => return Err(HttpError::bad_request("Missing test_id or pdf_name")),
    };

    let check = state
        .service
        .check_answer(&caller, &test_id, req.question_id, req.selected_answer_index)
        .await?;
    Ok(Json(CheckAnswerResponse {
        is_correct: check.is_correct,
        your_answer: check.your_answer,
        correct_answer: check.correct_answer,
        explanation: check.explanation,
    }))
}

#[utoipa::path(
    post,
    path = "/api/regenerate-explanation",
    request_body = ExplanationRequest,
    responses(
        (status = 200, description = "A simpler explanation", body = ExplanationResponse),
        (status = 400, description = "Missing required fields", body = ErrorBody),
        (status = 429, description = "Daily limit reached", body = ErrorBody)
    )
)]
pub async fn regenerate_explanation_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<ExplanationRequest>,
) -> HttpResult<ExplanationResponse> {
    let explanation = state
        .service
        .regenerate_explanation(&caller, &req.question, &req.student_answer, &req.correct_answer)
        .await?;
    Ok(Json(ExplanationResponse { explanation }))
}

//=========================================================================================
// Flashcards and Flowcharts
//=========================================================================================

#[utoipa::path(
    post,
    path = "/api/generate-flashcards",
    request_body = DocumentRequest,
    responses(
        (status = 200, description = "Flashcards", body = FlashcardsResponse),
        (status = 409, description = "The document was replaced while generating", body = ErrorBody),
        (status = 429, description = "Daily limit reached", body = ErrorBody)
    )
)]
pub async fn generate_flashcards_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<DocumentRequest>,
) -> HttpResult<FlashcardsResponse> {
    let flashcards: Vec<FlashcardDto> = state
        .service
        .generate_flashcards(&caller, &req.pdf_name)
        .await?
        .into_iter()
        .map(|card| FlashcardDto {
            term: card.term,
            definition: card.definition,
        })
        .collect();
    Ok(Json(FlashcardsResponse {
        count: flashcards.len(),
        flashcards,
    }))
}

#[utoipa::path(
    post,
    path = "/api/generate-flowchart",
    request_body = FlowchartBody,
    responses(
        (status = 200, description = "Mermaid flowchart", body = FlowchartResponse),
        (status = 400, description = "Neither a document nor a subject", body = ErrorBody),
        (status = 429, description = "Daily limit reached", body = ErrorBody)
    )
)]
pub async fn generate_flowchart_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<FlowchartBody>,
) -> HttpResult<FlowchartResponse> {
    let outcome = state
        .service
        .generate_flowchart(&caller, flowchart_request(req))
        .await?;
    Ok(Json(FlowchartResponse {
        mermaid_code: outcome.mermaid_code,
        subject: outcome.subject,
    }))
}

#[utoipa::path(
    post,
    path = "/api/regenerate-flowchart",
    request_body = FlowchartBody,
    responses(
        (status = 200, description = "Mermaid flowchart with a fresh layout", body = FlowchartResponse),
        (status = 429, description = "Daily limit reached", body = ErrorBody)
    )
)]
pub async fn regenerate_flowchart_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<FlowchartBody>,
) -> HttpResult<FlowchartResponse> {
    let outcome = state
        .service
        .regenerate_flowchart(&caller, flowchart_request(req))
        .await?;
    Ok(Json(FlowchartResponse {
        mermaid_code: outcome.mermaid_code,
        subject: outcome.subject,
    }))
}

fn flowchart_request(body: FlowchartBody) -> FlowchartRequest {
    FlowchartRequest {
        document: body.pdf_name,
        subject: body.subject,
        model: body.model,
    }
}

//=========================================================================================
// Conversation
//=========================================================================================

#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "An answer grounded in the document", body = ChatResponse),
        (status = 400, description = "Missing pdf_name or question", body = ErrorBody),
        (status = 404, description = "Document not found", body = ErrorBody)
    )
)]
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<ChatRequest>,
) -> HttpResult<ChatResponse> {
    let answer = state
        .service
        .chat_with_document(&caller, &req.pdf_name, &req.question, req.model)
        .await?;
    Ok(Json(ChatResponse {
        answer: answer.answer,
        grounded_in_excerpts: answer.grounded_in_excerpts,
    }))
}

#[utoipa::path(
    post,
    path = "/api/fetch-definition",
    request_body = DefinitionBody,
    responses(
        (status = 200, description = "A definition, from the document when it has one", body = DefinitionResponse),
        (status = 400, description = "Term required", body = ErrorBody),
        (status = 404, description = "Named document not found", body = ErrorBody)
    )
)]
pub async fn fetch_definition_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<DefinitionBody>,
) -> HttpResult<DefinitionResponse> {
    let request = DefinitionRequest {
        term: req.term,
        context: req.context,
        document: req.pdf_name,
        content: req.pdf_content,
    };
    let found = state.service.define_term(&caller, request).await?;
    Ok(Json(DefinitionResponse {
        source: found.source.as_str().to_string(),
        term: found.term,
        definition: found.definition,
    }))
}

#[utoipa::path(
    post,
    path = "/api/aviator-chat",
    request_body = TutorBody,
    responses(
        (status = 200, description = "The tutor's reply", body = TutorResponse),
        (status = 400, description = "Question or message required", body = ErrorBody),
        (status = 429, description = "Daily limit reached", body = ErrorBody)
    )
)]
pub async fn tutor_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<TutorBody>,
) -> HttpResult<TutorResponse> {
    let request = TutorRequest {
        message: req.question.or(req.message).unwrap_or_default(),
        username: req.username,
        topic: req.context,
        history: req.history.into_iter().map(ChatTurn::from).collect(),
        model: req.model,
    };
    let response = state.service.tutor(&caller, request).await?;
    Ok(Json(TutorResponse { response }))
}

//=========================================================================================
// Test History and Usage
//=========================================================================================

#[utoipa::path(
    post,
    path = "/api/test-history",
    request_body = SaveHistoryRequest,
    responses(
        (status = 201, description = "Record saved"),
        (status = 400, description = "Username and testRecord required", body = ErrorBody)
    )
)]
pub async fn save_test_history_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveHistoryRequest>,
) -> Result<StatusCode, HttpError> {
    let record = req
        .test_record
        .ok_or_else(|| HttpError::bad_request("Username and testRecord required"))?;
    state
        .service
        .save_test_record(&req.username, &record.into())
        .await?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    get,
    path = "/api/test-history/{username}",
    params(("username" = String, Path, description = "The user whose history to list")),
    responses((status = 200, description = "Newest first", body = HistoryResponse))
)]
pub async fn get_test_history_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> HttpResult<HistoryResponse> {
    let history = state
        .service
        .test_history(&username)
        .await?
        .into_iter()
        .map(TestRecordDto::from)
        .collect();
    Ok(Json(HistoryResponse { history }))
}

#[utoipa::path(
    get,
    path = "/api/usage",
    responses((status = 200, description = "Today's usage for every gated feature", body = UsageResponse))
)]
pub async fn usage_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> HttpResult<UsageResponse> {
    let report = state.service.usage(&caller).await?;
    Ok(Json(UsageResponse {
        tier: report.tier,
        flags: TierFlagsDto {
            advanced_mode: report.flags.advanced_mode,
            all_themes: report.flags.all_themes,
            no_ads: report.flags.no_ads,
        },
        features: report.features.into_iter().map(FeatureUsageDto::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/usage/{feature}",
    params(("feature" = String, Path, description = "A feature name such as note_generations")),
    responses((status = 200, description = "Today's usage of one feature", body = FeatureUsageDto))
)]
pub async fn feature_usage_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(feature): Path<String>,
) -> HttpResult<FeatureUsageDto> {
    let usage = state.service.usage_for(&caller, &feature).await?;
    Ok(Json(usage.into()))
}
