//! Drives the router end to end with in-memory adapters and a scripted generator.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use api_lib::{
    adapters::{InMemoryStore, InMemoryUsageCounter, PdfExtractor},
    config::Config,
    web::{router, state::AppState},
};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use study_assistant_core::{
    ports::{GenerationRequest, PortError, PortResult, TextGenerationService},
    EntitlementLedger, PipelineSettings, StudyService,
};
use tower::ServiceExt;

#[derive(Default)]
struct ScriptedGenerator {
    replies: Mutex<VecDeque<PortResult<String>>>,
}

impl ScriptedGenerator {
    fn push(&self, reply: PortResult<String>) {
        self.replies.lock().unwrap().push_back(reply);
    }
}

#[async_trait]
impl TextGenerationService for ScriptedGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> PortResult<String> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("## Notes".to_string()))
    }
}

fn app() -> (Router, Arc<ScriptedGenerator>) {
    let generator = Arc::new(ScriptedGenerator::default());
    let config = Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: None,
        log_level: tracing::Level::INFO,
        openai_api_key: None,
        generation_model: "test-model".to_string(),
        max_upload_bytes: 1024 * 1024,
        cors_origin: "http://localhost:3000".to_string(),
        pipeline: PipelineSettings::default(),
    };
    let service = StudyService::new(
        Arc::new(InMemoryStore::new()),
        generator.clone(),
        Arc::new(PdfExtractor::new()),
        EntitlementLedger::new(Arc::new(InMemoryUsageCounter::new())),
        config.pipeline.clone(),
    );
    let state = Arc::new(AppState {
        service: Arc::new(service),
        config: Arc::new(config),
        generation_configured: true,
    });
    (router(state), generator)
}

const BOUNDARY: &str = "study-boundary";

fn upload_request(user: &str, name: &str, text: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"pdf_name\"\r\n\r\n{name}\r\n\
         --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"pdf\"; filename=\"chapter.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n{text}\r\n--{BOUNDARY}--\r\n"
    );
    Request::post("/api/documents")
        .header("x-user-id", user)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(uri: &str, user: &str, tier: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("x-user-id", user)
        .header("x-user-tier", tier)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str, user: &str, tier: &str) -> Request<Body> {
    Request::get(uri)
        .header("x-user-id", user)
        .header("x-user-tier", tier)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn chapter() -> String {
    "Photosynthesis turns light water and carbon dioxide into glucose and oxygen. ".repeat(20)
}

fn questions(count: u32) -> String {
    let items: Vec<Value> = (1..=count)
        .map(|id| {
            json!({
                "id": id,
                "question": format!("Question {id}?"),
                "options": ["A", "B", "C", "D"],
                "correct_answer_index": 1,
                "explanation": "B is right."
            })
        })
        .collect();
    Value::Array(items).to_string()
}

#[tokio::test]
async fn health_reports_generation_status() {
    let (app, _) = app();
    let (status, body) = send(&app, get_request("/api/health", "ada", "free")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["generation_configured"], true);
}

#[tokio::test]
async fn uploads_are_scoped_to_their_owner() {
    let (app, _) = app();
    let (status, body) = send(&app, upload_request("ada", "Biology", &chapter())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pdf_name"], "Biology");
    assert_eq!(body["image_count"], 0);

    let (_, mine) = send(&app, get_request("/api/documents", "ada", "free")).await;
    assert_eq!(mine["pdfs"], json!(["Biology"]));
    let (_, theirs) = send(&app, get_request("/api/documents", "bob", "free")).await;
    assert_eq!(theirs["pdfs"], json!([]));

    let (status, body) = send(&app, get_request("/api/documents/Biology/images/0", "ada", "free")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn second_free_notes_request_is_rejected_with_429() {
    let (app, _) = app();
    send(&app, upload_request("ada", "Biology", &chapter())).await;

    let request = || json_request("/api/generate-notes", "ada", "free", json!({"pdf_name": "Biology"}));
    let (status, body) = send(&app, request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["level"], "beginner");
    assert_eq!(body["notes"], "## Notes");

    let (status, body) = send(&app, request()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["feature"], "note_generations");
    assert_eq!(body["tier"], "free");
    assert_eq!(body["limit"], 1);
    assert_eq!(body["kind"], "quota_exceeded");
}

#[tokio::test]
async fn rejected_json_does_not_consume_quota() {
    let (app, _) = app();
    let bad = Request::post("/api/generate-notes")
        .header("x-user-id", "ada")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app, bad).await;
    assert!(status.is_client_error());

    let (_, usage) = send(&app, get_request("/api/usage/note_generations", "ada", "free")).await;
    assert_eq!(usage["used"], 0);
    assert_eq!(usage["remaining"], 1);
}

#[tokio::test]
async fn upstream_and_malformed_failures_have_distinct_statuses() {
    let (app, generator) = app();
    send(&app, upload_request("ada", "Biology", &chapter())).await;
    let request = || json_request("/api/generate-test", "ada", "ultra", json!({"pdf_name": "Biology"}));

    generator.push(Err(PortError::Unexpected("connection refused".to_string())));
    let (status, body) = send(&app, request()).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "upstream");

    generator.push(Ok(questions(3)));
    let (status, body) = send(&app, request()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "malformed_output");

    generator.push(Ok(questions(5)));
    let (status, body) = send(&app, request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["test_id"], "Biology_test_normal");
    assert_eq!(body["total_questions"], 5);
    assert!(body["questions"][0].get("correct_answer_index").is_none());

    let (status, body) = send(
        &app,
        json_request(
            "/api/check-answer",
            "ada",
            "ultra",
            json!({"test_id": "Biology_test_normal", "question_id": 2, "selected_answer_index": 0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_correct"], false);
    assert_eq!(body["correct_answer"], "B");
}

#[tokio::test]
async fn unusable_text_is_a_client_error() {
    let (app, _) = app();
    send(&app, upload_request("ada", "Scan", "x ~ 1 ?")).await;
    let (status, body) = send(
        &app,
        json_request("/api/generate-flashcards", "ada", "pro", json!({"pdf_name": "Scan"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "quality");
}

#[tokio::test]
async fn usage_reports_limits_per_tier() {
    let (app, _) = app();
    let (_, ultra) = send(&app, get_request("/api/usage", "ada", "ultra")).await;
    assert_eq!(ultra["tier"], "ultra");
    assert_eq!(ultra["flags"]["no_ads"], true);
    assert!(ultra["features"]
        .as_array()
        .unwrap()
        .iter()
        .all(|f| f["limit"] == "Unlimited"));

    let (_, unknown) = send(&app, get_request("/api/usage/time_travel", "ada", "pro")).await;
    assert_eq!(unknown["limit"], 0);
    assert_eq!(unknown["allowed"], false);
}

#[tokio::test]
async fn test_history_round_trips_newest_first() {
    let (app, _) = app();
    for score in [4, 9] {
        let (status, _) = send(
            &app,
            json_request(
                "/api/test-history",
                "ada",
                "free",
                json!({
                    "username": "ada",
                    "testRecord": {"pdfName": "Biology", "difficulty": "easy", "percentage": score * 10, "score": score, "totalQuestions": 10}
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, get_request("/api/test-history/ada", "ada", "free")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"][0]["score"], 9);
    assert_eq!(body["history"][1]["pdfName"], "Biology");

    let (status, _) = send(
        &app,
        json_request("/api/test-history", "ada", "free", json!({"username": "ada"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unparseable_test_id_is_not_found() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        json_request(
            "/api/check-answer",
            "ada",
            "free",
            json!({"test_id": "no-difficulty-here", "question_id": 1, "selected_answer_index": 0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
    assert_eq!(body["error"], "Test not found");
}

#[tokio::test]
async fn definitions_quote_the_document_then_fall_back() {
    let (app, generator) = app();
    send(&app, upload_request("ada", "Biology", &chapter())).await;

    let (status, body) = send(
        &app,
        json_request(
            "/api/fetch-definition",
            "ada",
            "free",
            json!({"term": "glucose", "pdf_name": "Biology"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "document");
    assert!(body["definition"].as_str().unwrap().contains("glucose"));

    generator.push(Err(PortError::Unexpected("connection refused".to_string())));
    let (status, body) = send(
        &app,
        json_request("/api/fetch-definition", "ada", "free", json!({"term": "enzyme"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "unavailable");
    assert_eq!(body["definition"], "Definition of enzyme not available");

    let (status, _) = send(
        &app,
        json_request("/api/fetch-definition", "ada", "free", json!({"term": " "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
