//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        InMemoryStore, InMemoryUsageCounter, OpenAiTextAdapter, PdfExtractor, PgStore,
        PgUsageCounter, UnconfiguredGenerator,
    },
    config::Config,
    error::ApiError,
    web::{rest::ApiDoc, router, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{header::{ACCEPT, CONTENT_TYPE}, HeaderName, HeaderValue, Method};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use study_assistant_core::{
    ports::{DocumentStore, TextGenerationService, UsageCounter},
    EntitlementLedger, StudyService,
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Choose Storage: PostgreSQL when configured, memory otherwise ---
    let (store, counter): (Arc<dyn DocumentStore>, Arc<dyn UsageCounter>) =
        match &config.database_url {
            Some(database_url) => {
                info!("Connecting to database...");
                let db_pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(database_url)
                    .await?;
                let pg_store = PgStore::new(db_pool.clone());
                info!("Running database migrations...");
                pg_store.run_migrations().await?;
                info!("Database migrations complete.");
                (Arc::new(pg_store), Arc::new(PgUsageCounter::new(db_pool)))
            }
            None => {
                warn!("DATABASE_URL is not set; documents and usage counts live in memory only");
                (
                    Arc::new(InMemoryStore::new()),
                    Arc::new(InMemoryUsageCounter::new()),
                )
            }
        };

    // --- 3. Initialize Service Adapters ---
    let generator: Arc<dyn TextGenerationService> = match &config.openai_api_key {
        Some(api_key) => {
            let openai_config = OpenAIConfig::new().with_api_key(api_key);
            let openai_client = Client::with_config(openai_config);
            Arc::new(OpenAiTextAdapter::new(
                openai_client,
                config.generation_model.clone(),
            ))
        }
        None => {
            warn!("OPENAI_API_KEY is not set; generation endpoints will fail");
            Arc::new(UnconfiguredGenerator)
        }
    };
    let generation_configured = config.openai_api_key.is_some();

    // --- 4. Build the Shared AppState ---
    let service = StudyService::new(
        store,
        generator,
        Arc::new(PdfExtractor::new()),
        EntitlementLedger::new(counter),
        config.pipeline.clone(),
    );
    let app_state = Arc::new(AppState {
        service: Arc::new(service),
        config: config.clone(),
        generation_configured,
    });

    // --- 5. Create the Web Router ---
    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {e}")))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-user-tier"),
        ]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(router(app_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
