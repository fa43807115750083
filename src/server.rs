//! Dashboard HTTP API.
//!
//! Exposes text extraction, bulk document analysis and chat as a JSON HTTP
//! API for the research dashboard. The server holds no document state; the
//! client sends the documents it wants analyzed with each request.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/extract-text` | Extract text from one file and describe it |
//! | `POST` | `/analyze-documents` | Cross-document analysis of processed files |
//! | `POST` | `/chat` | Answer a question over processed files |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": "no completed documents to analyze" }
//! ```
//!
//! Malformed request bodies and files outside the upload policy are `400`.
//! Everything else, including a missing API credential, is `500`. A failed
//! chat additionally carries `fallbackResponse`, the text to show the user.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the dashboard can be
//! served from a different origin.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::analysis::{analyze_documents, describe_document};
use crate::chat::{ChatOrchestrator, FALLBACK_RESPONSE};
use crate::client::{backend_from_config, Backend, CompletionBackend};
use crate::config::Config;
use crate::error::AnalysisError;
use crate::extract::TextExtractor;
use crate::models::{AnalysisResult, ChatTurn, DocumentInsight, ProcessedFile};
use crate::request::AnalysisRequestBuilder;
use crate::validate::{validate_file, FileDescriptor, UploadPolicy};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    backend: Backend,
    builder: Arc<AnalysisRequestBuilder>,
    extractor: Arc<TextExtractor>,
    policy: Arc<UploadPolicy>,
    chat: Arc<ChatOrchestrator>,
}

impl AppState {
    fn backend(&self) -> Result<&Arc<dyn CompletionBackend>, AppError> {
        self.backend
            .as_ref()
            .map_err(|reason| internal(reason.clone()))
    }
}

/// Starts the HTTP server with the backend described by `[llm]`.
///
/// Binds to `[server].bind` and runs until the process is terminated. A
/// missing credential is logged and reported per request, not at startup.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let backend = backend_from_config(&config.llm);
    if let Err(reason) = &backend {
        tracing::warn!(reason = %reason, "model backend unavailable; analysis endpoints will fail");
    }
    run_server_with_backend(config, backend).await
}

/// Like [`run_server`], but with a caller-supplied completion backend.
pub async fn run_server_with_backend(config: &Config, backend: Backend) -> anyhow::Result<()> {
    let app = router(config, backend);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "docent server listening");
    println!("Docent server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Builds the application router. Exposed so callers can serve it on a
/// listener of their own.
pub fn router(config: &Config, backend: Backend) -> Router {
    let builder = AnalysisRequestBuilder::new(&config.llm, &config.pipeline);
    let state = AppState {
        chat: Arc::new(ChatOrchestrator::new(backend.clone(), builder.clone())),
        backend,
        builder: Arc::new(builder),
        extractor: Arc::new(TextExtractor::new(&config.pipeline)),
        policy: Arc::new(config.upload.policy()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/extract-text", post(handle_extract_text))
        .route("/analyze-documents", post(handle_analyze_documents))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::NoDocuments => bad_request(AnalysisError::NoDocuments.to_string()),
            other => {
                tracing::error!(error = %other, "document analysis failed");
                internal(other.to_string())
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /extract-text ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractTextRequest {
    file_name: String,
    #[serde(default)]
    file_type: String,
    file_content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractTextResponse {
    extracted_text: String,
    metadata: DocumentInsight,
}

/// Handler for `POST /extract-text`.
///
/// The file is checked against the upload policy, extracted, and described
/// by the model. Model or decode failures degrade to the fallback metadata;
/// only policy and extraction failures are errors.
async fn handle_extract_text(
    State(state): State<AppState>,
    body: Result<Json<ExtractTextRequest>, JsonRejection>,
) -> Result<Json<ExtractTextResponse>, AppError> {
    let Json(req) = body?;

    let file = FileDescriptor::new(
        req.file_name,
        req.file_content.len() as u64,
        req.file_type,
    );
    validate_file(&file, &state.policy).map_err(|e| bad_request(e.to_string()))?;
    let backend = state.backend()?;

    let described = describe_document(
        backend.as_ref(),
        &state.builder,
        &state.extractor,
        &file,
        req.file_content.as_bytes(),
    )
    .await
    .map_err(|failed| {
        bad_request(
            failed
                .error
                .unwrap_or_else(|| format!("could not extract text from {}", failed.name)),
        )
    })?;

    Ok(Json(ExtractTextResponse {
        extracted_text: described.file.extracted_text,
        metadata: described.insight,
    }))
}

// ============ POST /analyze-documents ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    documents: Vec<ProcessedFile>,
}

async fn handle_analyze_documents(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, AppError> {
    let Json(req) = body?;
    let backend = state.backend()?;
    let result = analyze_documents(backend.as_ref(), &state.builder, &req.documents).await?;
    Ok(Json(result))
}

// ============ POST /chat ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    #[serde(default)]
    documents: Vec<ProcessedFile>,
    #[serde(default)]
    chat_history: Vec<ChatTurn>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatFailure {
    error: String,
    fallback_response: String,
}

/// Handler for `POST /chat`.
///
/// Returns `500 {error, fallbackResponse}` when the model cannot answer.
async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return AppError::from(rejection).into_response(),
    };
    if req.message.trim().is_empty() {
        return bad_request("message must not be empty").into_response();
    }

    match state
        .chat
        .try_answer(&req.message, &req.documents, &req.chat_history)
        .await
    {
        Ok(response) => Json(ChatResponse { response }).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "chat request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatFailure {
                    error: e.to_string(),
                    fallback_response: FALLBACK_RESPONSE.to_string(),
                }),
            )
                .into_response()
        }
    }
}
