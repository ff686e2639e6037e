// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP API for on-demand analysis and follow-up questions

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::conversation::{Conversation, ConversationTurn, DocumentContext};
use crate::insight::Answerer;
use crate::pipeline::{MemorySink, Pipeline};
use crate::watcher::latest_capture;
use crate::SnapSightError;

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub answerer: Answerer,
    pub conversation: Mutex<Conversation>,
    pub watch_dir: PathBuf,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, watch_dir: PathBuf) -> Self {
        let answerer = pipeline.summarizer().answerer();
        Self {
            pipeline,
            answerer,
            conversation: Mutex::new(Conversation::new()),
            watch_dir,
        }
    }
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/api/health", get(api_health))
        .route("/api/analyze", post(api_analyze))
        .route("/api/upload", post(api_upload))
        .route("/api/ask", post(api_ask))
        .route("/api/conversation", get(api_conversation))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error body `{"error": "..."}` with a status derived from the failure
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<SnapSightError> for ApiError {
    fn from(err: SnapSightError) -> Self {
        let status = match err {
            SnapSightError::NoActiveDocument => StatusCode::CONFLICT,
            SnapSightError::UnreadableImage { .. } | SnapSightError::Image(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SnapSightError::Api(_) | SnapSightError::Completion(_) => StatusCode::BAD_GATEWAY,
            SnapSightError::MissingApiKey(_) => StatusCode::SERVICE_UNAVAILABLE,
            SnapSightError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("Request failed: {}", self.message);
        }
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// === Handlers ===

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    completion_service: &'static str,
    completion_reachable: bool,
}

async fn api_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let client = state.pipeline.summarizer().client();
    let reachable = client.health_check().await.is_ok();
    Json(HealthResponse {
        status: "ok",
        completion_service: client.name(),
        completion_reachable: reachable,
    })
}

#[derive(Deserialize, Default)]
struct AnalyzeRequest {
    path: Option<String>,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    #[serde(flatten)]
    document: DocumentContext,
    history_reset: bool,
}

async fn open_document(state: &AppState, document: DocumentContext) -> AnalyzeResponse {
    let history_reset = state.conversation.lock().await.open(document.clone());
    AnalyzeResponse { document, history_reset }
}

async fn api_analyze(
    State(state): State<Arc<AppState>>,
    body: Option<Json<AnalyzeRequest>>,
) -> ApiResult<AnalyzeResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let path = match request.path {
        Some(path) => resolve_in_watch_dir(&state.watch_dir, Path::new(&path))?,
        None => latest_capture(&state.watch_dir, state.pipeline.extensions())?.ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                format!("No captures found in {}", state.watch_dir.display()),
            )
        })?,
    };

    if !path.is_file() {
        return Err(ApiError::new(StatusCode::NOT_FOUND, format!("Not a file: {}", path.display())));
    }

    info!("Analyzing {:?}", path);
    let document = state.pipeline.analyze_path(&path).await?;
    Ok(Json(open_document(&state, document).await))
}

/// Resolve `requested` (relative names are taken from the watch directory)
/// and refuse anything that is not a file inside the watch directory
fn resolve_in_watch_dir(watch_dir: &Path, requested: &Path) -> Result<PathBuf, ApiError> {
    let dir = watch_dir.canonicalize().map_err(|_| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("Watch directory not found: {}", watch_dir.display()),
        )
    })?;

    let candidate = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        dir.join(requested)
    };
    let path = candidate
        .canonicalize()
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, format!("Not a file: {}", requested.display())))?;

    if !path.starts_with(&dir) {
        warn!("Refusing to analyze {:?} outside {:?}", path, dir);
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Only captures inside the watch directory can be analyzed",
        ));
    }
    Ok(path)
}

async fn api_upload(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> ApiResult<AnalyzeResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let source = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;

        let image = image::load_from_memory(&bytes).map_err(SnapSightError::from)?;
        info!("Analyzing upload {} ({} bytes)", source, bytes.len());
        let document = state.pipeline.analyze_image(&source, &image).await?;
        return Ok(Json(open_document(&state, document).await));
    }

    Err(ApiError::new(StatusCode::BAD_REQUEST, "Missing multipart field 'file'"))
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    history: Vec<ConversationTurn>,
}

async fn api_ask(State(state): State<Arc<AppState>>, Json(request): Json<AskRequest>) -> ApiResult<AskResponse> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Question must not be empty"));
    }

    let mut conversation = state.conversation.lock().await;
    let answer = conversation.ask(&state.answerer, question).await?;
    Ok(Json(AskResponse {
        answer,
        history: conversation.history().to_vec(),
    }))
}

#[derive(Serialize)]
struct ConversationResponse {
    active: Option<DocumentContext>,
    history: Vec<ConversationTurn>,
}

async fn api_conversation(State(state): State<Arc<AppState>>) -> Json<ConversationResponse> {
    let conversation = state.conversation.lock().await;
    Json(ConversationResponse {
        active: conversation.active().cloned(),
        history: conversation.history().to_vec(),
    })
}

async fn index_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let conversation = state.conversation.lock().await;
    Html(render_index(conversation.active(), conversation.history()))
}

// === Template Rendering ===

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn render_index(active: Option<&DocumentContext>, history: &[ConversationTurn]) -> String {
    let document = match active {
        Some(doc) => format!(
            "<h2>{}</h2><p>{}</p><pre>{}</pre>",
            escape(&doc.source),
            escape(&doc.summary),
            escape(&doc.raw_text)
        ),
        None => "<p>No capture analyzed yet. POST /api/analyze or /api/upload.</p>".to_string(),
    };

    let turns: String = history
        .iter()
        .map(|turn| {
            let who = match turn.role {
                crate::conversation::Role::User => "You",
                crate::conversation::Role::Assistant => "SnapSight",
            };
            format!("<li><strong>{}:</strong> {}</li>", who, escape(&turn.text))
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>SnapSight</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 2rem; background: #1a1a2e; color: #e8e8e8; }}
        pre {{ white-space: pre-wrap; background: #16213e; padding: 1rem; }}
    </style>
</head>
<body>
    <h1>SnapSight</h1>
    {}
    <ul>{}</ul>
</body>
</html>"#,
        document, turns
    )
}

/// Build the pipeline from config and serve until the process is stopped
pub async fn start_server(config: AppConfig) -> crate::Result<()> {
    // reports from this surface are returned in responses, not printed
    let pipeline = Arc::new(Pipeline::from_config(&config, Arc::new(MemorySink::new()))?);
    let state = Arc::new(AppState::new(pipeline, config.watch.dir_path()));

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Web API available at http://{}", addr);

    let router = create_router(state);
    axum::serve(listener, router)
        .await
        .map_err(|e| SnapSightError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
