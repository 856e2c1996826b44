use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{self, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{self, AuraError};
use crate::provider::{self, LlmProvider};
use crate::relay::{self, RelayReply, SessionOptions};
use crate::tool::ToolRegistry;
use crate::types::{Directive, Turn};
use crate::util::truncate_string;

/// Shared application state for the HTTP API. Read-only after startup.
pub struct AppState {
    pub config: Config,
    pub provider: Arc<dyn LlmProvider>,
    pub tools: Arc<ToolRegistry>,
}

impl AppState {
    pub fn new(config: Config, provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            provider,
            tools,
        }
    }

    /// Create AppState with the Gemini provider and directive tools.
    /// Fails if the config cannot serve requests (e.g. no API key).
    pub fn from_config(config: Config) -> error::Result<Self> {
        config.validate()?;
        let provider = provider::create_provider(&config);
        Ok(Self::new(
            config,
            provider,
            Arc::new(ToolRegistry::with_directives()),
        ))
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions::from_agent_config(&self.config.provider.model, &self.config.agent)
    }
}

/// Request body for the chat endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    #[serde(default)]
    pub history: Vec<Turn>,
}

/// Response body for the chat endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub directives: Vec<Directive>,
}

impl From<RelayReply> for ChatResponse {
    fn from(reply: RelayReply) -> Self {
        Self {
            text: reply.text,
            directives: reply.directives,
        }
    }
}

/// Response body for errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Every failure surfaces as a 500 carrying the error text.
#[derive(Debug)]
pub struct ApiError(String);

impl From<AuraError> for ApiError {
    fn from(e: AuraError) -> Self {
        Self(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Chat request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: self.0 }),
        )
            .into_response()
    }
}

/// Create the axum Router with all API routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let static_dir = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        // Everything else is the web front end
        .fallback_service(static_dir)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
                .allow_headers([http::header::CONTENT_TYPE]),
        )
        .with_state(state)
}

/// POST /api/chat — relay one message through the model
async fn handle_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload?;
    let message = req
        .message
        .ok_or_else(|| AuraError::InvalidRequest("'message' is required".to_string()))?;

    info!(
        "Chat request: history={} message={}",
        req.history.len(),
        truncate_string(&message, 80, "...")
    );

    let reply = relay::relay(
        state.provider.clone(),
        state.tools.clone(),
        state.session_options(),
        &req.history,
        &message,
    )
    .await?;

    info!("Chat reply: {} directive(s)", reply.directives.len());
    Ok(Json(reply.into()))
}

/// GET /health — Health check
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// Start the HTTP server on the given address.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
