//! Thin HTTP facade over the gateway library.
//!
//! Four routes under `/api/v1`: liveness, the tool surface, execution, and
//! passthrough redemption. When a shared secret is configured, every route
//! except health requires `Authorization: Bearer <secret>`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::info;

use trikhub_core::ids::{ContentRef, SessionId};
use trikhub_gateway::TrikGateway;

#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    pub port: u16,
    /// Shared secret for bearer auth; `None` disables auth.
    pub auth_token: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<TrikGateway>,
    pub auth_token: Option<Arc<String>>,
}

/// Body of `POST /api/v1/execute`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub tool: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub fn build_router(gateway: Arc<TrikGateway>, config: &ServerConfig) -> Router {
    let state = AppState {
        gateway,
        auth_token: config.auth_token.clone().map(Arc::new),
    };
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/tools", get(tools_handler))
        .route("/api/v1/execute", post(execute_handler))
        .route("/api/v1/content/:ref", get(content_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Serve until the listener fails or the process is stopped.
pub async fn serve(
    gateway: Arc<TrikGateway>,
    config: ServerConfig,
) -> Result<(), std::io::Error> {
    let router = build_router(Arc::clone(&gateway), &config);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, auth = config.auth_token.is_some(), "gateway server listening");
    axum::serve(listener, router).await
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized"})),
    )
        .into_response()
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = &state.auth_token else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token == expected.as_str())
        .unwrap_or(false)
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn tools_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    Json(state.gateway.get_tool_definitions()).into_response()
}

async fn execute_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ExecuteRequest>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    let session_id = request.session_id.map(SessionId::from_raw);
    let result = state
        .gateway
        .execute_tool(&request.tool, request.input, session_id.as_ref())
        .await;
    Json(result).into_response()
}

async fn content_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(content_ref): Path<String>,
) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    match state.gateway.deliver_content(&ContentRef::from_raw(content_ref)) {
        Some(delivered) => Json(json!({
            "content": delivered.content,
            "receipt": delivered.receipt,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "content not found or expired"})),
        )
            .into_response(),
    }
}
