//! HTTP presentation layer. Thin by design: handlers translate requests into
//! registry/orchestrator/store calls and map domain errors onto status codes.
//! The one piece of policy that lives here is the single re-init-and-retry
//! when a command fails because its session expired.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::{AppError, Result};
use crate::knowledge_store::{Collection, KnowledgeStore};
use crate::orchestrator::Orchestrator;
use crate::schema::ExecutionRecord;
use crate::session::{Session, SessionMode, SessionRegistry};

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<KnowledgeStore>,
}

pub fn create_router(state: AppState) -> Router {
    // Anchor uptime to server construction, not the first health request.
    Lazy::force(&STARTED_AT);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/session/init", post(session_init))
        .route("/api/session/close", post(session_close))
        .route("/api/execute", post(execute))
        .route("/api/knowledge/add", post(knowledge_add))
        .route("/api/knowledge/clear", post(knowledge_clear))
        .route("/api/knowledge/stats", get(knowledge_stats))
        .route("/api/history", get(history))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run `command` against `session`, allowing exactly one re-init-and-retry
/// when the remote reports the session expired mid-command. A second expiry
/// surfaces to the caller.
pub async fn execute_with_retry(
    registry: &SessionRegistry,
    orchestrator: &Orchestrator,
    session: Arc<Session>,
    command: &str,
    context: &Value,
) -> Result<ExecutionRecord> {
    match orchestrator.run(command, context, &session).await {
        Err(e) if e.is_session_expired() => {
            warn!(session_id = %session.id, "session expired mid-command, re-initializing once");
            let target_ref = session.target_ref.clone();
            let mode = session.mode();
            registry.close(&session.id).await?;
            let fresh = registry.init(&target_ref, mode).await?;
            orchestrator.run(command, context, &fresh.session).await
        }
        other => other,
    }
}

// Request types

#[derive(Deserialize)]
struct SessionInitRequest {
    scene_url: String,
    mode: Option<SessionMode>,
}

#[derive(Deserialize)]
struct SessionCloseRequest {
    session_id: String,
}

#[derive(Deserialize)]
struct ExecuteRequest {
    command: String,
    session_id: Option<String>,
    #[serde(default)]
    context: Value,
}

#[derive(Deserialize)]
struct KnowledgeAddRequest {
    collection: String,
    id: Option<String>,
    text: String,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Deserialize)]
struct KnowledgeClearRequest {
    collection: Option<String>,
}

type ApiResult = std::result::Result<Json<Value>, (StatusCode, Json<Value>)>;

fn error_response(e: AppError) -> (StatusCode, Json<Value>) {
    let status = match &e {
        AppError::SessionNotFound(_) | AppError::TargetNotFound(_) => StatusCode::NOT_FOUND,
        AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::SceneLoadTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AppError::MalformedPlan(_) | AppError::MalformedObservation(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "success": false, "error": e.to_string() })))
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message })),
    )
}

// Handlers

async fn root() -> Json<Value> {
    Json(json!({ "service": "scene-pilot", "version": env!("CARGO_PKG_VERSION") }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "status": "ok",
        "uptime_secs": STARTED_AT.elapsed().as_secs(),
        "open_sessions": state.registry.count().await,
        "knowledge": state.store.stats().await,
    }))
}

async fn session_init(
    State(state): State<AppState>,
    Json(req): Json<SessionInitRequest>,
) -> ApiResult {
    let mode = req.mode.unwrap_or(SessionMode::Lightweight);
    let outcome = state
        .registry
        .init(&req.scene_url, mode)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({
        "success": true,
        "session_id": outcome.session.id,
        "mode": mode,
        "reused": outcome.reused,
    })))
}

async fn session_close(
    State(state): State<AppState>,
    Json(req): Json<SessionCloseRequest>,
) -> ApiResult {
    state
        .registry
        .close(&req.session_id)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "success": true })))
}

async fn execute(State(state): State<AppState>, Json(req): Json<ExecuteRequest>) -> ApiResult {
    let session = match &req.session_id {
        Some(id) => state.registry.get(id).await.map_err(error_response)?,
        None => state
            .registry
            .first_open()
            .await
            .ok_or_else(|| error_response(AppError::SessionNotFound("no open session".into())))?,
    };

    let record = execute_with_retry(
        &state.registry,
        &state.orchestrator,
        session,
        &req.command,
        &req.context,
    )
    .await
    .map_err(error_response)?;

    Ok(Json(json!({ "success": record.success, "result": record })))
}

async fn knowledge_add(
    State(state): State<AppState>,
    Json(req): Json<KnowledgeAddRequest>,
) -> ApiResult {
    let collection = Collection::parse(&req.collection)
        .ok_or_else(|| bad_request("unknown collection, expected ui_patterns or materials"))?;
    let id = req
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    state
        .store
        .add(collection, &id, &req.text, req.tags)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "success": true, "id": id })))
}

async fn knowledge_clear(
    State(state): State<AppState>,
    Json(req): Json<KnowledgeClearRequest>,
) -> ApiResult {
    let targets = match &req.collection {
        Some(name) => vec![Collection::parse(name)
            .ok_or_else(|| bad_request("unknown collection, expected ui_patterns or materials"))?],
        None => vec![Collection::UiPatterns, Collection::Materials],
    };
    for collection in targets {
        state.store.clear(collection).await.map_err(error_response)?;
    }
    Ok(Json(json!({ "success": true })))
}

async fn knowledge_stats(State(state): State<AppState>) -> Json<Value> {
    let stats = state.store.stats().await;
    Json(json!({ "success": true, "stats": stats }))
}

async fn history(State(state): State<AppState>) -> Json<Value> {
    let records = state.orchestrator.history().await;
    Json(json!({
        "success": true,
        "count": records.len(),
        "history": records,
    }))
}
