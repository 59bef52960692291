/// Workflow session REST API endpoints
///
/// Thin JSON layer over the session manager: start, resume, status, cancel and
/// application reload. All bodies are camelCase.

use crate::{
    error::EngineError,
    runtime::{engine::ExecutionEngine, session::SessionSnapshot},
    session::manager::{ResumeWorkflowResponse, SessionManager, StartWorkflowResponse, WorkflowStatus},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Session manager driving starts and resumes
    pub manager: Arc<SessionManager>,
    /// Engine, for application reloads
    pub engine: Arc<ExecutionEngine>,
}

/// Request body for starting a workflow
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWorkflowRequest {
    pub application_id: Uuid,
    pub process_module_id: Uuid,
    pub username: String,
}

/// Request body for resuming a paused workflow
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeWorkflowRequest {
    pub session_id: Uuid,
    pub field_id: Uuid,
    pub value: String,
}

/// Response for application reloads
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    pub application_id: Uuid,
    pub module_count: usize,
    pub message: String,
}

/// Create workflow session routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflow/start", post(start_workflow))
        .route("/api/workflow/resume", post(resume_workflow))
        .route("/api/workflow/session/{id}", get(get_session).delete(cancel_session))
        .route("/api/workflow/user/{username}/session", get(get_user_session))
        .route("/api/applications/{id}/reload", post(reload_application))
}

fn status_code(error: &EngineError) -> StatusCode {
    match error {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::State(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Start a workflow, or attach to the user's existing session
///
/// POST /api/workflow/start
/// Body: { "applicationId": "...", "processModuleId": "...", "username": "..." }
async fn start_workflow(
    State(state): State<AppState>,
    Json(payload): Json<StartWorkflowRequest>,
) -> Result<Json<StartWorkflowResponse>, StatusCode> {
    if payload.username.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    state
        .manager
        .start_workflow(payload.application_id, payload.process_module_id, &payload.username)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to start workflow for '{}': {}", payload.username, e);
            status_code(&e)
        })
}

/// Resume a paused workflow with the user's input
///
/// POST /api/workflow/resume
/// Body: { "sessionId": "...", "fieldId": "...", "value": "..." }
async fn resume_workflow(
    State(state): State<AppState>,
    Json(payload): Json<ResumeWorkflowRequest>,
) -> Result<Json<ResumeWorkflowResponse>, StatusCode> {
    match state
        .manager
        .resume_workflow(payload.session_id, payload.field_id, &payload.value)
        .await
    {
        Ok(response) if response.status == WorkflowStatus::NotFound => Err(StatusCode::NOT_FOUND),
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            tracing::warn!("Failed to resume session {}: {}", payload.session_id, e);
            Err(status_code(&e))
        }
    }
}

/// GET /api/workflow/session/{id}
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, StatusCode> {
    match state.manager.get_session_status(id).await {
        Ok(Some(snapshot)) => Ok(Json(snapshot)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get session {}: {}", id, e);
            Err(status_code(&e))
        }
    }
}

/// GET /api/workflow/user/{username}/session
async fn get_user_session(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<SessionSnapshot>, StatusCode> {
    match state.manager.get_user_session_status(&username).await {
        Ok(Some(snapshot)) => Ok(Json(snapshot)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to get session of user '{}': {}", username, e);
            Err(status_code(&e))
        }
    }
}

/// DELETE /api/workflow/session/{id}
async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, StatusCode> {
    match state.manager.cancel_session(id).await {
        Ok(true) => Ok(Json(json!({ "message": "Session cancelled successfully" }))),
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to cancel session {}: {}", id, e);
            Err(status_code(&e))
        }
    }
}

/// Reload one application's modules from the definition repository
///
/// POST /api/applications/{id}/reload
async fn reload_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReloadResponse>, StatusCode> {
    match state.engine.reload_application(id).await {
        Ok(module_count) => Ok(Json(ReloadResponse {
            application_id: id,
            module_count,
            message: format!("Application reloaded with {} modules", module_count),
        })),
        Err(e) => {
            tracing::error!("Failed to reload application {}: {}", id, e);
            Err(status_code(&e))
        }
    }
}
