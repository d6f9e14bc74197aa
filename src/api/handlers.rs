//! HTTP request handlers

use super::types::{
    CreateSessionRequest, CreateSessionResponse, ErrorResponse, SessionListResponse,
    SessionResponse, SuccessResponse, TaskListResponse, TranscriptResponse, TurnRequest,
};
use super::AppState;
use crate::runtime::{RuntimeError, TurnOutcome};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(close_session))
        .route("/api/sessions/:id/reset", post(reset_session))
        // Turns
        .route("/api/sessions/:id/turns", get(get_transcript).post(submit_turn))
        // Registry
        .route("/api/tasks", get(list_tasks))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

async fn list_sessions(State(state): State<AppState>) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state
        .sessions
        .store()
        .inner()
        .list_sessions()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(SessionListResponse { sessions }))
}

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let session_id = state.sessions.create_session(req.session_id).await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.sessions.snapshot(&id).await?;
    Ok(Json(SessionResponse { session }))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.sessions.reset(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if state.sessions.close(&id).await? {
        Ok(Json(SuccessResponse { success: true }))
    } else {
        Err(AppError::NotFound(format!("Session not found: {id}")))
    }
}

// ============================================================
// Turns
// ============================================================

async fn submit_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnOutcome>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Turn text must not be empty".to_string()));
    }
    let outcome = state.sessions.submit_turn(&id, &req.text).await?;
    Ok(Json(outcome))
}

async fn get_transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TranscriptResponse>, AppError> {
    let entries = state.sessions.transcript(&id).await?;
    Ok(Json(TranscriptResponse { entries }))
}

// ============================================================
// Registry
// ============================================================

async fn list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    let controller = state.sessions.controller();
    Json(TaskListResponse {
        tasks: controller.registry().capabilities(),
        fallback_task: controller.config().fallback_task.to_string(),
    })
}

async fn get_version() -> &'static str {
    concat!("wellflow ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<RuntimeError> for AppError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::SessionNotFound(_) => AppError::NotFound(e.to_string()),
            RuntimeError::SessionClosing(_) => AppError::Conflict(e.to_string()),
            RuntimeError::WorkerGone(_) | RuntimeError::CorruptSession { .. } | RuntimeError::Store(_) => {
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
