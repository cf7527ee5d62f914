use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::StoreError;

use super::bootstrap::{BootstrapOutcome, bootstrap_session};
use super::db::{BoardStore, NewWardTask};
use super::join::{join_session_best_effort, new_temp_user_id};
use super::models::{BoardView, Identity, SessionParticipant};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub store: BoardStore,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateWardRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateScheduleRequest {
    pub name: String,
    pub session_date: String,
}

#[derive(Deserialize)]
pub struct BootstrapRequest {
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub identity: Identity,
}

#[derive(Deserialize)]
pub struct IdentityRequest {
    pub identity: Identity,
}

#[derive(Deserialize)]
pub struct UpsertProfileRequest {
    pub user_id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Deserialize)]
pub struct AddViewerRequest {
    pub participant_id: Uuid,
}

#[derive(Serialize)]
pub struct NewIdentityResponse {
    pub temp_user_id: String,
}

#[derive(Serialize)]
pub struct JoinResponse {
    /// `None` when the join failed; viewing proceeds in degraded mode.
    pub participant: Option<SessionParticipant>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BootstrapResponse {
    Ready { created: bool, board: BoardView },
    NoUpcoming,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unauthorized(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::NotAuthenticated(msg) => ApiError::Unauthorized(msg),
            StoreError::Invalid { .. } => ApiError::BadRequest(e.to_string()),
            StoreError::Backend { ref source, .. } => {
                tracing::error!("[api] backend failure: {:#}", source);
                ApiError::Internal("internal error".to_string())
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/wards", get(list_wards).post(create_ward))
        .route("/api/wards/{id}/tasks", post(create_ward_task))
        .route("/api/wards/{id}/schedules", post(create_schedule))
        .route("/api/wards/{id}/bootstrap", post(bootstrap_board))
        .route("/api/identity", post(new_identity))
        .route("/api/profiles", post(upsert_profile))
        .route("/api/sessions/{id}/board", get(get_board))
        .route("/api/sessions/{id}/join", post(join))
        .route("/api/sessions/{id}/complete", post(complete_session))
        .route("/api/tasks/{id}/assign", post(assign_task))
        .route("/api/tasks/{id}/complete", post(complete_task))
        .route("/api/tasks/{id}/cancel", post(cancel_task))
        .route("/api/tasks/{id}/viewers", post(add_viewer))
        .route(
            "/api/tasks/{id}/viewers/{participant_id}",
            delete(remove_viewer),
        )
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_wards(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let wards = state.store.list_wards().await?;
    Ok(Json(wards))
}

async fn create_ward(
    State(state): State<SharedState>,
    Json(req): Json<CreateWardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("ward name must not be empty".into()));
    }
    let ward = state.store.create_ward(req.name).await?;
    Ok((StatusCode::CREATED, Json(ward)))
}

async fn create_ward_task(
    State(state): State<SharedState>,
    Path(ward_id): Path<Uuid>,
    Json(req): Json<NewWardTask>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.get_ward(ward_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("ward {} not found", ward_id)));
    }
    let task = state.store.create_ward_task(ward_id, req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn create_schedule(
    State(state): State<SharedState>,
    Path(ward_id): Path<Uuid>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.get_ward(ward_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("ward {} not found", ward_id)));
    }
    if chrono::NaiveDate::parse_from_str(&req.session_date, "%Y-%m-%d").is_err() {
        return Err(ApiError::BadRequest(
            "session_date must be an ISO date (YYYY-MM-DD)".into(),
        ));
    }
    let schedule = state
        .store
        .create_schedule(ward_id, req.name, req.session_date)
        .await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

async fn new_identity() -> impl IntoResponse {
    Json(NewIdentityResponse {
        temp_user_id: new_temp_user_id(),
    })
}

async fn upsert_profile(
    State(state): State<SharedState>,
    Json(req): Json<UpsertProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .store
        .upsert_profile(req.user_id, req.display_name, req.avatar_url)
        .await?;
    Ok(Json(profile))
}

/// Resolve (and if necessary materialize) the board a visitor lands on.
async fn bootstrap_board(
    State(state): State<SharedState>,
    Path(ward_id): Path<Uuid>,
    Json(req): Json<BootstrapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.get_ward(ward_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("ward {} not found", ward_id)));
    }
    let outcome = bootstrap_session(&state.store, ward_id, req.session_id, &req.identity).await?;
    match outcome {
        BootstrapOutcome::Ready { session, created } => {
            let board = state.store.board_view(session.id).await?;
            Ok(Json(BootstrapResponse::Ready { created, board }))
        }
        BootstrapOutcome::NoUpcoming => Ok(Json(BootstrapResponse::NoUpcoming)),
    }
}

async fn get_board(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let board = state.store.board_view(session_id).await?;
    Ok(Json(board))
}

/// Register the caller on the session roster. The join itself is best
/// effort: a failure degrades to `participant: null` rather than an error,
/// so viewing is never blocked.
async fn join(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<IdentityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.get_session(session_id).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "session {} not found",
            session_id
        )));
    }
    let participant = join_session_best_effort(&state.store, session_id, &req.identity).await;
    Ok(Json(JoinResponse { participant }))
}

async fn complete_session(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.store.complete_session(session_id).await?;
    Ok(Json(session))
}

/// Conditional claim; the losing side of a race receives 409.
async fn assign_task(
    State(state): State<SharedState>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<IdentityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.store.assign_task(task_id, req.identity).await?;
    Ok(Json(task))
}

async fn complete_task(
    State(state): State<SharedState>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<IdentityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.store.complete_task(task_id, req.identity).await?;
    Ok(Json(task))
}

async fn cancel_task(
    State(state): State<SharedState>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<IdentityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.store.cancel_task(task_id, req.identity).await?;
    Ok(Json(task))
}

async fn add_viewer(
    State(state): State<SharedState>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<AddViewerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = state
        .store
        .upsert_viewer(task_id, req.participant_id)
        .await?;
    Ok(Json(viewer))
}

async fn remove_viewer(
    State(state): State<SharedState>,
    Path((task_id, participant_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_viewer(task_id, participant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Tests ─────────────────────────────────────────────────────────────
