// HTTP API: quiz generation plus the room, player and user tables.
//
// Handlers are thin: decode the body, call into `quizsync_core::lobby` or the
// quiz generator, and map failures through `ApiError`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use quizsync_core::clock::Clock;
use quizsync_core::leaderboard::{self, Standing};
use quizsync_core::lobby::{self, LobbyError};
use quizsync_core::question::{Question, Quiz};
use quizsync_core::room::{Player, Room, User};
use quizsync_core::store::TableStore;

use crate::function;
use crate::quiz::{QuizError, QuizGenerator, QuizRequest};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TableStore>,
    pub quiz: Arc<QuizGenerator>,
    pub clock: Arc<dyn Clock>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Quiz(#[from] QuizError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<LobbyError> for ApiError {
    fn from(err: LobbyError) -> Self {
        match err {
            LobbyError::RoomNotFound { .. } | LobbyError::PlayerNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            LobbyError::RoomNotJoinable { .. } => ApiError::Conflict(err.to_string()),
            LobbyError::NoQuestions | LobbyError::InvalidName(_) | LobbyError::InvalidQuestion(_) => {
                ApiError::BadRequest(err.to_string())
            }
            LobbyError::Store(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, summary) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad request"),
            ApiError::Quiz(_) => (StatusCode::INTERNAL_SERVER_ERROR, function::QUIZ_FAILURE),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };
        let details = match &self {
            ApiError::Internal(e) => format!("{e:#}"),
            other => other.to_string(),
        };
        if status.is_server_error() {
            error!("{summary}: {details}");
        }
        (status, Json(json!({ "error": summary, "details": details }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SaveUserBody {
    pub device_id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomBody {
    pub host_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedRoom {
    pub room: Room,
    pub player: Player,
}

#[derive(Debug, Deserialize)]
pub struct JoinBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct StartBody {
    pub questions: Vec<Question>,
}

#[derive(Debug, Deserialize)]
pub struct ResultBody {
    pub score: u32,
    pub time_taken: i64,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the full application. The function adapter sets its own CORS
/// headers, so the shared CORS layer only wraps the `/api` routes.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let api = Router::new()
        .route("/health", get(health))
        .route("/api/quiz", post(generate_quiz))
        .route("/api/users", put(save_user))
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/{code}", get(get_room))
        .route("/api/rooms/{code}/join", post(join_room))
        .route("/api/rooms/{code}/start", post(start_match))
        .route("/api/rooms/{code}/leaderboard", get(get_leaderboard))
        .route("/api/rooms/{code}/rematch", post(rematch))
        .route("/api/players/{id}", delete(leave_room))
        .route("/api/players/{id}/result", post(submit_result))
        .layer(cors);

    Router::new()
        .merge(api)
        .merge(function::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Takes the raw body so that an undecodable request fails like any other
/// generation error.
async fn generate_quiz(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Quiz>> {
    let request = QuizRequest::from_body(&body)?;
    Ok(Json(state.quiz.generate(&request).await?))
}

async fn save_user(
    State(state): State<AppState>,
    Json(body): Json<SaveUserBody>,
) -> ApiResult<Json<User>> {
    if body.device_id.trim().is_empty() {
        return Err(ApiError::BadRequest("device_id must not be empty".into()));
    }
    let username = lobby::normalize_name(&body.username).map_err(LobbyError::from)?;
    let user = state.store.upsert_user(&body.device_id, &username, Utc::now())?;
    info!(device = %user.device_id, username = %user.username, "user saved");
    Ok(Json(user))
}

async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomBody>,
) -> ApiResult<Json<CreatedRoom>> {
    let (room, player) =
        lobby::create_room(state.store.as_ref(), &body.host_name, &mut rand::thread_rng())?;
    Ok(Json(CreatedRoom { room, player }))
}

async fn get_room(State(state): State<AppState>, Path(code): Path<String>) -> ApiResult<Json<Room>> {
    state
        .store
        .get_room(&code)?
        .map(Json)
        .ok_or_else(|| LobbyError::RoomNotFound { code }.into())
}

async fn join_room(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<JoinBody>,
) -> ApiResult<Json<Player>> {
    Ok(Json(lobby::join_room(state.store.as_ref(), &code, &body.name)?))
}

async fn start_match(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<StartBody>,
) -> ApiResult<Json<Room>> {
    let now_ms = state.clock.now_ms();
    Ok(Json(lobby::start_match(state.store.as_ref(), &code, body.questions, now_ms)?))
}

async fn submit_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ResultBody>,
) -> ApiResult<StatusCode> {
    lobby::submit_result(state.store.as_ref(), &id, body.score, body.time_taken)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn leave_room(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    lobby::leave_room(state.store.as_ref(), &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Standings for a room. An active room whose deadline has passed is ended
/// first so late readers see the final state.
async fn get_leaderboard(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<Vec<Standing>>> {
    lobby::close_if_expired(state.store.as_ref(), &code, state.clock.now_ms())?;
    Ok(Json(leaderboard::load(state.store.as_ref(), &code)?))
}

async fn rematch(State(state): State<AppState>, Path(code): Path<String>) -> ApiResult<Json<Room>> {
    lobby::rematch(state.store.as_ref(), &code)?;
    state
        .store
        .get_room(&code)?
        .map(Json)
        .ok_or_else(|| LobbyError::RoomNotFound { code }.into())
}
