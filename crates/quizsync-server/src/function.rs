// Serverless-function flavour of the quiz endpoint.
//
// Same generator as `POST /api/quiz`, but it answers its own preflight,
// stamps CORS headers on every response and decodes the raw body itself so
// that a malformed request fails with the usual quiz error body.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tracing::error;

use crate::http::AppState;
use crate::quiz::QuizRequest;

pub const FUNCTION_PATH: &str = "/functions/v1/generate-quiz";

/// `error` field of every failed quiz response.
pub const QUIZ_FAILURE: &str = "Failed to generate quiz";

const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

fn cors_headers() -> [(HeaderName, &'static str); 2] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS),
    ]
}

pub fn routes() -> Router<AppState> {
    Router::new().route(FUNCTION_PATH, post(invoke).options(preflight))
}

async fn preflight() -> impl IntoResponse {
    (cors_headers(), "ok")
}

async fn invoke(State(state): State<AppState>, body: Bytes) -> Response {
    let result = match QuizRequest::from_body(&body) {
        Ok(request) => state.quiz.generate(&request).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(quiz) => (StatusCode::OK, cors_headers(), Json(quiz)).into_response(),
        Err(e) => {
            error!("quiz function failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                cors_headers(),
                Json(json!({ "error": QUIZ_FAILURE, "details": e.to_string() })),
            )
                .into_response()
        }
    }
}
