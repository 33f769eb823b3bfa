pub(crate) mod chat;

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;

use crate::state::AppState;

/// Build the public router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/v1/chat/completions",
            post(chat::handle_chat_completions).options(cors_preflight),
        )
        .fallback(not_found)
        .with_state(state)
}

/// CORS headers sent on every API response, preflight included.
pub(crate) fn apply_cors(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        http::HeaderValue::from_static("*"),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_METHODS,
        http::HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        http::header::ACCESS_CONTROL_ALLOW_HEADERS,
        http::HeaderValue::from_static("Content-Type, Authorization"),
    );
}

async fn cors_preflight() -> Response {
    let mut response = http::StatusCode::NO_CONTENT.into_response();
    apply_cors(&mut response);
    response
}

async fn not_found(uri: axum::http::Uri) -> Response {
    let body = serde_json::json!({
        "error": {
            "message": format!("path not found: {}", uri.path()),
            "type": "invalid_request_error",
            "code": "not_found",
            "param": null,
        }
    });
    let mut response = (http::StatusCode::NOT_FOUND, axum::Json(body)).into_response();
    apply_cors(&mut response);
    response
}
