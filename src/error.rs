/// Canonical error type used across all modules.
///
/// Per-frame decode failures on the upstream event channel are not
/// represented here: they are heartbeat noise, swallowed inside the decoder.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Image fetch failed: status={status}, message={message}")]
    ImageFetch { status: u16, message: String },
    #[error("Upload failed: status={status}, message={message}")]
    Upload { status: u16, message: String },
    #[error("Queue join failed: status={status}, message={message}")]
    Enqueue { status: u16, message: String },
    #[error("Event channel connect failed: status={status}, message={message}")]
    StreamConnect { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    ServerError,
}

impl BridgeError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            BridgeError::Auth(_) => ErrorCategory::Authentication,
            BridgeError::Config(_)
            | BridgeError::ImageFetch { .. }
            | BridgeError::Upload { .. }
            | BridgeError::Enqueue { .. }
            | BridgeError::StreamConnect { .. }
            | BridgeError::Transport(_)
            | BridgeError::Internal(_) => ErrorCategory::ServerError,
        }
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::Authentication => "authentication_error",
        ErrorCategory::ServerError => "server_error",
    }
}

fn error_code(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request",
        ErrorCategory::Authentication => "invalid_api_key",
        ErrorCategory::ServerError => "server_error",
    }
}

/// Format an error as an OpenAI-shaped JSON body, returning
/// (`status_code`, body).
#[must_use]
pub fn format_error(err: &BridgeError) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let status = http_status_for_category(cat);
    let body = serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": error_type(cat),
            "code": error_code(cat),
            "param": null,
        }
    });
    (status, body)
}

impl axum::response::IntoResponse for BridgeError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_maps_to_400() {
        let err = BridgeError::InvalidRequest("no image".to_string());
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[test]
    fn auth_maps_to_401() {
        let err = BridgeError::Auth("Missing API key".to_string());
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "invalid_api_key");
    }

    #[test]
    fn upstream_failures_map_to_500() {
        let err = BridgeError::Upload {
            status: 500,
            message: "space crashed".to_string(),
        };
        let (status, body) = format_error(&err);
        assert_eq!(status, http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["type"], "server_error");
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("status=500"));
        assert!(message.contains("space crashed"));
    }

    #[test]
    fn categories_cover_all_variants() {
        assert_eq!(
            BridgeError::StreamConnect {
                status: 404,
                message: String::new()
            }
            .category(),
            ErrorCategory::ServerError
        );
        assert_eq!(
            BridgeError::ImageFetch {
                status: 403,
                message: String::new()
            }
            .category(),
            ErrorCategory::ServerError
        );
        assert_eq!(
            BridgeError::Transport("reset".to_string()).category(),
            ErrorCategory::ServerError
        );
    }
}
