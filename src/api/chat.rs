use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use bytes::Bytes;
use http::HeaderMap;

use crate::error::BridgeError;
use crate::protocol::openai_chat::{extract_user_turn, ChatCompletionRequest, ImageSource};
use crate::state::AppState;
use crate::stream::pipeline::streaming_response;
use crate::stream::translator::ChunkTranslator;
use crate::util::{generate_session_hash, split_data_url};

const UPLOAD_FILENAME: &str = "image.png";

/// `POST /v1/chat/completions`.
///
/// Failures before the SSE response starts (auth, parse, image resolution,
/// upload, enqueue) become one non-streaming JSON error. Once streaming has
/// begun, failures become an inline error chunk instead; the transport is
/// never aborted mid-flight.
pub(crate) async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match run_pipeline(state, &headers, &body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "chat completion rejected before streaming");
            let mut response = err.into_response();
            super::apply_cors(&mut response);
            response
        }
    }
}

async fn run_pipeline(
    state: Arc<AppState>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, BridgeError> {
    state.authorize(headers)?;

    let request: ChatCompletionRequest = serde_json::from_slice(body)
        .map_err(|err| BridgeError::InvalidRequest(format!("invalid chat request body: {err}")))?;
    let turn = extract_user_turn(&request)?;

    let image = resolve_image(&state, &turn.image).await?;

    let session_hash = generate_session_hash();
    let asset_path = state.client.upload(image, UPLOAD_FILENAME).await?;
    state
        .client
        .enqueue(&asset_path, &turn.prompt, &session_hash)
        .await?;

    let request_id = state.next_request_id();
    let model = state.resolve_model(request.model.as_deref()).to_string();
    tracing::info!(%request_id, %model, "caption job enqueued");

    let translator = ChunkTranslator::new(request_id, model);
    let mut response = streaming_response(Arc::clone(&state), session_hash, translator);
    super::apply_cors(&mut response);
    Ok(response)
}

async fn resolve_image(state: &AppState, source: &ImageSource) -> Result<Bytes, BridgeError> {
    match source {
        ImageSource::DataUrl(url) => {
            let (_mime, payload) = split_data_url(url)
                .ok_or_else(|| BridgeError::InvalidRequest("malformed image data URL".to_string()))?;
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(payload)
                .map_err(|err| {
                    BridgeError::InvalidRequest(format!("invalid base64 image payload: {err}"))
                })?;
            Ok(Bytes::from(decoded))
        }
        ImageSource::Remote(url) => {
            let (bytes, content_type) = state.client.fetch_image(url).await?;
            tracing::debug!(%content_type, size = bytes.len(), "fetched remote image");
            Ok(bytes)
        }
    }
}
