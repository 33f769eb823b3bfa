use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Chat Completions request wire type (the subset this gateway consumes).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One inbound message. Content is kept loose: the vision convention allows
/// either a plain string or an array of typed parts.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
}

/// Where the request's image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Inline `data:image/...;base64,` payload.
    DataUrl(String),
    /// Remote http(s) reference, fetched by the gateway.
    Remote(String),
}

/// The extracted most-recent user turn: one image plus an optional prompt.
#[derive(Debug, Clone)]
pub struct UserTurn {
    pub prompt: String,
    pub image: ImageSource,
}

static IMAGE_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"https?://\S+|data:image/[a-z]+;base64,\S+").ok());

fn classify_image_reference(reference: &str) -> ImageSource {
    if reference.starts_with("data:image") {
        ImageSource::DataUrl(reference.to_string())
    } else {
        ImageSource::Remote(reference.to_string())
    }
}

fn turn_from_parts(parts: &[serde_json::Value]) -> Option<UserTurn> {
    let mut image: Option<&str> = None;
    let mut prompt = String::new();

    for part in parts {
        match part.get("type").and_then(serde_json::Value::as_str) {
            Some("image_url") => {
                if let Some(url) = part
                    .get("image_url")
                    .and_then(|iu| iu.get("url"))
                    .and_then(serde_json::Value::as_str)
                {
                    image = Some(url);
                }
            }
            Some("text") => {
                if let Some(text) = part.get("text").and_then(serde_json::Value::as_str) {
                    prompt.push_str(text);
                }
            }
            _ => {}
        }
    }

    image.map(|reference| UserTurn {
        prompt: prompt.trim().to_string(),
        image: classify_image_reference(reference),
    })
}

fn turn_from_text(text: &str) -> Option<UserTurn> {
    let matched = IMAGE_TOKEN.as_ref()?.find(text)?;
    let reference = matched.as_str();
    let mut prompt = String::with_capacity(text.len() - reference.len());
    prompt.push_str(&text[..matched.start()]);
    prompt.push_str(&text[matched.end()..]);

    Some(UserTurn {
        prompt: prompt.trim().to_string(),
        image: classify_image_reference(reference),
    })
}

/// Extract the most recent user turn from a chat request.
///
/// Only that turn is processed; earlier context is ignored. The turn must
/// carry an image, either as an `image_url` content part or embedded in a
/// plain-string message.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidRequest`] when no user message exists or the
/// message carries no image reference.
pub fn extract_user_turn(request: &ChatCompletionRequest) -> Result<UserTurn, BridgeError> {
    let last_user = request
        .messages
        .iter()
        .rev()
        .find(|message| message.role == "user")
        .ok_or_else(|| BridgeError::InvalidRequest("no user message found".to_string()))?;

    let turn = match last_user.content.as_ref() {
        Some(serde_json::Value::Array(parts)) => turn_from_parts(parts),
        Some(serde_json::Value::String(text)) => turn_from_text(text),
        _ => None,
    };

    turn.ok_or_else(|| {
        BridgeError::InvalidRequest(
            "the user message must carry an image (base64 data URL or http link)".to_string(),
        )
    })
}

// ---------------------------------------------------------------------------
// Outbound chunk wire types
// ---------------------------------------------------------------------------

/// One streamed chunk of the outbound Chat Completions response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
