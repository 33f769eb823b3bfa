//! Re-framing of decoded upstream events into Chat Completions SSE frames.

use crate::protocol::openai_chat::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
use crate::util::unix_now_secs;

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Builds the outbound chunks for one stream.
///
/// The stream id stays stable for the whole request; `created` is stamped
/// per chunk.
pub struct ChunkTranslator {
    stream_id: String,
    model: String,
}

impl ChunkTranslator {
    #[must_use]
    pub fn new(stream_id: String, model: String) -> Self {
        Self { stream_id, model }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// A content-delta frame with a null finish reason.
    #[must_use]
    pub fn content_chunk(&self, delta: &str) -> String {
        self.frame(
            ChunkDelta {
                content: Some(delta.to_string()),
            },
            None,
        )
    }

    /// The terminal frame: empty delta, finish reason `stop`.
    #[must_use]
    pub fn stop_chunk(&self) -> String {
        self.frame(ChunkDelta::default(), Some("stop"))
    }

    /// One inline-error frame. After it the stream closes with no stop chunk
    /// and no `[DONE]` marker.
    #[must_use]
    pub fn error_chunk(&self, message: &str) -> String {
        self.frame(
            ChunkDelta {
                content: Some(format!("\n\n[Error: {message}]")),
            },
            Some("error"),
        )
    }

    /// The literal stream-termination marker.
    #[must_use]
    pub fn done_frame() -> &'static str {
        DONE_FRAME
    }

    fn frame(&self, delta: ChunkDelta, finish_reason: Option<&str>) -> String {
        let chunk = ChatCompletionChunk {
            id: self.stream_id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: unix_now_secs(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(str::to_string),
            }],
        };
        match serde_json::to_string(&chunk) {
            Ok(json) => sse_frame(&json),
            Err(_) => String::new(),
        }
    }
}

/// Format one SSE frame (no event type, just data).
#[must_use]
pub fn sse_frame(json: &str) -> String {
    let mut out = String::with_capacity(10 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn translator() -> ChunkTranslator {
        ChunkTranslator::new("req-test".to_string(), "joy-caption-beta".to_string())
    }

    fn decode(frame: &str) -> Value {
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
        serde_json::from_str(frame.trim_start_matches("data: ").trim()).unwrap()
    }

    #[test]
    fn test_content_chunk_shape() {
        let frame = translator().content_chunk("Hi");
        let json = decode(&frame);
        assert_eq!(json["id"], "req-test");
        assert_eq!(json["object"], "chat.completion.chunk");
        assert_eq!(json["model"], "joy-caption-beta");
        assert!(json["created"].as_u64().unwrap() > 1_577_836_800);
        assert_eq!(json["choices"][0]["index"], 0);
        assert_eq!(json["choices"][0]["delta"]["content"], "Hi");
        assert_eq!(json["choices"][0]["finish_reason"], Value::Null);
    }

    #[test]
    fn test_stop_chunk_has_empty_delta_and_stop_reason() {
        let frame = translator().stop_chunk();
        let json = decode(&frame);
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert_eq!(
            json["choices"][0]["delta"],
            serde_json::json!({}),
            "stop chunk delta must be empty"
        );
    }

    #[test]
    fn test_error_chunk_carries_inline_message() {
        let frame = translator().error_chunk("Upload failed: status=500, message=boom");
        let json = decode(&frame);
        assert_eq!(json["choices"][0]["finish_reason"], "error");
        let content = json["choices"][0]["delta"]["content"].as_str().unwrap();
        assert!(content.starts_with("\n\n[Error: "));
        assert!(content.contains("status=500"));
        assert!(content.ends_with(']'));
    }

    #[test]
    fn test_done_frame_literal() {
        assert_eq!(ChunkTranslator::done_frame(), "data: [DONE]\n\n");
    }

    #[test]
    fn test_stream_id_is_stable_across_chunks() {
        let translator = translator();
        let a = decode(&translator.content_chunk("a"));
        let b = decode(&translator.content_chunk("b"));
        assert_eq!(a["id"], b["id"]);
    }
}
