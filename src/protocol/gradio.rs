//! Wire types for the upstream Gradio queue protocol.
//!
//! The queue-join contract is a fixed-order untyped array. Everything inside
//! this crate works with typed values; the positional convention is produced
//! at exactly one serialization boundary, the tuple `data` field of
//! [`QueueJoinPayload`].

use serde::{Deserialize, Serialize};

use crate::config::SamplingConfig;

/// An uploaded asset reference with the file-data type tag the queue expects.
#[derive(Debug, Clone, Serialize)]
pub struct FileData {
    pub path: String,
    pub meta: FileMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileMeta {
    #[serde(rename = "_type")]
    pub kind: String,
}

impl FileData {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            meta: FileMeta {
                kind: "gradio.FileData".to_string(),
            },
        }
    }
}

/// Queue-join job description.
///
/// `data` carries the job inputs in the order the space's handler expects:
/// image, prompt, temperature, top-p, max tokens, log flag.
#[derive(Debug, Serialize)]
pub struct QueueJoinPayload {
    pub data: (FileData, String, f64, f64, u32, bool),
    pub event_data: Option<()>,
    pub fn_index: u32,
    pub trigger_id: Option<()>,
    pub session_hash: String,
}

impl QueueJoinPayload {
    #[must_use]
    pub fn new(
        file: FileData,
        prompt: String,
        sampling: &SamplingConfig,
        fn_index: u32,
        session_hash: String,
    ) -> Self {
        Self {
            data: (
                file,
                prompt,
                sampling.temperature,
                sampling.top_p,
                sampling.max_tokens,
                sampling.log_prompt,
            ),
            event_data: None,
            fn_index,
            trigger_id: None,
            session_hash,
        }
    }
}

/// Tagged kind of a decoded queue event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Generating,
    Completed,
    Other,
}

/// A decoded unit from the per-session event channel.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueEvent {
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub output: Option<QueueOutput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueOutput {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

impl QueueEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self.msg.as_str() {
            "process_generating" => EventKind::Generating,
            "process_completed" => EventKind::Completed,
            _ => EventKind::Other,
        }
    }

    /// The cumulative text snapshot carried by this event.
    ///
    /// The space occasionally emits `null` or non-string data during early
    /// generation; those normalize to the empty string instead of surfacing
    /// a type fault.
    #[must_use]
    pub fn snapshot(&self) -> &str {
        self.output
            .as_ref()
            .and_then(|output| output.data.first())
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
    }
}
