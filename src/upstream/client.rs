use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};

use crate::config::{SamplingConfig, ServerConfig, UpstreamConfig};
use crate::error::BridgeError;
use crate::protocol::gradio::{FileData, QueueEvent, QueueJoinPayload};
use crate::stream::decoder::queue_event_stream;
use crate::upstream::multipart::{encode_multipart, generate_boundary};

const UPLOAD_PATH: &str = "/gradio_api/upload";
const QUEUE_JOIN_PATH: &str = "/gradio_api/queue/join";
const QUEUE_DATA_PATH: &str = "/gradio_api/queue/data";
const ERROR_BODY_SNIPPET_MAX: usize = 512;

/// Client for one upstream Gradio space.
///
/// Wraps a pooled HTTP client; all calls for one job are correlated by the
/// caller-supplied session hash. No overall request timeout is applied, so
/// long generations are never cut off mid-stream (connect timeout only).
pub struct QueueClient {
    http: reqwest::Client,
    origin: String,
    user_agent: String,
    fn_index: u32,
    sampling: SamplingConfig,
    default_prompt: String,
}

impl QueueClient {
    /// Create a new client with connection pooling from the given configs.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the HTTP client cannot be built.
    pub fn new(upstream: &UpstreamConfig, server: &ServerConfig) -> Result<Self, BridgeError> {
        let pool_idle_timeout = if server.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(server.http_pool_idle_timeout_secs))
        };

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(server.http_pool_max_idle_per_host.max(1))
            .pool_idle_timeout(pool_idle_timeout)
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(server.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| BridgeError::Transport(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            origin: upstream.origin.trim_end_matches('/').to_string(),
            user_agent: upstream.user_agent.clone(),
            fn_index: upstream.fn_index,
            sampling: upstream.sampling.clone(),
            default_prompt: upstream.default_prompt.clone(),
        })
    }

    /// Download a remote image, returning its bytes and the content type the
    /// server reported.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ImageFetch`] on a non-success status and
    /// [`BridgeError::Transport`] when the request itself fails.
    pub async fn fetch_image(&self, url: &str) -> Result<(Bytes, String), BridgeError> {
        let response = self
            .http
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await
            .map_err(|err| BridgeError::Transport(format!("Image request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::ImageFetch {
                status: status.as_u16(),
                message: read_error_snippet(response).await,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| BridgeError::Transport(format!("Image read failed: {err}")))?;

        Ok((bytes, content_type))
    }

    /// Upload image bytes as a multipart body, returning the asset path the
    /// space assigned.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Upload`] on a non-success status or a response
    /// that is not a non-empty JSON string array.
    pub async fn upload(&self, image: Bytes, filename: &str) -> Result<String, BridgeError> {
        let boundary = generate_boundary();
        let body = encode_multipart(&image, filename, &boundary);

        let response = self
            .http
            .post(format!("{}{UPLOAD_PATH}", self.origin))
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header(USER_AGENT, self.user_agent.as_str())
            .body(body)
            .send()
            .await
            .map_err(|err| BridgeError::Transport(format!("Upload request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Upload {
                status: status.as_u16(),
                message: read_error_snippet(response).await,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| BridgeError::Transport(format!("Upload read failed: {err}")))?;
        let paths: Vec<String> = serde_json::from_slice(&body).map_err(|err| BridgeError::Upload {
            status: status.as_u16(),
            message: format!("unexpected upload response: {err}"),
        })?;

        paths.into_iter().next().ok_or_else(|| BridgeError::Upload {
            status: status.as_u16(),
            message: "upload response carried no asset path".to_string(),
        })
    }

    /// Join the processing queue for `session_hash` with the uploaded asset
    /// and prompt. Results arrive only on the event channel.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Enqueue`] on a non-success status.
    pub async fn enqueue(
        &self,
        asset_path: &str,
        prompt: &str,
        session_hash: &str,
    ) -> Result<(), BridgeError> {
        let payload = QueueJoinPayload::new(
            FileData::new(asset_path),
            self.effective_prompt(prompt).to_string(),
            &self.sampling,
            self.fn_index,
            session_hash.to_string(),
        );
        let body = serde_json::to_vec(&payload)
            .map_err(|err| BridgeError::Internal(format!("Queue payload encode failed: {err}")))?;

        let response = self
            .http
            .post(format!("{}{QUEUE_JOIN_PATH}", self.origin))
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, self.user_agent.as_str())
            .body(body)
            .send()
            .await
            .map_err(|err| BridgeError::Transport(format!("Queue join request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Enqueue {
                status: status.as_u16(),
                message: read_error_snippet(response).await,
            });
        }
        Ok(())
    }

    /// Open the per-session event channel and decode it lazily.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::StreamConnect`] when the channel cannot be
    /// established with a success status.
    pub async fn open_events(
        &self,
        session_hash: &str,
    ) -> Result<impl Stream<Item = Result<QueueEvent, BridgeError>> + Send + 'static, BridgeError>
    {
        let response = self
            .http
            .get(format!("{}{QUEUE_DATA_PATH}", self.origin))
            .query(&[("session_hash", session_hash)])
            .header(ACCEPT, "text/event-stream")
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await
            .map_err(|err| {
                BridgeError::Transport(format!("Event channel request failed: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::StreamConnect {
                status: status.as_u16(),
                message: read_error_snippet(response).await,
            });
        }

        Ok(queue_event_stream(response.bytes_stream()))
    }

    fn effective_prompt<'a>(&'a self, prompt: &'a str) -> &'a str {
        if prompt.trim().is_empty() {
            &self.default_prompt
        } else {
            prompt
        }
    }
}

async fn read_error_snippet(response: reqwest::Response) -> String {
    let Ok(text) = response.text().await else {
        return String::new();
    };
    let trimmed = text.trim();
    if trimmed.len() <= ERROR_BODY_SNIPPET_MAX {
        return trimmed.to_string();
    }
    let mut end = ERROR_BODY_SNIPPET_MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
