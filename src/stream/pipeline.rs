//! The streaming phase of the caption pipeline.
//!
//! By the time this module runs, the image is uploaded and the job enqueued.
//! The returned response body lazily opens the upstream event channel, then
//! decodes, diffs, and re-frames events one at a time. Chunks reach the
//! caller in decode order, with no whole-response buffering. Dropping the
//! body (caller disconnect) drops the upstream read with it.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use axum::response::Response;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::BridgeError;
use crate::observability;
use crate::protocol::gradio::{EventKind, QueueEvent};
use crate::state::AppState;
use crate::stream::diff::snapshot_delta;
use crate::stream::translator::ChunkTranslator;

type EventStream = Pin<Box<dyn Stream<Item = Result<QueueEvent, BridgeError>> + Send>>;

/// Build the streaming SSE response for an enqueued job.
#[must_use]
pub fn streaming_response(
    app: Arc<AppState>,
    session_hash: String,
    translator: ChunkTranslator,
) -> Response {
    let chunks =
        caption_chunk_stream(app, session_hash, translator).map(Ok::<Bytes, Infallible>);
    sse_ok_response(axum::body::Body::from_stream(chunks))
}

fn sse_ok_response(body: axum::body::Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

struct PipelineState {
    app: Arc<AppState>,
    session_hash: String,
    translator: ChunkTranslator,
    events: Option<EventStream>,
    prev_len: usize,
    pending: VecDeque<Bytes>,
    content_chunks: usize,
    content_bytes: usize,
    started: Instant,
    finished: bool,
}

impl PipelineState {
    fn absorb_event(&mut self, event: &QueueEvent) {
        match event.kind() {
            EventKind::Generating | EventKind::Completed => {
                let snapshot = event.snapshot();
                if let Some(delta) = snapshot_delta(self.prev_len, snapshot) {
                    self.pending
                        .push_back(Bytes::from(self.translator.content_chunk(delta)));
                    self.content_chunks += 1;
                    self.content_bytes += delta.len();
                    self.prev_len = snapshot.len();
                }
                if event.kind() == EventKind::Completed {
                    self.terminate();
                }
            }
            EventKind::Other => {}
        }
    }

    /// Queue the stop chunk and the `[DONE]` marker. Also used when the
    /// upstream closes without an explicit terminal event, so the outbound
    /// stream always ends well-formed.
    fn terminate(&mut self) {
        self.pending
            .push_back(Bytes::from(self.translator.stop_chunk()));
        self.pending
            .push_back(Bytes::from(ChunkTranslator::done_frame()));
        self.finish();
    }

    fn fail(&mut self, err: &BridgeError) {
        tracing::warn!(error = %err, "caption stream failed mid-pipeline");
        self.pending
            .push_back(Bytes::from(self.translator.error_chunk(&err.to_string())));
        self.finish();
    }

    fn finish(&mut self) {
        self.finished = true;
        observability::log_stream_complete(
            self.translator.model(),
            self.content_chunks,
            self.content_bytes,
            self.started,
        );
    }
}

/// The chunk sequence for one job: connect lazily, then decode → diff →
/// translate, yielding frames in event order.
pub fn caption_chunk_stream(
    app: Arc<AppState>,
    session_hash: String,
    translator: ChunkTranslator,
) -> impl Stream<Item = Bytes> + Send {
    futures_util::stream::unfold(
        PipelineState {
            app,
            session_hash,
            translator,
            events: None,
            prev_len: 0,
            pending: VecDeque::with_capacity(4),
            content_chunks: 0,
            content_bytes: 0,
            started: Instant::now(),
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(chunk) = state.pending.pop_front() {
                    return Some((chunk, state));
                }
                if state.finished {
                    return None;
                }

                if state.events.is_none() {
                    match state.app.client.open_events(&state.session_hash).await {
                        Ok(events) => state.events = Some(Box::pin(events)),
                        Err(err) => {
                            state.fail(&err);
                            continue;
                        }
                    }
                }
                let Some(events) = state.events.as_mut() else {
                    continue;
                };

                match events.next().await {
                    Some(Ok(event)) => state.absorb_event(&event),
                    Some(Err(err)) => state.fail(&err),
                    // Upstream closed without a terminal event: force one.
                    None => state.terminate(),
                }
            }
        },
    )
}
