//! Decoder for the upstream per-session event channel.
//!
//! The channel is a long-lived byte stream of newline-delimited frames.
//! Only `data:`-prefixed lines whose payload parses as JSON are meaningful;
//! everything else (keep-alive comments, partial heartbeats, malformed
//! payloads) is silently discarded.

use std::pin::Pin;

use futures_util::Stream;
use memchr::memchr_iter;
use smallvec::SmallVec;

use crate::error::BridgeError;
use crate::protocol::gradio::{EventKind, QueueEvent};

// ---------------------------------------------------------------------------
// QueueEventParser — incremental line parser
// ---------------------------------------------------------------------------

/// Incremental event-frame parser.
///
/// Feed it raw text chunks (arriving at arbitrary byte boundaries) and it
/// yields fully-parsed [`QueueEvent`]s. The trailing incomplete line is held
/// back until the next chunk completes it.
pub struct QueueEventParser {
    buffer: String,
    read_offset: usize,
}

impl QueueEventParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
        }
    }

    /// Feed raw text and return any complete events parsed.
    pub fn feed(&mut self, chunk: &str) -> Vec<QueueEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete events into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<QueueEvent>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            if let Some(event) = Self::parse_line(line) {
                out.push(event);
            }
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Parse one complete line. Lines without the `data:` prefix and payloads
    /// that are not valid JSON are heartbeat noise, not protocol errors.
    fn parse_line(line: &str) -> Option<QueueEvent> {
        let payload = line.strip_prefix("data:")?;
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        serde_json::from_str(payload).ok()
    }
}

impl Default for QueueEventParser {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Stream combinator
// ---------------------------------------------------------------------------

struct PendingEvents {
    events: SmallVec<[QueueEvent; 8]>,
    head: usize,
}

impl PendingEvents {
    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        let mut events = SmallVec::new();
        events.reserve(capacity);
        Self { events, head: 0 }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<QueueEvent> {
        if self.head >= self.events.len() {
            return None;
        }
        let event = self.events[self.head].clone();
        self.head += 1;
        if self.head == self.events.len() {
            self.clear();
        }
        Some(event)
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<QueueEvent>) {
        if parsed.is_empty() {
            return;
        }
        self.events.reserve(parsed.len());
        self.events.extend(parsed.drain(..));
    }

    #[inline]
    fn clear(&mut self) {
        self.events.clear();
        self.head = 0;
    }
}

struct DecoderState<S> {
    stream: Pin<Box<S>>,
    parser: QueueEventParser,
    remainder: Vec<u8>,
    parsed: Vec<QueueEvent>,
    pending: PendingEvents,
    finished: bool,
}

impl<S> DecoderState<S> {
    /// Absorb one raw chunk: decode as much UTF-8 as is complete, carry the
    /// split tail over to the next chunk, and queue any parsed events.
    fn absorb(&mut self, bytes: &[u8]) {
        if self.remainder.is_empty() {
            match std::str::from_utf8(bytes) {
                Ok(text) => self.parser.feed_into(text, &mut self.parsed),
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&bytes[..valid_up_to]) {
                        self.parser.feed_into(text, &mut self.parsed);
                    }
                    self.remainder.extend_from_slice(&bytes[valid_up_to..]);
                }
            }
        } else {
            let mut buffered = std::mem::take(&mut self.remainder);
            buffered.extend_from_slice(bytes);
            match std::str::from_utf8(&buffered) {
                Ok(text) => {
                    self.parser.feed_into(text, &mut self.parsed);
                    buffered.clear();
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    if valid_up_to > 0 {
                        if let Ok(text) = std::str::from_utf8(&buffered[..valid_up_to]) {
                            self.parser.feed_into(text, &mut self.parsed);
                        }
                        buffered.copy_within(valid_up_to.., 0);
                        buffered.truncate(buffered.len() - valid_up_to);
                    }
                }
            }
            self.remainder = buffered;
        }
        self.pending.extend_from_vec(&mut self.parsed);
    }
}

/// Lift a raw byte stream into a lazy, ordered sequence of decoded events.
///
/// The sequence ends after a `process_completed` event has been yielded (no
/// further reads are issued) or when the underlying stream ends. A mid-stream
/// read failure surfaces as one `Err` item, after which the sequence ends:
/// the caller sees a fault, never a silent truncation.
pub fn queue_event_stream<S, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<QueueEvent, BridgeError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        DecoderState {
            stream: Box::pin(byte_stream),
            parser: QueueEventParser::new(),
            remainder: Vec::new(),
            parsed: Vec::with_capacity(8),
            pending: PendingEvents::with_capacity(8),
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    if event.kind() == EventKind::Completed {
                        // Terminal event: stop reading, drop anything queued after it.
                        state.finished = true;
                        state.pending.clear();
                    }
                    return Some((Ok(event), state));
                }
                if state.finished {
                    return None;
                }

                match state.stream.as_mut().next().await {
                    Some(Ok(bytes)) => state.absorb(&bytes),
                    Some(Err(err)) => {
                        state.finished = true;
                        return Some((
                            Err(BridgeError::Transport(format!(
                                "Event channel read failed: {err}"
                            ))),
                            state,
                        ));
                    }
                    None => return None,
                }
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::StreamExt;

    #[test]
    fn test_parse_single_event_line() {
        let mut parser = QueueEventParser::new();
        let events =
            parser.feed("data: {\"msg\":\"process_generating\",\"output\":{\"data\":[\"A\"]}}\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Generating);
        assert_eq!(events[0].snapshot(), "A");
    }

    #[test]
    fn test_incomplete_line_is_held_back() {
        let mut parser = QueueEventParser::new();
        assert!(parser.feed("data: {\"msg\":\"proc").is_empty());
        let events = parser.feed("ess_generating\"}\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Generating);
    }

    #[test]
    fn test_heartbeats_and_malformed_payloads_are_discarded() {
        let mut parser = QueueEventParser::new();
        let events = parser.feed(
            ": keep-alive\n\
             data: not json at all\n\
             \n\
             data: {\"msg\":\"process_completed\"}\n",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Completed);
    }

    #[test]
    fn test_lines_without_data_prefix_are_discarded() {
        let mut parser = QueueEventParser::new();
        assert!(parser.feed("event: ping\nretry: 1000\n").is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = QueueEventParser::new();
        let events = parser.feed("data: {\"msg\":\"process_completed\"}\r\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_data_no_space_after_colon() {
        let mut parser = QueueEventParser::new();
        let events = parser.feed("data:{\"msg\":\"process_generating\"}\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_multiple_events_in_one_chunk_stay_ordered() {
        let mut parser = QueueEventParser::new();
        let events = parser.feed(
            "data: {\"msg\":\"process_generating\",\"output\":{\"data\":[\"A\"]}}\n\
             data: {\"msg\":\"process_generating\",\"output\":{\"data\":[\"AB\"]}}\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].snapshot(), "A");
        assert_eq!(events[1].snapshot(), "AB");
    }

    fn byte_stream(
        chunks: Vec<Result<Bytes, String>>,
    ) -> impl Stream<Item = Result<Bytes, String>> + Send {
        futures_util::stream::iter(chunks)
    }

    #[tokio::test]
    async fn test_stream_stops_after_completed_event() {
        let source = byte_stream(vec![
            Ok(Bytes::from_static(
                b"data: {\"msg\":\"process_generating\",\"output\":{\"data\":[\"A\"]}}\n\
                  data: {\"msg\":\"process_completed\",\"output\":{\"data\":[\"A\"]}}\n\
                  data: {\"msg\":\"process_generating\",\"output\":{\"data\":[\"never\"]}}\n",
            )),
            Err("must not be read".to_string()),
        ]);

        let events: Vec<_> = queue_event_stream(source).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().kind(), EventKind::Generating);
        assert_eq!(events[1].as_ref().unwrap().kind(), EventKind::Completed);
    }

    #[tokio::test]
    async fn test_stream_ends_at_eof_without_terminal_event() {
        let source = byte_stream(vec![Ok(Bytes::from_static(
            b"data: {\"msg\":\"process_generating\",\"output\":{\"data\":[\"A\"]}}\n",
        ))]);
        let events: Vec<_> = queue_event_stream(source).collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[tokio::test]
    async fn test_mid_stream_fault_surfaces_as_err_item() {
        let source = byte_stream(vec![
            Ok(Bytes::from_static(
                b"data: {\"msg\":\"process_generating\",\"output\":{\"data\":[\"A\"]}}\n",
            )),
            Err("connection reset".to_string()),
        ]);
        let events: Vec<_> = queue_event_stream(source).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        let err = events[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_utf8_sequence_split_across_chunks() {
        let frame = "data: {\"msg\":\"process_generating\",\"output\":{\"data\":[\"café\"]}}\n";
        let raw = frame.as_bytes();
        // Split inside the two-byte 'é'.
        let split = raw.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let source = byte_stream(vec![
            Ok(Bytes::copy_from_slice(&raw[..split])),
            Ok(Bytes::copy_from_slice(&raw[split..])),
        ]);
        let events: Vec<_> = queue_event_stream(source).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().snapshot(), "café");
    }

    #[tokio::test]
    async fn test_frame_split_across_chunks() {
        let source = byte_stream(vec![
            Ok(Bytes::from_static(b"data: {\"msg\":\"proce")),
            Ok(Bytes::from_static(b"ss_completed\"}\n")),
        ]);
        let events: Vec<_> = queue_event_stream(source).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().kind(), EventKind::Completed);
    }
}
