//! AI-feedback event stream consumer.
//!
//! The server pushes generated commentary as a line-oriented event stream
//! over a long-lived chunked response body. Records are separated by a blank
//! line; within a record, `event:` lines set the type and `data:` lines carry
//! payload. Chunk boundaries are arbitrary — a record, a line, or even a
//! single UTF-8 sequence can be split across reads — so all framing happens
//! against an internal buffer.

use futures_util::StreamExt;

use crate::api::ApiClient;
use crate::error::{ApiError, ApiResult};

/// One complete record, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackEvent {
    /// Content delta: append to the accumulator, forward to the caller.
    Delta(String),
    /// Explicit terminator; stop reading, no error.
    Done,
    /// Failure pushed by the server; abort consumption.
    Error(String),
}

/// Buffers raw bytes and yields complete records.
///
/// Holds back incomplete UTF-8 suffixes between pushes and retains any
/// trailing partial record until more input arrives.
#[derive(Debug, Default)]
pub struct EventStreamBuffer {
    /// Undecoded bytes (at most one partial UTF-8 sequence).
    pending: Vec<u8>,
    /// Decoded text not yet consumed as records.
    text: String,
}

impl EventStreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    if let Ok(prefix) = std::str::from_utf8(&self.pending[..valid_up_to]) {
                        self.text.push_str(prefix);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            // Invalid sequence mid-stream; substitute and move on.
                            self.text.push('\u{FFFD}');
                            self.pending.drain(..valid_up_to + bad);
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            self.pending.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Next complete record, if a blank-line separator has arrived.
    pub fn next_record(&mut self) -> Option<String> {
        let idx = self.text.find("\n\n")?;
        let record = self.text[..idx].to_string();
        self.text.drain(..idx + 2);
        Some(record)
    }
}

/// Parse one complete record.
///
/// `event:` sets the record type (trimmed). Each `data:` line contributes
/// payload: exactly one leading space after the colon is stripped, all other
/// whitespace is preserved verbatim (payload may be prose or markdown with
/// intentional spacing). Multiple data lines join with `\n`. Anything else is
/// ignored.
pub fn parse_record(record: &str) -> FeedbackEvent {
    let mut event_type: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in record.split('\n') {
        if let Some(rest) = line.strip_prefix("event:") {
            event_type = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    let data = data_lines.join("\n");
    match event_type {
        Some("error") => FeedbackEvent::Error(if data.is_empty() {
            "AI stream error".to_string()
        } else {
            data
        }),
        Some("done") => FeedbackEvent::Done,
        _ => FeedbackEvent::Delta(data),
    }
}

/// Consumer for the server-pushed AI-feedback stream.
///
/// Shares the [`ApiClient`]'s cookie-bearing transport and its one-shot 401
/// recovery on the initial handshake, but runs its own body-reading loop.
#[derive(Clone)]
pub struct StreamClient {
    api: ApiClient,
}

impl StreamClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// GET /api/v1/diaries/{id}/ai-feedback and consume the stream.
    ///
    /// `on_delta` is invoked for every non-empty content delta as it arrives.
    /// Returns the full concatenation of all deltas (outer whitespace
    /// trimmed) when a `done` record arrives or the transport ends; fails
    /// with [`ApiError::StreamProtocol`] on an explicit `error` record.
    /// Dropping the returned future closes the connection and ends the loop.
    pub async fn ai_feedback<F>(&self, diary_id: i64, mut on_delta: F) -> ApiResult<String>
    where
        F: FnMut(&str),
    {
        let _guard = self.api.begin();
        let result = self.consume(diary_id, &mut on_delta).await;
        if let Err(ref err) = result {
            self.api.record_error(err);
        }
        result
    }

    async fn consume<F>(&self, diary_id: i64, on_delta: &mut F) -> ApiResult<String>
    where
        F: FnMut(&str),
    {
        let path = format!("/api/v1/diaries/{}/ai-feedback", diary_id);
        let response = self.api.open_event_stream(&path).await?;

        let mut buffer = EventStreamBuffer::new();
        let mut accumulated = String::new();
        let mut body = response.bytes_stream();

        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ApiError::Network(e.to_string()))?;
            buffer.push(&chunk);
            while let Some(record) = buffer.next_record() {
                match parse_record(&record) {
                    FeedbackEvent::Error(message) => {
                        tracing::warn!(diary_id, "feedback stream reported an error");
                        return Err(ApiError::StreamProtocol(message));
                    }
                    FeedbackEvent::Done => break 'read,
                    FeedbackEvent::Delta(text) => {
                        if !text.is_empty() {
                            accumulated.push_str(&text);
                            on_delta(&text);
                        }
                    }
                }
            }
        }

        // Transport close with no terminal record counts as completion.
        Ok(accumulated.trim().to_string())
    }
}
