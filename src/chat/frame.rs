//! Wire format of the assistant stream.
//!
//! The backend answers with server-sent events whose `data:` payload is a
//! small JSON object tagged by `type` (`content`, `done` or `error`).

use serde::{Deserialize, Serialize};

use super::error::{ChatError, ChatResult};

/// Longest line or event the decoder buffers before giving up on the stream.
pub const MAX_EVENT_BYTES: usize = 1 << 20;

/// One typed frame pushed by the backend.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// A fragment of assistant output, of any length.
    Content {
        /// Fragment text.
        content: String,
    },
    /// Terminal: no further frames will arrive.
    Done {
        /// Conversation the server recorded the turn under.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    /// Terminal: the server failed to produce a reply.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl StreamFrame {
    /// Build a content frame.
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content {
            content: text.into(),
        }
    }

    /// Build an error frame.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether no further frames follow this one.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Decode a frame from an event payload.
    ///
    /// # Errors
    /// Returns an error if the payload is not a known frame.
    pub fn from_json(payload: &str) -> ChatResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Incremental server-sent events decoder.
///
/// Bytes may arrive split at any position, including inside a multi-byte
/// character; only complete lines are interpreted. A line or event longer
/// than [`MAX_EVENT_BYTES`] is rejected.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data_lines: Vec<String>,
    data_bytes: usize,
}

impl SseDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body and collect every event payload
    /// completed by it, in arrival order.
    ///
    /// # Errors
    /// Returns `Transport` once a line or an event grows past
    /// [`MAX_EVENT_BYTES`].
    pub fn push(&mut self, chunk: &[u8]) -> ChatResult<Vec<String>> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.pending[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let mut line = &self.pending[consumed..end];
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            let line = String::from_utf8_lossy(line).into_owned();
            if let Some(payload) = self.handle_line(&line)? {
                payloads.push(payload);
            }
            consumed = end + 1;
        }
        self.pending.drain(..consumed);

        if self.pending.len() > MAX_EVENT_BYTES {
            return Err(oversized("line"));
        }
        Ok(payloads)
    }

    /// Whether a partial line or event is still buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty() || !self.data_lines.is_empty()
    }

    fn handle_line(&mut self, line: &str) -> ChatResult<Option<String>> {
        if line.is_empty() {
            if self.data_lines.is_empty() {
                return Ok(None);
            }
            let payload = self.data_lines.join("\n");
            self.data_lines.clear();
            self.data_bytes = 0;
            return Ok(Some(payload));
        }

        if line.starts_with(':') {
            return Ok(None);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data_bytes += value.len() + 1;
            if self.data_bytes > MAX_EVENT_BYTES {
                return Err(oversized("event"));
            }
            self.data_lines.push(value.to_string());
        }
        Ok(None)
    }
}

fn oversized(what: &str) -> ChatError {
    ChatError::Transport(format!("stream {what} exceeds {MAX_EVENT_BYTES} bytes"))
}
