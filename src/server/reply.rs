//! Reply producers behind the `/chat` endpoint.
//!
//! A [`ReplySource`] pushes assistant fragments into a channel as they are
//! produced. Returning `Ok` means the reply is complete; an error ends the
//! stream with an `error` frame.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::chat::mock::word_fragments;
use crate::chat::{CannedReplies, ChatError, ChatResult, Message, Sender};

const SYSTEM_PREAMBLE: &str = "You are a helpful assistant for accessible travel. Answer \
questions about wheelchair-friendly destinations, airport assistance, and travellers' rights \
under the ADA and the Air Carrier Access Act. If you are not sure, say so and give a \
best-effort answer.";

const CONTEXT_INSTRUCTIONS: &str = "Use the travel guide below when it is relevant. If the \
answer is in the guide, cite the section or page briefly (for example 'See Page 5'). If the \
guide does not cover it, say so and give a best-effort answer.";

const CONTEXT_START: &str = "--- CONTEXT START ---";
const CONTEXT_END: &str = "--- CONTEXT END ---";

/// Produces the assistant side of one turn.
#[async_trait]
pub trait ReplySource: Send + Sync {
    /// Short name for logs and `/health`.
    fn name(&self) -> &'static str;

    /// Stream the reply to `message` given the prior `history` and the
    /// optional grounding document.
    ///
    /// Fragments go to `fragments`; a closed receiver means the client left
    /// and is not an error.
    async fn stream_reply(
        &self,
        history: &[Message],
        message: &str,
        context: Option<&str>,
        fragments: mpsc::Sender<String>,
    ) -> ChatResult<()>;
}

/// Offline replies from the keyword table.
pub struct CannedReplySource {
    replies: CannedReplies,
}

impl CannedReplySource {
    /// Compile the reply table.
    ///
    /// # Errors
    /// Returns an error if a keyword pattern is invalid.
    pub fn new() -> ChatResult<Self> {
        Ok(Self {
            replies: CannedReplies::new()?,
        })
    }
}

#[async_trait]
impl ReplySource for CannedReplySource {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn stream_reply(
        &self,
        _history: &[Message],
        message: &str,
        _context: Option<&str>,
        fragments: mpsc::Sender<String>,
    ) -> ChatResult<()> {
        for fragment in word_fragments(self.replies.reply_for(message)) {
            if fragments.send(fragment.to_string()).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    keep_alive: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Streaming replies from a local Ollama through `/api/generate`.
pub struct OllamaReplies {
    client: reqwest::Client,
    generate_url: Url,
    model: String,
    keep_alive: String,
}

impl OllamaReplies {
    /// Build a client for the Ollama instance at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, model: &str, keep_alive: &str) -> ChatResult<Self> {
        let generate_url = Url::parse(base_url)?.join("/api/generate")?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            generate_url,
            model: model.to_string(),
            keep_alive: keep_alive.to_string(),
        })
    }
}

/// Flatten the conversation into a single completion prompt, with the
/// grounding document between markers when one is loaded.
fn build_prompt(history: &[Message], message: &str, context: Option<&str>) -> String {
    let mut prompt = String::from(SYSTEM_PREAMBLE);
    prompt.push_str("\n\n");
    if let Some(context) = context.filter(|text| !text.is_empty()) {
        prompt.push_str(CONTEXT_INSTRUCTIONS);
        prompt.push_str("\n\n");
        prompt.push_str(CONTEXT_START);
        prompt.push('\n');
        prompt.push_str(context);
        prompt.push('\n');
        prompt.push_str(CONTEXT_END);
        prompt.push_str("\n\n");
    }
    for turn in history {
        let role = match turn.sender {
            Sender::User => "User",
            Sender::Assistant => "Assistant",
        };
        prompt.push_str(role);
        prompt.push_str(": ");
        prompt.push_str(&turn.text);
        prompt.push('\n');
    }
    prompt.push_str("User: ");
    prompt.push_str(message);
    prompt.push_str("\nAssistant:");
    prompt
}

/// Split complete NDJSON lines off `pending`.
fn take_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&line).trim().to_string();
        if !text.is_empty() {
            lines.push(text);
        }
    }
    lines
}

#[async_trait]
impl ReplySource for OllamaReplies {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn stream_reply(
        &self,
        history: &[Message],
        message: &str,
        context: Option<&str>,
        fragments: mpsc::Sender<String>,
    ) -> ChatResult<()> {
        let prompt = build_prompt(history, message, context);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: true,
            keep_alive: &self.keep_alive,
        };
        debug!(model = %self.model, prompt_chars = prompt.len(), "Requesting Ollama generation");

        let response = self
            .client
            .post(self.generate_url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let mut stream = Box::pin(response.bytes_stream());
        let mut pending = Vec::new();
        while let Some(chunk) = stream.next().await {
            pending.extend_from_slice(&chunk?);
            for line in take_lines(&mut pending) {
                let parsed: GenerateChunk = serde_json::from_str(&line)?;
                if let Some(error) = parsed.error {
                    return Err(ChatError::Stream(error));
                }
                if !parsed.response.is_empty() && fragments.send(parsed.response).await.is_err() {
                    return Ok(());
                }
                if parsed.done {
                    return Ok(());
                }
            }
        }
        Err(ChatError::Transport(
            "ollama stream ended before completion".to_string(),
        ))
    }
}
