//! State shared by the request handlers.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::chat::{ChatResult, Message};

use super::config::ServerConfig;
use super::context::load_context;
use super::reply::{CannedReplySource, OllamaReplies, ReplySource};

/// Per-conversation history plus the reply producer.
pub struct AppState {
    /// Turns recorded per conversation id.
    conversations: DashMap<String, Vec<Message>>,
    /// Producer of assistant replies.
    pub replies: Arc<dyn ReplySource>,
    /// Grounding document passed to every reply.
    context: Option<Arc<str>>,
}

impl AppState {
    /// Create state around an explicit reply source.
    #[must_use]
    pub fn with_replies(replies: Arc<dyn ReplySource>) -> Arc<Self> {
        Arc::new(Self {
            conversations: DashMap::new(),
            replies,
            context: None,
        })
    }

    /// Create state around a reply source and a loaded grounding document.
    #[must_use]
    pub fn with_context(replies: Arc<dyn ReplySource>, context: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            conversations: DashMap::new(),
            replies,
            context: Some(context.into()).filter(|text: &Arc<str>| !text.is_empty()),
        })
    }

    /// Create state from configuration: Ollama when a URL is set, canned
    /// replies otherwise.
    ///
    /// A context document that cannot be loaded is logged and the server
    /// runs without it.
    ///
    /// # Errors
    /// Returns an error if the reply source cannot be built.
    pub fn from_config(config: &ServerConfig) -> ChatResult<Arc<Self>> {
        let replies: Arc<dyn ReplySource> = match &config.ollama_url {
            Some(url) => Arc::new(OllamaReplies::new(url, &config.model, &config.keep_alive)?),
            None => Arc::new(CannedReplySource::new()?),
        };
        info!(replies = replies.name(), "Reply source ready");

        let context = config.context_path.as_deref().and_then(|path| {
            load_context(path)
                .map_err(|err| warn!(path, error = %err, "Context document unavailable"))
                .ok()
        });
        Ok(match context {
            Some(text) => Self::with_context(replies, text),
            None => Self::with_replies(replies),
        })
    }

    /// Shared handle to the grounding document, if one is loaded.
    #[must_use]
    pub fn context(&self) -> Option<Arc<str>> {
        self.context.clone()
    }

    /// Length of the grounding document in characters.
    #[must_use]
    pub fn context_chars(&self) -> usize {
        self.context.as_deref().map_or(0, |text| text.chars().count())
    }

    /// Resolve the conversation for a request. A missing id gets a fresh one;
    /// an unknown id is registered as given.
    pub fn ensure_conversation(&self, requested: Option<&str>) -> String {
        let id = match requested.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        self.conversations.entry(id.clone()).or_default();
        id
    }

    /// Snapshot of the recorded turns.
    #[must_use]
    pub fn history(&self, id: &str) -> Vec<Message> {
        self.conversations
            .get(id)
            .map(|turns| turns.clone())
            .unwrap_or_default()
    }

    /// Append one turn.
    pub fn record(&self, id: &str, message: Message) {
        self.conversations
            .entry(id.to_string())
            .or_default()
            .push(message);
    }

    /// Number of known conversations.
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Arc<AppState> {
        AppState::from_config(&ServerConfig::new()).unwrap()
    }

    #[test]
    fn test_missing_id_gets_fresh_conversation() {
        let state = state();
        let a = state.ensure_conversation(None);
        let b = state.ensure_conversation(Some("  "));
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
        assert_eq!(state.conversation_count(), 2);
    }

    #[test]
    fn test_unknown_id_is_kept() {
        let state = state();
        assert_eq!(state.ensure_conversation(Some("trip-1")), "trip-1");
        state.record("trip-1", Message::user("hello"));
        assert_eq!(state.ensure_conversation(Some("trip-1")), "trip-1");
        assert_eq!(state.history("trip-1"), [Message::user("hello")]);
        assert!(state.history("other").is_empty());
    }

    #[test]
    fn test_from_config_loads_context() {
        let path = std::env::temp_dir().join(format!("guide-{}.txt", uuid::Uuid::new_v4()));
        std::fs::write(&path, "Page 2: ramps.").unwrap();
        let config = ServerConfig::new().with_context_path(path.to_string_lossy());

        let state = AppState::from_config(&config).unwrap();
        assert_eq!(state.context().as_deref(), Some("Page 2: ramps."));
        assert_eq!(state.context_chars(), 14);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_context_is_not_fatal() {
        let config = ServerConfig::new().with_context_path("/nonexistent/travel-guide.txt");
        let state = AppState::from_config(&config).unwrap();
        assert!(state.context().is_none());
        assert_eq!(state.context_chars(), 0);
    }
}
