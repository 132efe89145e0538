//! Development backend configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::{ChatError, ChatResult};

/// Default server port, matching the client's default endpoint.
pub const DEFAULT_PORT: u16 = 8000;

/// Default Ollama model when the Ollama reply source is enabled.
pub const DEFAULT_MODEL: &str = "mistral:7b-instruct-q8_0";

const PORT_ENV: &str = "TRAVEL_CHAT_PORT";
const OLLAMA_URL_ENV: &str = "TRAVEL_CHAT_OLLAMA_URL";
const MODEL_ENV: &str = "TRAVEL_CHAT_MODEL";
const CONTEXT_PATH_ENV: &str = "TRAVEL_CHAT_CONTEXT_PATH";

/// Settings for `travel-chat-server`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// Ollama base URL; canned replies are served when unset.
    pub ollama_url: Option<String>,
    /// Ollama model name.
    pub model: String,
    /// How long Ollama keeps the model loaded between requests.
    pub keep_alive: String,
    /// Text document used to ground Ollama replies.
    pub context_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            ollama_url: None,
            model: DEFAULT_MODEL.to_string(),
            keep_alive: "5m".to_string(),
            context_path: None,
        }
    }
}

impl ServerConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `TRAVEL_CHAT_PORT`, `TRAVEL_CHAT_OLLAMA_URL`,
    /// `TRAVEL_CHAT_MODEL` and `TRAVEL_CHAT_CONTEXT_PATH`.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if a variable cannot be parsed or the result
    /// does not validate.
    pub fn from_env() -> ChatResult<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(PORT_ENV) {
            config.port = raw.trim().parse().map_err(|_| {
                ChatError::InvalidConfig(format!("{PORT_ENV} must be a port number, got {raw:?}"))
            })?;
        }
        if let Ok(url) = std::env::var(OLLAMA_URL_ENV) {
            if !url.trim().is_empty() {
                config.ollama_url = Some(url.trim().to_string());
            }
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            config.model = model;
        }
        if let Ok(path) = std::env::var(CONTEXT_PATH_ENV) {
            if !path.trim().is_empty() {
                config.context_path = Some(path.trim().to_string());
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Set the listening port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Serve replies from an Ollama instance at `url`.
    #[must_use]
    pub fn with_ollama(mut self, url: impl Into<String>) -> Self {
        self.ollama_url = Some(url.into());
        self
    }

    /// Set the Ollama model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Ground replies in the text document at `path`.
    #[must_use]
    pub fn with_context_path(mut self, path: impl Into<String>) -> Self {
        self.context_path = Some(path.into());
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for an unusable Ollama URL or an empty model.
    pub fn validate(&self) -> ChatResult<()> {
        if let Some(raw) = &self.ollama_url {
            let url = Url::parse(raw)
                .map_err(|e| ChatError::InvalidConfig(format!("ollama url {raw:?}: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ChatError::InvalidConfig(format!(
                    "ollama url must be http or https, got {}",
                    url.scheme()
                )));
            }
            if self.model.trim().is_empty() {
                return Err(ChatError::InvalidConfig(
                    "model must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
