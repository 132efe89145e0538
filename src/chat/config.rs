//! Configuration for the chat client.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{ChatError, ChatResult};

/// Default streaming endpoint of the travel assistant backend.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/chat";

/// Environment variable overriding the endpoint.
const ENDPOINT_ENV: &str = "TRAVEL_CHAT_ENDPOINT";
/// Environment variable selecting `live` or `mock`.
const MODE_ENV: &str = "TRAVEL_CHAT_MODE";
/// Environment variable for the per-character reveal interval (ms).
const REVEAL_ENV: &str = "TRAVEL_CHAT_REVEAL_MS";
/// Environment variable for the send cooldown (ms).
const COOLDOWN_ENV: &str = "TRAVEL_CHAT_COOLDOWN_MS";
/// Environment variable toggling transport failure messages.
const SURFACE_ENV: &str = "TRAVEL_CHAT_SURFACE_TRANSPORT_ERRORS";

/// Where assistant replies come from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Stream from the backend over server-sent events.
    Live,
    /// Answer from the canned offline reply table.
    Mock,
}

impl Default for ChatMode {
    fn default() -> Self {
        if cfg!(feature = "mock") {
            Self::Mock
        } else {
            Self::Live
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for ChatMode {
    type Err = ChatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "mock" | "offline" => Ok(Self::Mock),
            other => Err(ChatError::InvalidConfig(format!(
                "unknown chat mode `{other}` (expected `live` or `mock`)"
            ))),
        }
    }
}

/// Configuration for the chat client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Streaming endpoint (`GET`, server-sent events).
    pub endpoint: String,
    /// Live network path or canned replies.
    pub mode: ChatMode,
    /// Time between two revealed characters.
    #[serde(with = "duration_ms")]
    pub reveal_interval: Duration,
    /// Minimum interval between accepted sends.
    #[serde(with = "duration_ms")]
    pub send_cooldown: Duration,
    /// HTTP connect timeout.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Surface transport failures as an assistant message.
    pub surface_transport_errors: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            mode: ChatMode::default(),
            reveal_interval: Duration::from_millis(10),
            send_cooldown: Duration::from_millis(3000),
            connect_timeout: Duration::from_secs(10),
            surface_transport_errors: true,
        }
    }
}

impl ChatConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults overridden by `TRAVEL_CHAT_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if a variable holds an unparsable value or the
    /// resulting configuration is invalid.
    pub fn from_env() -> ChatResult<Self> {
        let mut config = Self::default();

        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            config.endpoint = endpoint;
        }
        if let Ok(mode) = std::env::var(MODE_ENV) {
            config.mode = mode.parse()?;
        }
        if let Some(ms) = env_u64(REVEAL_ENV)? {
            config.reveal_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64(COOLDOWN_ENV)? {
            config.send_cooldown = Duration::from_millis(ms);
        }
        if let Ok(flag) = std::env::var(SURFACE_ENV) {
            config.surface_transport_errors = parse_flag(SURFACE_ENV, &flag)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the streaming endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the reply mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the per-character reveal interval.
    #[must_use]
    pub const fn with_reveal_interval(mut self, interval: Duration) -> Self {
        self.reveal_interval = interval;
        self
    }

    /// Set the send cooldown.
    #[must_use]
    pub const fn with_send_cooldown(mut self, cooldown: Duration) -> Self {
        self.send_cooldown = cooldown;
        self
    }

    /// Choose whether transport failures produce a visible message.
    #[must_use]
    pub const fn with_surface_transport_errors(mut self, surface: bool) -> Self {
        self.surface_transport_errors = surface;
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        if self.reveal_interval.is_zero() {
            return Err(ChatError::InvalidConfig(
                "reveal_interval must be > 0".to_string(),
            ));
        }

        if self.mode == ChatMode::Live {
            let url = Url::parse(&self.endpoint)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ChatError::InvalidConfig(format!(
                    "endpoint scheme must be http or https, got `{}`",
                    url.scheme()
                )));
            }
        }

        Ok(())
    }
}

fn env_u64(name: &str) -> ChatResult<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ChatError::InvalidConfig(format!("{name} must be an integer, got `{raw}`"))),
        Err(_) => Ok(None),
    }
}

fn parse_flag(name: &str, raw: &str) -> ChatResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ChatError::InvalidConfig(format!(
            "{name} must be a boolean, got `{raw}`"
        ))),
    }
}

/// Serde module for millisecond `Duration`s.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChatConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.reveal_interval, Duration::from_millis(10));
        assert_eq!(config.send_cooldown, Duration::from_millis(3000));
        assert!(config.surface_transport_errors);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ChatConfig::new()
            .with_endpoint("https://travel.example/chat")
            .with_mode(ChatMode::Mock)
            .with_reveal_interval(Duration::from_millis(1))
            .with_send_cooldown(Duration::ZERO)
            .with_surface_transport_errors(false);

        assert_eq!(config.endpoint, "https://travel.example/chat");
        assert_eq!(config.mode, ChatMode::Mock);
        assert_eq!(config.send_cooldown, Duration::ZERO);
        assert!(!config.surface_transport_errors);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = ChatConfig::new().with_reveal_interval(Duration::ZERO);
        assert!(matches!(zero.validate(), Err(ChatError::InvalidConfig(_))));

        let ftp = ChatConfig::new()
            .with_mode(ChatMode::Live)
            .with_endpoint("ftp://127.0.0.1/chat");
        assert!(matches!(ftp.validate(), Err(ChatError::InvalidConfig(_))));

        let garbage = ChatConfig::new()
            .with_mode(ChatMode::Live)
            .with_endpoint("not a url");
        assert!(matches!(garbage.validate(), Err(ChatError::Url(_))));
    }

    #[test]
    fn test_mock_mode_skips_endpoint_check() {
        let config = ChatConfig::new()
            .with_mode(ChatMode::Mock)
            .with_endpoint("not a url");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("LIVE".parse::<ChatMode>().unwrap(), ChatMode::Live);
        assert_eq!("offline".parse::<ChatMode>().unwrap(), ChatMode::Mock);
        assert!("sometimes".parse::<ChatMode>().is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("X", "on").unwrap());
        assert!(!parse_flag("X", "0").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }

    #[test]
    fn test_serde_uses_millis() {
        let json = serde_json::to_value(ChatConfig::default()).unwrap();
        assert_eq!(json["reveal_interval"], 10);
        assert_eq!(json["send_cooldown"], 3000);
    }
}
