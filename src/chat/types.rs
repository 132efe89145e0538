//! Message and conversation models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ids::ConversationId;

/// Prefix placed in front of surfaced error text.
pub const ERROR_MARKER: &str = "⚠️ Error:";

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The person typing.
    User,
    /// The travel assistant.
    Assistant,
}

impl Sender {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// A single rendered chat message.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote it.
    pub sender: Sender,
    /// Message body.
    pub text: String,
}

impl Message {
    /// Build a user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
        }
    }

    /// Build an assistant message that surfaces an error.
    #[must_use]
    pub fn error(detail: &str) -> Self {
        Self::assistant(format!("{ERROR_MARKER} {detail}"))
    }

    /// Whether this message was written by the assistant.
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.sender == Sender::Assistant
    }
}

/// Conversation entry shown in the conversation picker.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationMeta {
    /// Unique identifier.
    pub id: ConversationId,
    /// Display title.
    pub title: String,
}

/// Publish `text` into the trailing assistant message of `messages`.
///
/// Overwrites the trailing message when it is an assistant message,
/// otherwise appends a new one.
pub fn publish_trailing(messages: &mut Vec<Message>, text: &str) {
    match messages.last_mut() {
        Some(last) if last.is_assistant() => {
            last.text.clear();
            last.text.push_str(text);
        }
        _ => messages.push(Message::assistant(text)),
    }
}
