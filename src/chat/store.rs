//! In-memory conversation store.
//!
//! Holds one message list per conversation plus the creation-ordered list
//! of titles. The working copy of the active conversation lives with the
//! caller; it must be handed back through [`ConversationStore::commit`]
//! before another conversation is loaded, otherwise unsaved edits are lost.

use std::collections::HashMap;

use super::error::{ChatError, ChatResult};
use super::ids::ConversationId;
use super::types::{ConversationMeta, Message};

/// Keyed collection of message lists with one active conversation.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    conversations: Vec<ConversationMeta>,
    messages: HashMap<ConversationId, Vec<Message>>,
    active: ConversationId,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Create a store holding one empty, active conversation.
    #[must_use]
    pub fn new() -> Self {
        let mut store = Self {
            conversations: Vec::new(),
            messages: HashMap::new(),
            active: ConversationId::new(),
        };
        store.active = store.create();
        store
    }

    /// Register a new empty conversation titled `Conversation N`.
    ///
    /// Does not switch to it.
    pub fn create(&mut self) -> ConversationId {
        let mut id = ConversationId::new();
        while self.messages.contains_key(&id) {
            id = ConversationId::new();
        }

        let title = format!("Conversation {}", self.conversations.len() + 1);
        self.conversations.push(ConversationMeta { id, title });
        self.messages.insert(id, Vec::new());
        tracing::debug!(conversation_id = %id, "Created conversation");
        id
    }

    /// Identifier of the active conversation.
    #[must_use]
    pub const fn active_id(&self) -> ConversationId {
        self.active
    }

    /// Committed messages of the active conversation.
    #[must_use]
    pub fn active_messages(&self) -> &[Message] {
        self.messages
            .get(&self.active)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Make `id` the active conversation and return its committed messages.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `id` is unknown.
    pub fn set_active(&mut self, id: ConversationId) -> ChatResult<&[Message]> {
        let messages = self
            .messages
            .get(&id)
            .ok_or_else(|| unknown_conversation(id))?;
        self.active = id;
        Ok(messages)
    }

    /// Store `messages` as the committed state of `id`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `id` is unknown.
    pub fn commit(&mut self, id: ConversationId, messages: Vec<Message>) -> ChatResult<()> {
        let slot = self
            .messages
            .get_mut(&id)
            .ok_or_else(|| unknown_conversation(id))?;
        *slot = messages;
        Ok(())
    }

    /// Committed messages of any known conversation.
    #[must_use]
    pub fn messages(&self, id: ConversationId) -> Option<&[Message]> {
        self.messages.get(&id).map(Vec::as_slice)
    }

    /// Whether `id` is a known conversation.
    #[must_use]
    pub fn exists(&self, id: ConversationId) -> bool {
        self.messages.contains_key(&id)
    }

    /// All conversations in creation order.
    #[must_use]
    pub fn conversations(&self) -> &[ConversationMeta] {
        &self.conversations
    }
}

fn unknown_conversation(id: ConversationId) -> ChatError {
    ChatError::InvalidArgument(format!("unknown conversation {id}"))
}
