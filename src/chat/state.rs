//! Single-writer chat state.
//!
//! [`ChatState`] is a synchronous state machine with one mutation entry
//! point per user action, stream event and drain tick. It performs no I/O
//! and owns no timer, so every ordering rule can be exercised directly.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::config::ChatConfig;
use super::error::{ChatError, ChatResult};
use super::frame::StreamFrame;
use super::ids::{ConversationId, StreamTarget};
use super::send_gate::SendGate;
use super::session::StreamSession;
use super::source::{StreamEvent, StreamRequest};
use super::store::ConversationStore;
use super::types::{ConversationMeta, Message, publish_trailing};

/// Text shown when a connection fails without a structured error.
pub const TRANSPORT_FAILURE_TEXT: &str = "⚠️ Error sending message.";

/// Everything the presentation layer needs to render.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ChatView {
    /// Messages of the active conversation.
    pub messages: Vec<Message>,
    /// Waiting for the first token of a reply.
    pub waiting: bool,
    /// All conversations in creation order.
    pub conversations: Vec<ConversationMeta>,
    /// Active conversation.
    pub active: ConversationId,
    /// Last user-facing notice, e.g. a rejected send.
    pub notice: Option<String>,
}

/// How a stream event was applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventOutcome {
    /// The event did not belong to the live session.
    Stale,
    /// A fragment was queued.
    Queued {
        /// The drain was idle and must be armed.
        arm_drain: bool,
    },
    /// The connection closed normally; queued characters still drain.
    Closed,
    /// The session ended on an error.
    Failed,
}

/// How a drain tick was applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TickOutcome {
    /// The tick did not belong to the live session.
    Stale,
    /// Nothing was pending.
    Idle,
    /// One character was revealed.
    Revealed {
        /// More characters are queued.
        more_pending: bool,
    },
}

/// Conversation store, working message list and the live stream session.
#[derive(Debug)]
pub struct ChatState {
    store: ConversationStore,
    messages: Vec<Message>,
    waiting: bool,
    gate: SendGate,
    session: Option<StreamSession>,
    notice: Option<String>,
    surface_transport_errors: bool,
}

impl ChatState {
    /// Create the state with one empty conversation.
    #[must_use]
    pub fn new(config: &ChatConfig) -> Self {
        let store = ConversationStore::new();
        let messages = store.active_messages().to_vec();
        Self {
            store,
            messages,
            waiting: false,
            gate: SendGate::new(config.send_cooldown),
            session: None,
            notice: None,
            surface_transport_errors: config.surface_transport_errors,
        }
    }

    /// Messages of the active conversation, including unrevealed edits.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether a reply is awaited and no token has arrived yet.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Active conversation id.
    #[must_use]
    pub const fn active_id(&self) -> ConversationId {
        self.store.active_id()
    }

    /// Underlying store (committed state only).
    #[must_use]
    pub const fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Last user-facing notice.
    #[must_use]
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Target of the live session, if any.
    #[must_use]
    pub fn session_target(&self) -> Option<StreamTarget> {
        self.session.as_ref().map(StreamSession::target)
    }

    /// Whether revealed characters are still queued.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.session.as_ref().is_some_and(StreamSession::is_draining)
    }

    /// Snapshot for the presentation layer.
    #[must_use]
    pub fn view(&self) -> ChatView {
        ChatView {
            messages: self.messages.clone(),
            waiting: self.waiting,
            conversations: self.store.conversations().to_vec(),
            active: self.store.active_id(),
            notice: self.notice.clone(),
        }
    }

    /// Accept a user message and start a stream session for it.
    ///
    /// # Errors
    /// - `EmptyInput` for blank text; nothing changes.
    /// - `RateLimited` inside the cooldown window; a notice is set and the
    ///   message list is left untouched.
    pub fn submit(&mut self, text: &str, now_ms: i64) -> ChatResult<StreamRequest> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        if !self.gate.try_acquire(now_ms) {
            let err = ChatError::RateLimited {
                retry_after_ms: self.gate.remaining_ms(now_ms),
            };
            self.notice = Some("Please wait a few seconds before sending another message.".to_string());
            info!(error = %err, "Send rejected by cooldown");
            return Err(err);
        }

        self.cancel_session();
        self.notice = None;
        self.messages.push(Message::user(text));
        self.waiting = true;

        let target = StreamTarget::fresh(self.store.active_id());
        self.session = Some(StreamSession::new(target));
        debug!(session = ?target, "Stream session started");

        Ok(StreamRequest {
            target,
            message: text.to_string(),
        })
    }

    /// Apply one event from the stream worker of `target`.
    pub fn apply_event(&mut self, target: StreamTarget, event: StreamEvent) -> EventOutcome {
        if !self.accepts(target) {
            debug!(session = ?target, "Ignoring event from stale stream session");
            return EventOutcome::Stale;
        }

        match event {
            StreamEvent::Frame(StreamFrame::Content { content }) => self.on_content(&content),
            StreamEvent::Frame(StreamFrame::Done { .. }) => self.on_done(),
            StreamEvent::Frame(StreamFrame::Error { message }) => {
                warn!(session = ?target, %message, "Assistant stream reported an error");
                self.end_session(Some(Message::error(&message)))
            }
            StreamEvent::TransportFailure(reason) => {
                warn!(session = ?target, %reason, "Assistant stream transport failure");
                let surfaced = self
                    .surface_transport_errors
                    .then(|| Message::assistant(TRANSPORT_FAILURE_TEXT));
                self.end_session(surfaced)
            }
        }
    }

    /// Reveal one queued character of `target` into the trailing assistant
    /// message.
    pub fn tick(&mut self, target: StreamTarget) -> TickOutcome {
        let Some(session) = self.session.as_mut() else {
            return TickOutcome::Stale;
        };
        if !session.is_live() || session.target() != target {
            return TickOutcome::Stale;
        }

        let outcome = match session.tick() {
            Some(text) => {
                publish_trailing(&mut self.messages, text);
                TickOutcome::Revealed {
                    more_pending: session.is_draining(),
                }
            }
            None => TickOutcome::Idle,
        };

        if session.is_finished() {
            debug!(session = ?target, "Stream session finished");
            self.session = None;
        }
        outcome
    }

    /// Cancel the live session, commit the working list and load `id`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `id` is unknown; nothing changes then.
    pub fn switch_conversation(&mut self, id: ConversationId) -> ChatResult<()> {
        if !self.store.exists(id) {
            return Err(ChatError::InvalidArgument(format!(
                "unknown conversation {id}"
            )));
        }
        if id == self.store.active_id() {
            return Ok(());
        }

        self.cancel_session();
        self.commit_working()?;
        self.messages = self.store.set_active(id)?.to_vec();
        self.notice = None;
        info!(conversation_id = %id, "Switched conversation");
        Ok(())
    }

    /// Cancel the live session, commit the working list, then create and
    /// load a fresh conversation.
    ///
    /// # Errors
    /// Returns an error only if the store lost the active conversation.
    pub fn new_conversation(&mut self) -> ChatResult<ConversationId> {
        self.cancel_session();
        self.commit_working()?;
        let id = self.store.create();
        self.messages = self.store.set_active(id)?.to_vec();
        self.notice = None;
        info!(conversation_id = %id, "Started new conversation");
        Ok(id)
    }

    /// Stop the live session, keeping whatever was already revealed.
    ///
    /// A reply whose connection already closed is complete, so its queued
    /// characters are revealed at once instead of being dropped.
    pub fn cancel_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if !session.is_connection_open() {
                if let Some(text) = session.flush() {
                    publish_trailing(&mut self.messages, text);
                }
            }
            debug!(session = ?session.target(), "Cancelling stream session");
            session.cancel();
        }
        self.waiting = false;
    }

    fn accepts(&self, target: StreamTarget) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.is_live() && session.target() == target)
    }

    fn commit_working(&mut self) -> ChatResult<()> {
        let active = self.store.active_id();
        self.store.commit(active, std::mem::take(&mut self.messages))
    }

    fn on_content(&mut self, fragment: &str) -> EventOutcome {
        let Some(fed) = self.session.as_mut().and_then(|s| s.feed(fragment)) else {
            return EventOutcome::Stale;
        };
        if fed.first_token {
            self.waiting = false;
        }
        EventOutcome::Queued {
            arm_drain: fed.arm_drain,
        }
    }

    fn on_done(&mut self) -> EventOutcome {
        self.waiting = false;
        if let Some(session) = self.session.as_mut() {
            session.close_connection();
            if session.is_finished() {
                self.session = None;
            }
        }
        EventOutcome::Closed
    }

    /// Reveal what already arrived, append `surfaced` and drop the session.
    fn end_session(&mut self, surfaced: Option<Message>) -> EventOutcome {
        self.waiting = false;
        if let Some(mut session) = self.session.take() {
            if let Some(text) = session.flush() {
                publish_trailing(&mut self.messages, text);
            }
            session.cancel();
        }
        if let Some(message) = surfaced {
            self.messages.push(message);
        }
        EventOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::chat::types::Sender;

    const NOW: i64 = 1_700_000_000_000;

    fn state() -> ChatState {
        ChatState::new(&ChatConfig::default())
    }

    fn content(text: &str) -> StreamEvent {
        StreamEvent::Frame(StreamFrame::content(text))
    }

    fn done() -> StreamEvent {
        StreamEvent::Frame(StreamFrame::Done {
            conversation_id: None,
        })
    }

    fn drain(state: &mut ChatState, target: StreamTarget) -> Vec<String> {
        let mut reveals = Vec::new();
        while let TickOutcome::Revealed { .. } = state.tick(target) {
            let last = state.messages().last().map(|m| m.text.clone());
            reveals.push(last.unwrap_or_default());
        }
        reveals
    }

    #[test]
    fn test_hello_scenario_reveals_in_order() {
        let mut state = state();
        let request = state.submit("Hello", NOW).unwrap();
        let target = request.target;
        assert_eq!(request.message, "Hello");
        assert!(state.is_waiting());

        assert_eq!(
            state.apply_event(target, content("Hi")),
            EventOutcome::Queued { arm_drain: true }
        );
        assert!(!state.is_waiting());
        assert_eq!(
            state.apply_event(target, content(" there")),
            EventOutcome::Queued { arm_drain: false }
        );
        assert_eq!(state.apply_event(target, done()), EventOutcome::Closed);

        let reveals = drain(&mut state, target);
        assert_eq!(
            reveals,
            ["H", "Hi", "Hi ", "Hi t", "Hi th", "Hi the", "Hi ther", "Hi there"]
        );
        assert_eq!(
            state.messages(),
            [Message::user("Hello"), Message::assistant("Hi there")]
        );
        assert!(state.session_target().is_none());
    }

    #[test]
    fn test_drain_interleaves_with_arrivals() {
        let mut state = state();
        let target = state.submit("Hello", NOW).unwrap().target;
        state.apply_event(target, content("ab"));
        assert!(matches!(state.tick(target), TickOutcome::Revealed { more_pending: true }));
        assert!(matches!(state.tick(target), TickOutcome::Revealed { more_pending: false }));
        assert_eq!(state.tick(target), TickOutcome::Idle);

        assert_eq!(
            state.apply_event(target, content("c")),
            EventOutcome::Queued { arm_drain: true }
        );
        state.tick(target);
        assert_eq!(state.messages().last(), Some(&Message::assistant("abc")));
        assert_eq!(state.messages().len(), 2);
    }

    #[test]
    fn test_done_without_content_leaves_no_bubble() {
        let mut state = state();
        let target = state.submit("Hello", NOW).unwrap().target;
        assert_eq!(state.apply_event(target, done()), EventOutcome::Closed);
        assert!(!state.is_waiting());
        assert_eq!(state.messages(), [Message::user("Hello")]);
        assert!(state.session_target().is_none());
    }

    #[test]
    fn test_error_frame_appends_marked_message() {
        let mut state = state();
        let target = state.submit("Hello", NOW).unwrap().target;
        let outcome = state.apply_event(
            target,
            StreamEvent::Frame(StreamFrame::error("backend down")),
        );
        assert_eq!(outcome, EventOutcome::Failed);
        assert_eq!(
            state.messages(),
            [Message::user("Hello"), Message::assistant("⚠️ Error: backend down")]
        );

        assert_eq!(state.apply_event(target, content("late")), EventOutcome::Stale);
        assert_eq!(state.tick(target), TickOutcome::Stale);
        assert_eq!(state.messages().len(), 2);
    }

    #[test]
    fn test_error_after_partial_content_keeps_it() {
        let mut state = state();
        let target = state.submit("Hello", NOW).unwrap().target;
        state.apply_event(target, content("Par"));
        state.tick(target);
        state.apply_event(target, StreamEvent::Frame(StreamFrame::error("cut")));

        assert_eq!(
            state.messages(),
            [
                Message::user("Hello"),
                Message::assistant("Par"),
                Message::assistant("⚠️ Error: cut"),
            ]
        );
    }

    #[test]
    fn test_transport_failure_surfacing_is_configurable() {
        let mut loud = state();
        let target = loud.submit("Hello", NOW).unwrap().target;
        loud.apply_event(target, StreamEvent::TransportFailure("reset".to_string()));
        assert!(!loud.is_waiting());
        assert_eq!(
            loud.messages().last(),
            Some(&Message::assistant(TRANSPORT_FAILURE_TEXT))
        );

        let mut quiet = ChatState::new(&ChatConfig::new().with_surface_transport_errors(false));
        let target = quiet.submit("Hello", NOW).unwrap().target;
        quiet.apply_event(target, StreamEvent::TransportFailure("reset".to_string()));
        assert!(!quiet.is_waiting());
        assert_eq!(quiet.messages(), [Message::user("Hello")]);
    }

    #[test]
    fn test_second_submit_within_cooldown_is_rejected() {
        let mut state = state();
        state.submit("Hello", NOW).unwrap();
        let before = state.messages().to_vec();

        let err = state.submit("Again", NOW + 1000).unwrap_err();
        assert!(matches!(err, ChatError::RateLimited { retry_after_ms: 2000 }));
        assert_eq!(state.messages(), before.as_slice());
        assert!(state.notice().is_some());

        assert!(state.submit("Later", NOW + 3000).is_ok());
        assert!(state.notice().is_none());
    }

    #[test]
    fn test_blank_input_dropped() {
        let mut state = state();
        assert!(matches!(state.submit("   ", NOW), Err(ChatError::EmptyInput)));
        assert!(state.messages().is_empty());
        assert!(!state.is_waiting());
        // A dropped blank send does not consume the cooldown.
        assert!(state.submit("Hello", NOW).is_ok());
    }

    #[test]
    fn test_new_send_cancels_previous_session() {
        let mut state = ChatState::new(&ChatConfig::new().with_send_cooldown(Duration::ZERO));
        let first = state.submit("one", NOW).unwrap().target;
        state.apply_event(first, content("abc"));
        state.tick(first);

        let second = state.submit("two", NOW).unwrap().target;
        assert_eq!(state.tick(first), TickOutcome::Stale);
        assert_eq!(state.apply_event(first, content("x")), EventOutcome::Stale);

        state.apply_event(second, content("ok"));
        drain(&mut state, second);
        let texts: Vec<(Sender, &str)> = state
            .messages()
            .iter()
            .map(|m| (m.sender, m.text.as_str()))
            .collect();
        assert_eq!(
            texts,
            [
                (Sender::User, "one"),
                (Sender::Assistant, "a"),
                (Sender::User, "two"),
                (Sender::Assistant, "ok"),
            ]
        );
    }

    #[test]
    fn test_new_send_keeps_completed_reply_that_is_still_revealing() {
        let mut state = ChatState::new(&ChatConfig::new().with_send_cooldown(Duration::ZERO));
        let first = state.submit("one", NOW).unwrap().target;
        state.apply_event(first, content("Hi there"));
        state.apply_event(first, done());
        state.tick(first);
        assert_eq!(state.messages().last(), Some(&Message::assistant("H")));

        let second = state.submit("two", NOW).unwrap().target;
        assert_eq!(state.tick(first), TickOutcome::Stale);
        assert_eq!(
            state.messages(),
            [
                Message::user("one"),
                Message::assistant("Hi there"),
                Message::user("two"),
            ]
        );
        assert_eq!(state.session_target(), Some(second));
    }

    #[test]
    fn test_new_conversation_and_switch_back() {
        let mut state = state();
        let first = state.active_id();
        let target = state.submit("Hello", NOW).unwrap().target;
        state.apply_event(target, content("Hi"));
        state.apply_event(target, done());
        drain(&mut state, target);
        let original = state.messages().to_vec();
        assert_eq!(original.len(), 2);

        let second = state.new_conversation().unwrap();
        assert_ne!(second, first);
        assert!(state.messages().is_empty());
        assert_eq!(state.view().conversations.len(), 2);
        assert_eq!(state.view().conversations[1].title, "Conversation 2");

        state.switch_conversation(first).unwrap();
        assert_eq!(state.messages(), original.as_slice());
        state.switch_conversation(second).unwrap();
        state.switch_conversation(first).unwrap();
        assert_eq!(state.messages(), original.as_slice());
    }

    #[test]
    fn test_switch_mid_stream_cancels_and_protects_other_conversation() {
        let mut state = state();
        let first = state.active_id();
        let target = state.submit("Hello", NOW).unwrap().target;
        state.apply_event(target, content("Hi there"));
        state.tick(target);

        let second = state.new_conversation().unwrap();
        assert!(!state.is_waiting());
        assert_eq!(state.tick(target), TickOutcome::Stale);
        assert_eq!(state.apply_event(target, content("more")), EventOutcome::Stale);
        assert!(state.messages().is_empty());

        state.switch_conversation(first).unwrap();
        assert_eq!(
            state.messages(),
            [Message::user("Hello"), Message::assistant("H")]
        );
        assert_eq!(state.store().messages(second), Some(&[][..]));
    }

    #[test]
    fn test_switch_to_unknown_is_invalid_argument() {
        let mut state = state();
        state.submit("Hello", NOW).unwrap();
        let err = state.switch_conversation(ConversationId::new()).unwrap_err();
        assert!(matches!(err, ChatError::InvalidArgument(_)));
        assert!(state.is_waiting());
        assert_eq!(state.messages().len(), 1);
    }
}
