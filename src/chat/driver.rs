//! Async driver around [`ChatState`].
//!
//! One task owns the state and serializes three inputs: user commands, events
//! from the live stream worker, and the reveal timer. Every processed input
//! publishes a fresh [`ChatView`] on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::ChatConfig;
use super::error::{ChatError, ChatResult};
use super::ids::ConversationId;
use super::source::{FrameSource, StreamEvent, StreamHandle};
use super::state::{ChatState, ChatView, EventOutcome};

/// User actions accepted by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Send a message in the active conversation.
    Submit(String),
    /// Load another conversation.
    SwitchTo(ConversationId),
    /// Create a conversation and load it.
    NewConversation,
    /// Stop the driver.
    Shutdown,
}

/// Cloneable front end of a running driver.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<ChatCommand>,
    views: watch::Receiver<ChatView>,
}

impl ChatHandle {
    fn send(&self, command: ChatCommand) -> ChatResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ChatError::ChannelClosed)
    }

    /// Queue a message for sending.
    ///
    /// # Errors
    /// Returns `ChannelClosed` if the driver has stopped.
    pub fn submit(&self, text: impl Into<String>) -> ChatResult<()> {
        self.send(ChatCommand::Submit(text.into()))
    }

    /// Switch to an existing conversation.
    ///
    /// # Errors
    /// Returns `ChannelClosed` if the driver has stopped.
    pub fn switch_to(&self, id: ConversationId) -> ChatResult<()> {
        self.send(ChatCommand::SwitchTo(id))
    }

    /// Start a new conversation.
    ///
    /// # Errors
    /// Returns `ChannelClosed` if the driver has stopped.
    pub fn new_conversation(&self) -> ChatResult<()> {
        self.send(ChatCommand::NewConversation)
    }

    /// Ask the driver to stop. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.commands.send(ChatCommand::Shutdown);
    }

    /// Latest published view.
    #[must_use]
    pub fn view(&self) -> ChatView {
        self.views.borrow().clone()
    }

    /// Independent receiver of view updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.views.clone()
    }

    /// Wait for the next published view.
    ///
    /// # Errors
    /// Returns `ChannelClosed` once the driver is gone.
    pub async fn changed(&mut self) -> ChatResult<ChatView> {
        self.views
            .changed()
            .await
            .map_err(|_| ChatError::ChannelClosed)?;
        Ok(self.views.borrow_and_update().clone())
    }

    /// Wait until a view satisfies `predicate`, checking the current one first.
    ///
    /// # Errors
    /// Returns `ChannelClosed` if the driver stops first.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&ChatView) -> bool,
    ) -> ChatResult<ChatView> {
        self.views
            .wait_for(predicate)
            .await
            .map(|view| view.clone())
            .map_err(|_| ChatError::ChannelClosed)
    }
}

enum Step {
    Command(Option<ChatCommand>),
    Event(Option<StreamEvent>),
    Tick,
}

/// Owner of the chat state and the live stream.
pub struct ChatDriver {
    state: ChatState,
    source: Arc<dyn FrameSource>,
    reveal_interval: Duration,
    stream: Option<StreamHandle>,
    next_tick: Option<Instant>,
    clock_origin: Instant,
    commands: mpsc::UnboundedReceiver<ChatCommand>,
    views: watch::Sender<ChatView>,
}

impl ChatDriver {
    /// Spawn a driver on the current runtime.
    ///
    /// The task ends on [`ChatHandle::shutdown`] or when every handle is
    /// dropped.
    pub fn spawn(config: &ChatConfig, source: Arc<dyn FrameSource>) -> (ChatHandle, JoinHandle<()>) {
        let state = ChatState::new(config);
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (views, view_rx) = watch::channel(state.view());

        let driver = Self {
            state,
            source,
            reveal_interval: config.reveal_interval,
            stream: None,
            next_tick: None,
            clock_origin: Instant::now(),
            commands,
            views,
        };
        let task = tokio::spawn(driver.run());

        let handle = ChatHandle {
            commands: command_tx,
            views: view_rx,
        };
        (handle, task)
    }

    async fn run(mut self) {
        info!(source = self.source.name(), "Chat driver started");

        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                event = next_event(&mut self.stream) => Step::Event(event),
                () = wait_for_tick(self.next_tick) => Step::Tick,
            };

            match step {
                Step::Command(None | Some(ChatCommand::Shutdown)) => break,
                Step::Command(Some(command)) => self.handle_command(command),
                Step::Event(event) => self.handle_event(event),
                Step::Tick => self.handle_tick(),
            }

            self.rearm();
            self.views.send_replace(self.state.view());
        }

        self.state.cancel_session();
        self.stream = None;
        info!("Chat driver stopped");
    }

    fn handle_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Submit(text) => self.submit(&text),
            ChatCommand::SwitchTo(id) => {
                if let Err(err) = self.state.switch_conversation(id) {
                    warn!(error = %err, "Conversation switch rejected");
                }
            }
            ChatCommand::NewConversation => {
                if let Err(err) = self.state.new_conversation() {
                    warn!(error = %err, "Could not start a new conversation");
                }
            }
            ChatCommand::Shutdown => {}
        }
        self.drop_stale_stream();
    }

    fn submit(&mut self, text: &str) {
        let request = match self.state.submit(text, self.now_ms()) {
            Ok(request) => request,
            Err(ChatError::EmptyInput) => {
                debug!("Ignoring blank message");
                return;
            }
            Err(err) if err.is_user_facing() => {
                info!(error = %err, "Message not sent");
                return;
            }
            Err(err) => {
                warn!(error = %err, "Message not sent");
                return;
            }
        };

        let target = request.target;
        self.stream = None;
        match self.source.open(request) {
            Ok(handle) => self.stream = Some(handle),
            Err(err) => {
                warn!(session = ?target, error = %err, "Could not open assistant stream");
                self.state
                    .apply_event(target, StreamEvent::TransportFailure(err.to_string()));
            }
        }
    }

    fn handle_event(&mut self, event: Option<StreamEvent>) {
        let Some(target) = self.stream.as_ref().map(StreamHandle::target) else {
            return;
        };
        let event = event.unwrap_or_else(|| {
            StreamEvent::TransportFailure("stream worker exited".to_string())
        });

        match self.state.apply_event(target, event) {
            EventOutcome::Queued { .. } => {}
            EventOutcome::Closed | EventOutcome::Failed | EventOutcome::Stale => {
                self.stream = None;
            }
        }
    }

    fn handle_tick(&mut self) {
        self.next_tick = None;
        if let Some(target) = self.state.session_target() {
            self.state.tick(target);
        }
    }

    fn drop_stale_stream(&mut self) {
        let live = self.state.session_target();
        if self
            .stream
            .as_ref()
            .is_some_and(|handle| Some(handle.target()) != live)
        {
            self.stream = None;
        }
    }

    /// Milliseconds on the monotonic clock since the driver started.
    fn now_ms(&self) -> i64 {
        i64::try_from(self.clock_origin.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    /// Keep exactly one pending tick while characters are queued.
    fn rearm(&mut self) {
        if !self.state.is_draining() {
            self.next_tick = None;
        } else if self.next_tick.is_none() {
            self.next_tick = Some(Instant::now() + self.reveal_interval);
        }
    }
}

async fn next_event(stream: &mut Option<StreamHandle>) -> Option<StreamEvent> {
    match stream {
        Some(handle) => handle.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_for_tick(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::oneshot;

    use super::*;
    use crate::chat::frame::StreamFrame;
    use crate::chat::mock::{CannedReplies, MockFrameSource};
    use crate::chat::source::{StreamRequest, make_event_stream};
    use crate::chat::state::TRANSPORT_FAILURE_TEXT;
    use crate::chat::types::Message;

    type Opened = (mpsc::UnboundedSender<StreamEvent>, oneshot::Receiver<()>);

    /// Source whose streams are fed by the test.
    #[derive(Default)]
    struct ManualSource {
        opened: Mutex<Vec<Opened>>,
    }

    impl ManualSource {
        fn take(&self) -> Opened {
            self.opened.lock().unwrap().remove(0)
        }
    }

    impl FrameSource for ManualSource {
        fn name(&self) -> &'static str {
            "manual"
        }

        fn open(&self, request: StreamRequest) -> ChatResult<StreamHandle> {
            let (tx, handle, cancel_rx) = make_event_stream(request.target);
            self.opened.lock().unwrap().push((tx, cancel_rx));
            Ok(handle)
        }
    }

    fn config() -> ChatConfig {
        ChatConfig::new()
            .with_reveal_interval(Duration::from_millis(10))
            .with_send_cooldown(Duration::ZERO)
    }

    fn frame(frame: StreamFrame) -> StreamEvent {
        StreamEvent::Frame(frame)
    }

    fn last_text(view: &ChatView) -> String {
        view.messages
            .last()
            .map(|m| m.text.clone())
            .unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_reply_is_revealed_at_tick_rate() {
        let source = Arc::new(MockFrameSource::new().unwrap());
        let (handle, task) = ChatDriver::spawn(&config(), source);

        let replies = CannedReplies::new().unwrap();
        let reply = replies.reply_for("hello");

        let started = Instant::now();
        handle.submit("hello").unwrap();
        let mut views = handle.subscribe();

        let done = loop {
            views.changed().await.unwrap();
            let view = views.borrow_and_update().clone();
            let text = last_text(&view);
            if view.messages.len() == 2 {
                assert!(reply.starts_with(&text), "not a prefix: {text:?}");
                if text == reply {
                    break view;
                }
            }
        };

        let chars = u32::try_from(last_text(&done).chars().count()).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(10) * chars);
        assert_eq!(done.messages[0], Message::user("hello"));
        assert!(!done.waiting);

        handle.shutdown();
        task.await.unwrap();
        assert!(handle.submit("again").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_character_waits_one_interval() {
        let source = Arc::new(ManualSource::default());
        let (mut handle, _task) = ChatDriver::spawn(&config(), source.clone());

        handle.submit("Hello").unwrap();
        handle.wait_for(|v| v.waiting).await.unwrap();
        let (tx, _cancel) = source.take();

        let fed_at = Instant::now();
        tx.send(frame(StreamFrame::content("Hi"))).unwrap();
        let view = handle
            .wait_for(|v| v.messages.len() == 2)
            .await
            .unwrap();
        assert_eq!(last_text(&view), "H");
        assert!(!view.waiting);
        assert!(fed_at.elapsed() >= Duration::from_millis(10));

        tx.send(frame(StreamFrame::content(" there"))).unwrap();
        tx.send(frame(StreamFrame::Done {
            conversation_id: None,
        }))
        .unwrap();
        let view = handle
            .wait_for(|v| v.messages.last().is_some_and(|m| m.text == "Hi there"))
            .await
            .unwrap();
        assert_eq!(
            view.messages,
            [Message::user("Hello"), Message::assistant("Hi there")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_frame_surfaces_message() {
        let source = Arc::new(ManualSource::default());
        let (mut handle, _task) = ChatDriver::spawn(&config(), source.clone());

        handle.submit("Hello").unwrap();
        handle.wait_for(|v| v.waiting).await.unwrap();
        let (tx, _cancel) = source.take();
        tx.send(frame(StreamFrame::error("backend down"))).unwrap();

        let view = handle.wait_for(|v| v.messages.len() == 2).await.unwrap();
        assert_eq!(view.messages[1], Message::assistant("⚠️ Error: backend down"));
        assert!(!view.waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_exit_without_done_is_transport_failure() {
        let source = Arc::new(ManualSource::default());
        let (mut handle, _task) = ChatDriver::spawn(&config(), source.clone());

        handle.submit("Hello").unwrap();
        handle.wait_for(|v| v.waiting).await.unwrap();
        drop(source.take());

        let view = handle.wait_for(|v| !v.waiting).await.unwrap();
        assert_eq!(
            view.messages,
            [Message::user("Hello"), Message::assistant(TRANSPORT_FAILURE_TEXT)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_conversation_cancels_live_stream() {
        let source = Arc::new(ManualSource::default());
        let (mut handle, _task) = ChatDriver::spawn(&config(), source.clone());
        let first = handle.view().active;

        handle.submit("Hello").unwrap();
        handle.wait_for(|v| v.waiting).await.unwrap();
        let (tx, cancel) = source.take();
        tx.send(frame(StreamFrame::content("Hi there"))).unwrap();
        handle.wait_for(|v| v.messages.len() == 2).await.unwrap();

        handle.new_conversation().unwrap();
        let view = handle.wait_for(|v| v.active != first).await.unwrap();
        assert!(view.messages.is_empty());
        assert_eq!(view.conversations.len(), 2);
        assert!(cancel.await.is_ok());

        // Late frames from the cancelled worker go nowhere.
        let _ = tx.send(frame(StreamFrame::content("late")));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(handle.view().messages.is_empty());

        handle.switch_to(first).unwrap();
        let view = handle.wait_for(|v| v.active == first).await.unwrap();
        assert_eq!(view.messages[0], Message::user("Hello"));
        assert!(view.messages[1].text.len() < "Hi there".len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_rejects_second_send() {
        let source = Arc::new(ManualSource::default());
        let config = config().with_send_cooldown(Duration::from_secs(3600));
        let (mut handle, _task) = ChatDriver::spawn(&config, source.clone());

        handle.submit("one").unwrap();
        handle.submit("two").unwrap();
        let view = handle.wait_for(|v| v.notice.is_some()).await.unwrap();
        assert_eq!(view.messages, [Message::user("one")]);
        assert_eq!(source.opened.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_follows_monotonic_clock() {
        let source = Arc::new(ManualSource::default());
        let config = config().with_send_cooldown(Duration::from_secs(3));
        let (mut handle, _task) = ChatDriver::spawn(&config, source.clone());

        handle.submit("one").unwrap();
        handle.wait_for(|v| v.messages.len() == 1).await.unwrap();

        tokio::time::advance(Duration::from_millis(2999)).await;
        handle.submit("too soon").unwrap();
        handle.wait_for(|v| v.notice.is_some()).await.unwrap();
        assert_eq!(source.opened.lock().unwrap().len(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        handle.submit("two").unwrap();
        let view = handle
            .wait_for(|v| v.messages.iter().any(|m| m.text == "two"))
            .await
            .unwrap();
        assert!(view.notice.is_none());
        assert_eq!(source.opened.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dropping_handles_stops_driver() {
        let source = Arc::new(ManualSource::default());
        let (handle, task) = ChatDriver::spawn(&config(), source);
        drop(handle);
        task.await.unwrap();
    }
}
