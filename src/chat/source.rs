//! Frame sources: where streamed assistant replies come from.

use tokio::sync::{mpsc, oneshot};

use super::error::ChatResult;
use super::frame::StreamFrame;
use super::ids::StreamTarget;

/// One outgoing user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Session the reply is routed to.
    pub target: StreamTarget,
    /// Message text as typed.
    pub message: String,
}

/// What a stream worker reports back to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A decoded frame.
    Frame(StreamFrame),
    /// Connection-level failure with no structured payload.
    TransportFailure(String),
}

/// Receiving end of one stream session.
///
/// Dropping the handle cancels the worker behind it.
pub struct StreamHandle {
    target: StreamTarget,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl StreamHandle {
    /// Session this handle belongs to.
    #[must_use]
    pub const fn target(&self) -> StreamTarget {
        self.target
    }

    /// Wait for the next event. `None` once the worker is gone.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Ask the worker to stop. Returns `false` if it was already asked or gone.
    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .is_some_and(|tx| tx.send(()).is_ok())
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Build the channel pair shared by a worker and its handle.
pub(crate) fn make_event_stream(
    target: StreamTarget,
) -> (
    mpsc::UnboundedSender<StreamEvent>,
    StreamHandle,
    oneshot::Receiver<()>,
) {
    let (event_tx, events) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let handle = StreamHandle {
        target,
        events,
        cancel_tx: Some(cancel_tx),
    };
    (event_tx, handle, cancel_rx)
}

/// A producer of assistant reply streams.
pub trait FrameSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Start streaming the reply to `request`.
    ///
    /// Live sources spawn their worker on the current tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the request cannot be issued at all.
    fn open(&self, request: StreamRequest) -> ChatResult<StreamHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ids::ConversationId;

    #[tokio::test]
    async fn test_events_flow_in_order() {
        let target = StreamTarget::fresh(ConversationId::new());
        let (tx, mut handle, _cancel_rx) = make_event_stream(target);
        tx.send(StreamEvent::Frame(StreamFrame::content("a"))).unwrap();
        tx.send(StreamEvent::TransportFailure("gone".to_string()))
            .unwrap();
        drop(tx);

        assert_eq!(handle.target(), target);
        assert_eq!(
            handle.recv().await,
            Some(StreamEvent::Frame(StreamFrame::content("a")))
        );
        assert_eq!(
            handle.recv().await,
            Some(StreamEvent::TransportFailure("gone".to_string()))
        );
        assert_eq!(handle.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancel_once_and_on_drop() {
        let target = StreamTarget::fresh(ConversationId::new());
        let (_tx, mut handle, cancel_rx) = make_event_stream(target);
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(cancel_rx.await.is_ok());

        let (_tx, handle, cancel_rx) = make_event_stream(target);
        drop(handle);
        assert!(cancel_rx.await.is_ok());
    }
}
