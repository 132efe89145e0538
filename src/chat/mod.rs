//! Streaming chat client core.
//!
//! Layers, bottom-up:
//! - [`frame`] decodes server-sent events into [`StreamFrame`]s
//! - [`display_buffer`] paces revealed characters
//! - [`store`] keeps per-conversation message lists
//! - [`send_gate`] enforces the send cooldown
//! - [`state`] ties them into one single-writer state machine
//! - [`driver`] runs that state machine on tokio

pub mod config;
pub mod display_buffer;
pub mod driver;
pub mod error;
pub mod frame;
pub mod ids;
pub mod mock;
pub mod send_gate;
pub mod session;
pub mod source;
pub mod state;
pub mod store;
pub mod stream_client;
pub mod types;

use std::sync::Arc;

pub use config::{ChatConfig, ChatMode, DEFAULT_ENDPOINT};
pub use display_buffer::DisplayBuffer;
pub use driver::{ChatCommand, ChatDriver, ChatHandle};
pub use error::{ChatError, ChatResult};
pub use frame::{MAX_EVENT_BYTES, SseDecoder, StreamFrame};
pub use ids::{ConversationId, StreamSessionId, StreamTarget};
pub use mock::{CannedReplies, MockFrameSource};
pub use send_gate::SendGate;
pub use source::{FrameSource, StreamEvent, StreamHandle, StreamRequest};
pub use state::{ChatState, ChatView, EventOutcome, TRANSPORT_FAILURE_TEXT, TickOutcome};
pub use store::ConversationStore;
pub use stream_client::StreamClient;
pub use types::{ConversationMeta, ERROR_MARKER, Message, Sender};

/// Build the frame source selected by `config.mode`.
///
/// # Errors
/// Returns an error if the configuration is invalid or the source cannot be
/// constructed.
pub fn source_for(config: &ChatConfig) -> ChatResult<Arc<dyn FrameSource>> {
    config.validate()?;
    let source: Arc<dyn FrameSource> = match config.mode {
        ChatMode::Live => Arc::new(StreamClient::new(config)?),
        ChatMode::Mock => Arc::new(MockFrameSource::new()?),
    };
    tracing::info!(mode = %config.mode, source = source.name(), "Frame source ready");
    Ok(source)
}
