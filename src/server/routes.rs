//! HTTP route handlers for the travel chat backend.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::chat::{Message, StreamFrame};

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat", get(chat_stream))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "replies": state.replies.name(),
        "conversations": state.conversation_count(),
        "context_loaded": state.context().is_some(),
        "context_chars": state.context_chars(),
    }))
}

/// Query string of `GET /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    /// The user's message.
    pub message: String,
    /// Conversation to continue; a new one is created when absent.
    pub conversation_id: Option<String>,
}

/// Stream one assistant reply as server-sent events.
async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let conversation_id = state.ensure_conversation(query.conversation_id.as_deref());
    let history = state.history(&conversation_id);
    state.record(&conversation_id, Message::user(&query.message));
    debug!(%conversation_id, turns = history.len(), "Streaming reply");

    let (frames_tx, frames_rx) = mpsc::channel(32);
    tokio::spawn(relay_reply(
        state,
        conversation_id,
        history,
        query.message,
        frames_tx,
    ));

    let events = ReceiverStream::new(frames_rx).map(|frame: StreamFrame| Event::default().json_data(frame));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Run the reply source and translate its output into frames.
async fn relay_reply(
    state: Arc<AppState>,
    conversation_id: String,
    history: Vec<Message>,
    message: String,
    frames: mpsc::Sender<StreamFrame>,
) {
    let (fragment_tx, mut fragment_rx) = mpsc::channel::<String>(32);
    let replies = Arc::clone(&state.replies);
    let context = state.context();

    let produce = async move {
        replies
            .stream_reply(&history, &message, context.as_deref(), fragment_tx)
            .await
    };
    // Owns the receiver so a disconnect closes it and stops the producer.
    let sink = &frames;
    let forward = async move {
        let mut reply = String::new();
        while let Some(fragment) = fragment_rx.recv().await {
            reply.push_str(&fragment);
            if sink.send(StreamFrame::content(fragment)).await.is_err() {
                return None;
            }
        }
        Some(reply)
    };
    let (produced, forwarded) = tokio::join!(produce, forward);

    let Some(reply) = forwarded else {
        debug!(%conversation_id, "Client disconnected mid-reply");
        return;
    };

    let last = match produced {
        Ok(()) => {
            let text = reply.trim();
            if !text.is_empty() {
                state.record(&conversation_id, Message::assistant(text));
            }
            StreamFrame::Done {
                conversation_id: Some(conversation_id),
            }
        }
        Err(err) => {
            warn!(%conversation_id, error = %err, "Reply source failed");
            StreamFrame::error(err.to_string())
        }
    };
    let _ = frames.send(last).await;
}
