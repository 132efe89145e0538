//! Development backend for the travel chat client.
//!
//! Provides:
//! - `GET /health`
//! - `GET /chat?message=&conversation_id=` streaming server-sent events

pub mod config;
pub mod context;
pub mod reply;
pub mod routes;
pub mod state;

pub use config::{DEFAULT_PORT, ServerConfig};
pub use context::{MAX_CONTEXT_CHARS, load_context};
pub use reply::{CannedReplySource, OllamaReplies, ReplySource};
pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::chat::ChatResult;

/// Router with permissive CORS and request tracing.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server.
///
/// # Errors
/// Returns an error if the port cannot be bound or serving fails.
pub async fn run_server(state: Arc<AppState>, port: u16) -> ChatResult<()> {
    run_server_with_shutdown(state, port, std::future::pending()).await
}

/// Start the HTTP server with graceful shutdown support.
///
/// The server stops accepting new connections when `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the port cannot be bound or serving fails.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    port: u16,
    shutdown_signal: F,
) -> ChatResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown_signal).await
}

/// Serve on an already bound listener.
///
/// # Errors
/// Returns an error if serving fails.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown_signal: F) -> ChatResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(
        %addr,
        replies = state.replies.name(),
        context_chars = state.context_chars(),
        "Travel chat backend listening"
    );

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal)
        .await?;
    Ok(())
}
