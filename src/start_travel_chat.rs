//! Entry helpers for the travel chat binaries.

use std::process::ExitCode;

use tokio::io::BufReader;

use crate::chat::{ChatConfig, ChatResult};
use crate::cli;
use crate::server::{self, AppState, ServerConfig};

/// Install the global `tracing` subscriber with an `info` default.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn runtime() -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => Some(rt),
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            None
        }
    }
}

/// Run the development backend (used by `travel-chat-server`).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run_server() -> ExitCode {
    init_tracing();
    tracing::info!("Starting travel chat backend v{}", env!("CARGO_PKG_VERSION"));

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid server configuration: {e}");
            return ExitCode::from(1);
        }
    };
    if let Some(url) = &config.ollama_url {
        tracing::info!("Ollama endpoint: {url} (model {})", config.model);
    }
    if let Some(path) = &config.context_path {
        tracing::info!("Context document: {path}");
    }

    let Some(rt) = runtime() else {
        return ExitCode::from(1);
    };

    if let Err(e) = rt.block_on(serve_backend(&config)) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Run the interactive terminal client (used by `travel-chat`).
///
/// # Returns
/// `ExitCode::SUCCESS` when the user quits, `1` on failure.
#[must_use]
pub fn run_client() -> ExitCode {
    init_tracing();

    let config = match ChatConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid client configuration: {e}");
            return ExitCode::from(1);
        }
    };
    tracing::info!(mode = %config.mode, endpoint = %config.endpoint, "Starting travel chat");

    let Some(rt) = runtime() else {
        return ExitCode::from(1);
    };

    let result = rt.block_on(cli::run_chat(
        &config,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    ));
    if let Err(e) = result {
        tracing::error!("Chat error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

async fn serve_backend(config: &ServerConfig) -> ChatResult<()> {
    let state = AppState::from_config(config)?;
    server::run_server_with_shutdown(state, config.port, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
