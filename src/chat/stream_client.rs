//! Live frame source over server-sent events.
//!
//! One `GET` per outgoing message:
//! `{endpoint}?message=<encoded>&conversation_id=<id>`. The worker decodes
//! the event stream into [`StreamFrame`]s and stops at the first terminal
//! frame, on transport failure, or when its handle is cancelled.

use futures::StreamExt;
use reqwest::header::ACCEPT;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use url::Url;

use super::config::ChatConfig;
use super::error::ChatResult;
use super::frame::{SseDecoder, StreamFrame};
use super::ids::{ConversationId, StreamTarget};
use super::source::{FrameSource, StreamEvent, StreamHandle, StreamRequest, make_event_stream};

/// HTTP client for the streaming chat endpoint.
#[derive(Clone)]
pub struct StreamClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl StreamClient {
    /// Build a client for the configured endpoint.
    ///
    /// # Errors
    /// Returns an error if the endpoint is not a valid URL or the HTTP
    /// client cannot be built.
    pub fn new(config: &ChatConfig) -> ChatResult<Self> {
        let endpoint = Url::parse(&config.endpoint)?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, endpoint })
    }

    /// Build the request URL for one message.
    #[must_use]
    pub fn request_url(&self, message: &str, conversation_id: ConversationId) -> Url {
        let ours = format!(
            "message={}&conversation_id={}",
            urlencoding::encode(message),
            urlencoding::encode(&conversation_id.to_string())
        );
        let query = match self.endpoint.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{ours}"),
            _ => ours,
        };

        let mut url = self.endpoint.clone();
        url.set_query(Some(&query));
        url
    }
}

impl FrameSource for StreamClient {
    fn name(&self) -> &'static str {
        "live"
    }

    fn open(&self, request: StreamRequest) -> ChatResult<StreamHandle> {
        let url = self.request_url(&request.message, request.target.conversation_id);
        let (event_tx, handle, cancel_rx) = make_event_stream(request.target);
        debug!(session = ?request.target, %url, "Opening assistant stream");

        tokio::spawn(run_stream_worker(
            self.client.clone(),
            url,
            request.target,
            event_tx,
            cancel_rx,
        ));
        Ok(handle)
    }
}

async fn run_stream_worker(
    client: reqwest::Client,
    url: Url,
    target: StreamTarget,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let response = tokio::select! {
        _ = &mut cancel_rx => {
            debug!(session = ?target, "Stream cancelled before connecting");
            return;
        }
        response = client.get(url).header(ACCEPT, "text/event-stream").send() => response,
    };

    let response = match response.and_then(reqwest::Response::error_for_status) {
        Ok(response) => response,
        Err(err) => {
            warn!(session = ?target, error = %err, "Failed to open assistant stream");
            let _ = event_tx.send(StreamEvent::TransportFailure(err.to_string()));
            return;
        }
    };

    let mut body = Box::pin(response.bytes_stream());
    let mut decoder = SseDecoder::new();

    loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                debug!(session = ?target, "Stream cancelled");
                return;
            }
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    let payloads = match decoder.push(&bytes) {
                        Ok(payloads) => payloads,
                        Err(err) => {
                            warn!(session = ?target, error = %err, "Dropping oversized assistant stream");
                            let _ = event_tx.send(StreamEvent::TransportFailure(err.to_string()));
                            return;
                        }
                    };
                    for payload in payloads {
                        let frame = match StreamFrame::from_json(&payload) {
                            Ok(frame) => frame,
                            Err(err) => {
                                warn!(session = ?target, error = %err, %payload, "Skipping malformed stream frame");
                                continue;
                            }
                        };
                        let terminal = frame.is_terminal();
                        if event_tx.send(StreamEvent::Frame(frame)).is_err() || terminal {
                            return;
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(session = ?target, error = %err, "Assistant stream broke");
                    let _ = event_tx.send(StreamEvent::TransportFailure(err.to_string()));
                    return;
                }
                None => {
                    warn!(
                        session = ?target,
                        partial_event = decoder.has_partial(),
                        "Assistant stream ended without a terminal frame"
                    );
                    let _ = event_tx.send(StreamEvent::TransportFailure(
                        "stream ended before completion".to_string(),
                    ));
                    return;
                }
            }
        }
    }
}
