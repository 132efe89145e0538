//! Offline replies for running without a backend.
//!
//! Keywords are matched case-insensitively on whole words, first match
//! wins: "hello", then "ada", then "aca". Everything else gets a generic
//! answer.

use regex::Regex;

use super::error::ChatResult;
use super::frame::StreamFrame;
use super::source::{FrameSource, StreamEvent, StreamHandle, StreamRequest, make_event_stream};

const HELLO_REPLY: &str = "Hello! I'm your accessible travel assistant. Ask me about \
wheelchair-friendly destinations, your rights under the ADA or the ACA, or how to request \
assistance at the airport.";

const ADA_REPLY: &str = "The Americans with Disabilities Act (ADA) requires hotels, ground \
transportation and other public accommodations in the United States to be accessible. When \
booking, ask for an ADA-compliant room and confirm details such as roll-in showers and grab bars.";

const ACA_REPLY: &str = "The Air Carrier Access Act (ACA) prohibits airlines from discriminating \
against passengers with disabilities. You can request wheelchair assistance, pre-boarding and \
seating accommodations; let the airline know at least 48 hours before your flight.";

const FALLBACK_REPLY: &str = "I'm running in offline mode, so I can only answer a few questions. \
Try asking about the ADA or the ACA, or just say hello.";

struct ReplyRule {
    pattern: Regex,
    reply: &'static str,
}

/// Keyword-matched canned reply table.
pub struct CannedReplies {
    rules: Vec<ReplyRule>,
}

impl CannedReplies {
    /// Compile the reply table.
    ///
    /// # Errors
    /// Returns an error if a keyword pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        let rules = vec![
            ReplyRule {
                pattern: Regex::new(r"(?i)\bhello\b")?,
                reply: HELLO_REPLY,
            },
            ReplyRule {
                pattern: Regex::new(r"(?i)\bada\b")?,
                reply: ADA_REPLY,
            },
            ReplyRule {
                pattern: Regex::new(r"(?i)\baca\b")?,
                reply: ACA_REPLY,
            },
        ];
        Ok(Self { rules })
    }

    /// Pick the reply for `message`.
    #[must_use]
    pub fn reply_for(&self, message: &str) -> &'static str {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(message))
            .map_or(FALLBACK_REPLY, |rule| rule.reply)
    }
}

/// Split a reply into word-sized fragments, keeping the separators.
pub fn word_fragments(reply: &str) -> impl Iterator<Item = &str> {
    reply.split_inclusive(' ')
}

/// Frame source answering from [`CannedReplies`] without any network.
pub struct MockFrameSource {
    replies: CannedReplies,
}

impl MockFrameSource {
    /// Create the offline source.
    ///
    /// # Errors
    /// Returns an error if the reply table cannot be compiled.
    pub fn new() -> ChatResult<Self> {
        Ok(Self {
            replies: CannedReplies::new()?,
        })
    }
}

impl FrameSource for MockFrameSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open(&self, request: StreamRequest) -> ChatResult<StreamHandle> {
        let (event_tx, handle, _cancel_rx) = make_event_stream(request.target);
        let reply = self.replies.reply_for(&request.message);
        tracing::debug!(
            session = ?request.target,
            chars = reply.len(),
            "Answering from canned replies"
        );

        // The handle owns the receiver, so these sends cannot fail here.
        for fragment in word_fragments(reply) {
            let _ = event_tx.send(StreamEvent::Frame(StreamFrame::content(fragment)));
        }
        let _ = event_tx.send(StreamEvent::Frame(StreamFrame::Done {
            conversation_id: Some(request.target.conversation_id.to_string()),
        }));

        Ok(handle)
    }
}
