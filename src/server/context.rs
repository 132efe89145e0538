//! Grounding document loaded once at startup.
//!
//! The document is read as UTF-8 text and cut to [`MAX_CONTEXT_CHARS`]
//! characters before it is placed in every Ollama prompt.

use std::path::Path;

use tracing::info;

use crate::chat::{ChatError, ChatResult};

/// Longest context placed in a prompt, in characters.
pub const MAX_CONTEXT_CHARS: usize = 180_000;

/// Cut `text` to at most `max` characters.
fn truncate_chars(mut text: String, max: usize) -> String {
    if let Some((offset, _)) = text.char_indices().nth(max) {
        text.truncate(offset);
    }
    text
}

/// Read the grounding document at `path`.
///
/// # Errors
/// Returns `InvalidConfig` if the file is missing and `Io` if it cannot be
/// read as UTF-8 text.
pub fn load_context(path: impl AsRef<Path>) -> ChatResult<String> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ChatError::InvalidConfig(format!(
            "context document not found at {}",
            path.display()
        )));
    }

    let text = std::fs::read_to_string(path)?;
    let total = text.chars().count();
    let text = truncate_chars(text, MAX_CONTEXT_CHARS);
    info!(path = %path.display(), total, kept = text.chars().count(), "Context document loaded");
    Ok(text)
}
