//! Line-oriented terminal front end.
//!
//! Reads user input line by line and prints the transcript incrementally:
//! only characters that were not printed before are written, so the
//! assistant reply appears at the reveal pace.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::chat::{
    ChatConfig, ChatDriver, ChatResult, ChatView, ConversationId, Sender, source_for,
};

const HELP: &str = "Commands: /new, /list, /switch <n>, /help, /quit. Anything else is sent.";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Text to send as a message.
    Send(String),
    /// `/new`
    New,
    /// `/list`
    List,
    /// `/switch <n>`, 1-based.
    Switch(usize),
    /// `/help`
    Help,
    /// `/quit` or `/exit`
    Quit,
    /// Unrecognised slash command.
    Unknown(String),
}

/// Parse a line typed by the user.
#[must_use]
pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Send(line.trim_end_matches(['\r', '\n']).to_string());
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("new"), None) => Input::New,
        (Some("list"), None) => Input::List,
        (Some("help"), None) => Input::Help,
        (Some("quit" | "exit"), None) => Input::Quit,
        (Some("switch"), Some(index)) => match index.parse::<usize>() {
            Ok(n) if n > 0 => Input::Switch(n),
            _ => Input::Unknown(trimmed.to_string()),
        },
        _ => Input::Unknown(trimmed.to_string()),
    }
}

fn prefix(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "you> ",
        Sender::Assistant => "assistant> ",
    }
}

/// Tracks what has been printed so each view renders as a diff.
#[derive(Debug, Default)]
pub struct Transcript {
    active: Option<ConversationId>,
    started: usize,
    open_chars: usize,
    interrupted: bool,
    waiting: bool,
    notice: Option<String>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to print to bring the terminal up to date with `view`.
    pub fn render(&mut self, view: &ChatView) -> String {
        let mut out = String::new();

        if self.active != Some(view.active) {
            if self.started > 0 || self.interrupted {
                out.push('\n');
            }
            let title = view
                .conversations
                .iter()
                .find(|meta| meta.id == view.active)
                .map_or("Conversation", |meta| meta.title.as_str());
            out.push_str(&format!("--- {title} ---"));
            *self = Self {
                active: Some(view.active),
                interrupted: true,
                ..Self::default()
            };
        }

        let first = self.started.saturating_sub(1);
        for (index, message) in view.messages.iter().enumerate().skip(first) {
            if index + 1 == self.started {
                let fresh: String = message.text.chars().skip(self.open_chars).collect();
                if fresh.is_empty() {
                    continue;
                }
                if self.interrupted {
                    out.push('\n');
                    out.push_str(prefix(message.sender));
                    out.extend(message.text.chars().take(self.open_chars));
                    self.interrupted = false;
                }
                self.open_chars += fresh.chars().count();
                out.push_str(&fresh);
            } else {
                if self.started > 0 || self.interrupted {
                    out.push('\n');
                }
                out.push_str(prefix(message.sender));
                out.push_str(&message.text);
                self.started = index + 1;
                self.open_chars = message.text.chars().count();
                self.interrupted = false;
            }
        }

        if view.waiting && !self.waiting {
            out.push_str("\n(assistant is typing...)");
            self.interrupted = true;
        }
        self.waiting = view.waiting;

        if view.notice != self.notice {
            if let Some(notice) = &view.notice {
                out.push_str("\n! ");
                out.push_str(notice);
                self.interrupted = true;
            }
            self.notice.clone_from(&view.notice);
        }

        out
    }
}

fn list_conversations(view: &ChatView) -> String {
    let mut out = String::from("\n");
    for (index, meta) in view.conversations.iter().enumerate() {
        let marker = if meta.id == view.active { " *" } else { "" };
        out.push_str(&format!("  {}. {}{marker}\n", index + 1, meta.title));
    }
    out
}

async fn write_out<W>(output: &mut W, text: &str) -> ChatResult<()>
where
    W: AsyncWrite + Unpin,
{
    if !text.is_empty() {
        output.write_all(text.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}

/// Run an interactive session until `/quit` or end of input.
///
/// # Errors
/// Returns an error if the configuration is invalid or the terminal cannot
/// be read or written.
pub async fn run_chat<R, W>(config: &ChatConfig, input: R, mut output: W) -> ChatResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let source = source_for(config)?;
    let (handle, driver) = ChatDriver::spawn(config, source);
    let mut views = handle.subscribe();
    let mut transcript = Transcript::new();
    let mut lines = input.lines();

    let intro = format!("{HELP}\n{}", transcript.render(&handle.view()));
    write_out(&mut output, &intro).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_input(&line) {
                    Input::Send(text) => handle.submit(text)?,
                    Input::New => handle.new_conversation()?,
                    Input::List => write_out(&mut output, &list_conversations(&handle.view())).await?,
                    Input::Switch(n) => {
                        let view = handle.view();
                        match view.conversations.get(n - 1) {
                            Some(meta) => handle.switch_to(meta.id)?,
                            None => write_out(&mut output, &format!("\n! no conversation {n}\n")).await?,
                        }
                    }
                    Input::Help => write_out(&mut output, &format!("\n{HELP}\n")).await?,
                    Input::Quit => break,
                    Input::Unknown(command) => {
                        write_out(&mut output, &format!("\n! unknown command {command}\n")).await?;
                    }
                }
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                write_out(&mut output, &transcript.render(&view)).await?;
            }
        }
    }

    handle.shutdown();
    if let Err(err) = driver.await {
        debug!(error = %err, "Chat driver task ended abnormally");
    }
    write_out(&mut output, "\n").await
}
