/*!
Transport layer (orchestration side).

A transport is the one channel the operator talks through. It produces
[`Inbound`] events (slash commands and button presses) into an mpsc channel
and delivers replies and documents back to a chat.

Concrete implementations live in their own files:

- `telegram.rs`     -> `TelegramTransport` (Bot API long polling)
- `stdin_source.rs` -> `StdinTransport`    (local console, replies on stdout)

Each transport is responsible for:
- Turning raw input into `Inbound` values
- Pushing events via `Sender<Inbound>` while respecting backpressure (`send().await`)
- Logging errors and continuing (never panicking inside tasks)
- Exiting when the cancellation token fires or the receiver is dropped

Replies go through [`Outbox`], which applies the message-length rule
(chunking) before handing text to the transport.
*/

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use crate::config::Settings;
use crate::error::{DispatchError, DispatchResult};
use crate::utils::text::split_chunks;

pub mod stdin_source;
pub mod telegram;

pub use stdin_source::StdinTransport;
pub use telegram::TelegramTransport;

pub const GLYPH_OK: &str = "✅";
pub const GLYPH_WARN: &str = "⚠";
pub const GLYPH_FAIL: &str = "⛔";

/// Outcome class of a reply; decides the leading glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Failure,
    /// Progress notices and menus; rendered without a status glyph.
    Notice,
}

/// An inline button carrying an opaque callback token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub token: String,
}

impl Button {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// Rows of buttons.
pub type Keyboard = Vec<Vec<Button>>;

/// A message to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub severity: Severity,
    pub text: String,
    pub keyboard: Keyboard,
}

impl Reply {
    fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn ok(text: impl Into<String>) -> Self {
        Self::new(Severity::Success, text)
    }

    pub fn warn(text: impl Into<String>) -> Self {
        Self::new(Severity::Warning, text)
    }

    pub fn fail(text: impl Into<String>) -> Self {
        Self::new(Severity::Failure, text)
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(Severity::Notice, text)
    }

    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }

    /// Final text including the status glyph.
    pub fn render(&self) -> String {
        let glyph = match self.severity {
            Severity::Success => GLYPH_OK,
            Severity::Warning => GLYPH_WARN,
            Severity::Failure => GLYPH_FAIL,
            Severity::Notice => return self.text.clone(),
        };
        format!("{glyph} {}", self.text)
    }
}

/// A slash command: `/verb arg1 arg2 ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: String,
    pub args: Vec<String>,
    /// Everything after the verb, trimmed but otherwise untouched.
    pub raw: String,
}

impl Command {
    /// Parse `/verb[@botname] args...`. Returns `None` for plain text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let body = text.strip_prefix('/')?;
        let (head, raw) = match body.find(char::is_whitespace) {
            Some(at) => (&body[..at], body[at..].trim()),
            None => (body, ""),
        };
        let verb = head.split('@').next().unwrap_or(head).to_lowercase();
        if verb.is_empty() {
            return None;
        }
        Some(Self {
            verb,
            args: raw.split_whitespace().map(str::to_string).collect(),
            raw: raw.to_string(),
        })
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Raw text after the first `skip` arguments, inner spacing preserved.
    pub fn raw_from(&self, skip: usize) -> &str {
        let mut rest = self.raw.as_str();
        for _ in 0..skip {
            rest = rest.trim_start();
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            rest = &rest[end..];
        }
        rest.trim()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Command(Command),
    /// A button press carrying the button's token.
    Callback(String),
}

/// An event received from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub chat_id: i64,
    pub event: InboundEvent,
}

/// Trait implemented by all transports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Static human-readable identifier (used in logs).
    fn name(&self) -> &'static str;

    /// Start receiving in the background. The task ends when `cancel` fires
    /// or the receiver side of `sender` is dropped.
    fn start(&self, sender: Sender<Inbound>, cancel: CancellationToken) -> JoinHandle<()>;

    /// Deliver one message (already within the length limit).
    async fn send(&self, chat_id: i64, text: &str, keyboard: &[Vec<Button>]) -> anyhow::Result<()>;

    /// Upload a file as a document.
    async fn send_document(&self, chat_id: i64, path: &Path) -> anyhow::Result<()>;

    /// Publish the command list, for transports that support it.
    async fn announce_commands(&self, _commands: &[(&str, &str)]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Construct the transport selected by the CLI.
pub fn build_transport(settings: &Settings, use_stdin: bool) -> Arc<dyn Transport> {
    if use_stdin {
        Arc::new(StdinTransport::new(settings.chat_id.as_i64().unwrap_or_default()))
    } else {
        Arc::new(TelegramTransport::new(settings.bot_token.clone()))
    }
}

/// Outbound side bound to the operator's chat.
#[derive(Clone)]
pub struct Outbox {
    transport: Arc<dyn Transport>,
    chat_id: i64,
    max_len: usize,
}

impl Outbox {
    pub fn new(transport: Arc<dyn Transport>, chat_id: i64, max_len: usize) -> Self {
        Self {
            transport,
            chat_id,
            max_len,
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    /// Send a reply, splitting it into sequential chunks when it exceeds the
    /// length limit. The keyboard rides on the last chunk.
    pub async fn send(&self, reply: &Reply) -> DispatchResult<()> {
        let text = reply.render();
        let chunks = split_chunks(&text, self.max_len);
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.iter().enumerate() {
            let keyboard: &[Vec<Button>] = if i == last { &reply.keyboard } else { &[] };
            trace!(target: "telepwn::sources", chunk = i, len = chunk.len(), "Sending chunk");
            self.transport
                .send(self.chat_id, chunk, keyboard)
                .await
                .map_err(|e| DispatchError::execution("Send", format!("{e:#}")))?;
        }
        Ok(())
    }

    /// Send and only log a failure; used where nobody is left to tell.
    pub async fn deliver(&self, reply: &Reply) {
        if let Err(e) = self.send(reply).await {
            error!(
                target: "telepwn::sources",
                transport = self.transport.name(),
                error = %e,
                "Failed to deliver reply"
            );
        }
    }

    pub async fn send_document(&self, path: &Path) -> DispatchResult<()> {
        info!(target: "telepwn::sources", path = %path.display(), "Sending document");
        self.transport
            .send_document(self.chat_id, path)
            .await
            .map_err(|e| DispatchError::execution("Document upload", format!("{e:#}")))
    }
}
