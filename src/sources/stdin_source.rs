//! Console transport.
//!
//! Drives the engine from a terminal instead of the chat service, which is
//! handy on a bench device or over SSH:
//! - `/verb args...` lines are slash commands;
//! - `@token` lines press the button carrying `token`;
//! - anything else is ignored with a `warn!`.
//!
//! Every event is attributed to the configured operator chat. Replies are
//! printed to stdout followed by their buttons as `[label] @token`, so a
//! prompt can be answered by pasting the token back. Documents are not
//! uploaded; their path is printed instead.
//!
//! EOF, a read error or a dropped receiver ends the task; so does the
//! cancellation token.

use std::path::Path;

use async_trait::async_trait;
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::{Mutex, mpsc::Sender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use super::{Button, Command, Inbound, InboundEvent, Transport};

/// Transport reading commands from stdin and printing replies to stdout.
pub struct StdinTransport {
    chat_id: i64,
    out: Mutex<io::Stdout>,
}

impl StdinTransport {
    #[must_use]
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            out: Mutex::new(io::stdout()),
        }
    }

    async fn print(&self, text: &str) -> anyhow::Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

/// Turn one console line into an event for `chat_id`.
pub fn parse_line(line: &str, chat_id: i64) -> Option<Inbound> {
    let line = line.trim();
    let event = if let Some(token) = line.strip_prefix('@') {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        InboundEvent::Callback(token.to_string())
    } else {
        InboundEvent::Command(Command::parse(line)?)
    };
    Some(Inbound { chat_id, event })
}

/// Reply text followed by one line per button row.
pub fn render_console(text: &str, keyboard: &[Vec<Button>]) -> String {
    let mut rendered = format!("{text}\n");
    for row in keyboard {
        let buttons: Vec<String> = row
            .iter()
            .map(|b| format!("[{}] @{}", b.label, b.token))
            .collect();
        rendered.push_str("  ");
        rendered.push_str(&buttons.join("  "));
        rendered.push('\n');
    }
    rendered
}

#[async_trait]
impl Transport for StdinTransport {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn start(&self, sender: Sender<Inbound>, cancel: CancellationToken) -> JoinHandle<()> {
        let chat_id = self.chat_id;
        tokio::spawn(async move {
            info!(target: "telepwn::sources", "Console transport started (reading lines)");
            let mut reader = BufReader::new(io::stdin());
            let mut line = String::new();

            loop {
                line.clear();
                let read = tokio::select! {
                    _ = cancel.cancelled() => break,
                    read = reader.read_line(&mut line) => read,
                };
                match read {
                    Ok(0) => {
                        info!(target: "telepwn::sources", "EOF on stdin; console transport exiting");
                        break;
                    }
                    Ok(_) => {
                        let raw = line.trim();
                        if raw.is_empty() {
                            continue;
                        }
                        let Some(event) = parse_line(raw, chat_id) else {
                            warn!(target: "telepwn::sources", line = raw, "Expected /command or @token");
                            continue;
                        };
                        trace!(target: "telepwn::sources", line = raw, "Console event");
                        if let Err(e) = sender.send(event).await {
                            error!(
                                target: "telepwn::sources",
                                error = %e,
                                "Channel closed while sending console event; terminating task"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(target: "telepwn::sources", error = %e, "Error reading from stdin; terminating task");
                        break;
                    }
                }
            }

            trace!(target: "telepwn::sources", "Console transport ended");
        })
    }

    async fn send(&self, _chat_id: i64, text: &str, keyboard: &[Vec<Button>]) -> anyhow::Result<()> {
        self.print(&render_console(text, keyboard)).await
    }

    async fn send_document(&self, _chat_id: i64, path: &Path) -> anyhow::Result<()> {
        self.print(&format!("📎 {}\n", path.display())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_become_commands_or_presses() {
        let Some(Inbound { chat_id, event: InboundEvent::Command(cmd) }) = parse_line(" /schedule list ", 9)
        else {
            panic!("expected a command");
        };
        assert_eq!(chat_id, 9);
        assert_eq!(cmd.verb, "schedule");

        assert_eq!(
            parse_line("@confirm:shell:ls -la", 9).map(|i| i.event),
            Some(InboundEvent::Callback("confirm:shell:ls -la".into()))
        );
        assert_eq!(parse_line("hello", 9), None);
        assert_eq!(parse_line("@  ", 9), None);
    }

    #[test]
    fn console_lists_buttons_per_row() {
        let rendered = render_console(
            "Pick one",
            &[
                vec![Button::new("Yes", "confirm:shutdown:"), Button::new("No", "cancel")],
                vec![Button::new("Menu", "show_menu")],
            ],
        );
        assert_eq!(
            rendered,
            "Pick one\n  [Yes] @confirm:shutdown:  [No] @cancel\n  [Menu] @show_menu\n"
        );
    }
}
