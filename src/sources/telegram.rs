//! Telegram Bot API transport: long polling in, `sendMessage`/`sendDocument` out.
//!
//! Button presses are answered right away and the pressed message loses its
//! keyboard, so every inline button can only be pressed once.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{Button, Command, Inbound, InboundEvent, Transport};

const API_BASE: &str = "https://api.telegram.org";
/// Server-side long-poll wait in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;
/// Client-side bound for one `getUpdates` round trip.
const POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(POLL_TIMEOUT_SECS + 10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const RETRY_BASE: Duration = Duration::from_secs(1);
const RETRY_MAX: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub message: Option<Message>,
    pub data: Option<String>,
}

impl Update {
    /// Event carried by this update, if any. Plain text and callbacks
    /// without data or origin message are dropped.
    pub fn to_inbound(&self) -> Option<Inbound> {
        if let Some(message) = &self.message {
            let command = Command::parse(message.text.as_deref()?)?;
            return Some(Inbound {
                chat_id: message.chat.id,
                event: InboundEvent::Command(command),
            });
        }
        let query = self.callback_query.as_ref()?;
        Some(Inbound {
            chat_id: query.message.as_ref()?.chat.id,
            event: InboundEvent::Callback(query.data.clone()?),
        })
    }
}

/// `reply_markup` for a keyboard; `None` when there are no buttons.
pub fn inline_keyboard(keyboard: &[Vec<Button>]) -> Option<Value> {
    if keyboard.is_empty() {
        return None;
    }
    let rows: Vec<Vec<Value>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.label, "callback_data": b.token }))
                .collect()
        })
        .collect();
    Some(json!({ "inline_keyboard": rows }))
}

/// Thin Bot API client shared by the polling task and the send side.
#[derive(Debug)]
struct Api {
    client: reqwest::Client,
    token: String,
}

impl Api {
    fn url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{method}", self.token)
    }

    async fn decode<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
        let body: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Invalid {method} response"))?;
        if !body.ok {
            bail!(
                "{method} rejected: {}",
                body.description.unwrap_or_else(|| "no description".into())
            );
        }
        body.result.ok_or_else(|| anyhow!("{method} returned no result"))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value, timeout: Duration) -> Result<T> {
        let response = self
            .client
            .post(self.url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;
        Self::decode(method, response).await
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call("getUpdates", &body, POLL_REQUEST_TIMEOUT).await
    }

    /// Acknowledge a press and strip the keyboard from the pressed message.
    /// Both calls are cosmetic; failures are only logged.
    async fn settle_callback(&self, query: &CallbackQuery) {
        let answer = json!({ "callback_query_id": query.id });
        if let Err(e) = self.call::<Value>("answerCallbackQuery", &answer, REQUEST_TIMEOUT).await {
            debug!(target: "telepwn::telegram", error = %e, "answerCallbackQuery failed");
        }
        if let Some(message) = &query.message {
            let edit = json!({
                "chat_id": message.chat.id,
                "message_id": message.message_id,
                "reply_markup": { "inline_keyboard": [] },
            });
            if let Err(e) = self.call::<Value>("editMessageReplyMarkup", &edit, REQUEST_TIMEOUT).await {
                debug!(target: "telepwn::telegram", error = %e, "editMessageReplyMarkup failed");
            }
        }
    }
}

/// Transport backed by the Telegram Bot API.
pub struct TelegramTransport {
    api: Arc<Api>,
}

impl TelegramTransport {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api: Arc::new(Api {
                client: reqwest::Client::new(),
                token: token.into(),
            }),
        }
    }
}

async fn poll_loop(api: Arc<Api>, sender: Sender<Inbound>, cancel: CancellationToken) {
    info!(target: "telepwn::telegram", "Long polling started");
    let mut offset = 0_i64;
    let mut backoff = RETRY_BASE;
    loop {
        let updates = tokio::select! {
            _ = cancel.cancelled() => break,
            updates = api.get_updates(offset) => updates,
        };
        let updates = match updates {
            Ok(updates) => {
                backoff = RETRY_BASE;
                updates
            }
            Err(e) => {
                error!(target: "telepwn::telegram", error = %format!("{e:#}"), retry_secs = backoff.as_secs(), "getUpdates failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(RETRY_MAX);
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            if let Some(query) = &update.callback_query {
                api.settle_callback(query).await;
            }
            let Some(event) = update.to_inbound() else {
                trace!(target: "telepwn::telegram", update_id = update.update_id, "Ignoring update");
                continue;
            };
            if sender.send(event).await.is_err() {
                info!(target: "telepwn::telegram", "Receiver dropped; polling stopped");
                return;
            }
        }
    }
    info!(target: "telepwn::telegram", "Long polling stopped");
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn start(&self, sender: Sender<Inbound>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(poll_loop(self.api.clone(), sender, cancel))
    }

    async fn send(&self, chat_id: i64, text: &str, keyboard: &[Vec<Button>]) -> Result<()> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = inline_keyboard(keyboard) {
            body["reply_markup"] = markup;
        }
        self.api.call::<Value>("sendMessage", &body, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".into());
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", reqwest::multipart::Part::bytes(bytes).file_name(file_name));
        let response = self
            .api
            .client
            .post(self.api.url("sendDocument"))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .context("sendDocument request failed")?;
        Api::decode::<Value>("sendDocument", response).await?;
        Ok(())
    }

    async fn announce_commands(&self, commands: &[(&str, &str)]) -> Result<()> {
        let commands: Vec<Value> = commands
            .iter()
            .map(|(command, description)| json!({ "command": command, "description": description }))
            .collect();
        let accepted: bool = self
            .api
            .call("setMyCommands", &json!({ "commands": commands }), REQUEST_TIMEOUT)
            .await?;
        if !accepted {
            warn!(target: "telepwn::telegram", "setMyCommands returned false");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(v: Value) -> Update {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn message_update_becomes_command() {
        let u = update(json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "chat": { "id": 77, "type": "private" },
                "text": "/webhook ping hello",
                "date": 0
            }
        }));
        let inbound = u.to_inbound().unwrap();
        assert_eq!(inbound.chat_id, 77);
        let InboundEvent::Command(cmd) = inbound.event else {
            panic!("expected command");
        };
        assert_eq!(cmd.verb, "webhook");
        assert_eq!(cmd.args, vec!["ping", "hello"]);
    }

    #[test]
    fn callback_update_carries_token_and_origin_chat() {
        let u = update(json!({
            "update_id": 11,
            "callback_query": {
                "id": "abc",
                "from": { "id": 5, "is_bot": false, "first_name": "op" },
                "message": { "message_id": 3, "chat": { "id": 77 }, "date": 0 },
                "data": "confirm:reboot:auto"
            }
        }));
        assert_eq!(
            u.to_inbound(),
            Some(Inbound {
                chat_id: 77,
                event: InboundEvent::Callback("confirm:reboot:auto".into()),
            })
        );
    }

    #[test]
    fn plain_text_and_empty_updates_are_dropped() {
        let text = update(json!({
            "update_id": 12,
            "message": { "message_id": 4, "chat": { "id": 77 }, "text": "hi" }
        }));
        assert!(text.to_inbound().is_none());
        assert!(update(json!({ "update_id": 13 })).to_inbound().is_none());
    }

    #[test]
    fn keyboard_rows_map_to_inline_markup() {
        assert!(inline_keyboard(&[]).is_none());
        let markup = inline_keyboard(&[vec![Button::new("📋 Menu", "show_menu")]]).unwrap();
        assert_eq!(
            markup,
            json!({ "inline_keyboard": [[{ "text": "📋 Menu", "callback_data": "show_menu" }]] })
        );
    }
}
