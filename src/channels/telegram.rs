//! Telegram channel — long-polls the Bot API for updates.
//!
//! Prompts go out as `sendMessage` with one-time reply keyboards; collected
//! files are forwarded by `file_id`, so nothing is ever downloaded.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::channels::{
    AttachmentKind, AttachmentRef, Channel, EventStream, IncomingEvent, Sender, SharedContact,
};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll before trying again.
const POLL_BACKOFF: std::time::Duration = std::time::Duration::from_secs(5);

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    client: reqwest::Client,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
            poller: Mutex::new(None),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// POST a JSON body to a Bot API method.
    async fn call(&self, method: &str, body: &Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ChannelError::RateLimited {
                name: "telegram".into(),
            });
        }
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} returned {status}: {err}"),
            });
        }
        Ok(())
    }

    /// Send a text message, split to fit Telegram's 4096 char limit.
    /// A reply keyboard, if any, is attached to the last chunk.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == last
                && let Some(markup) = &reply_markup
            {
                body["reply_markup"] = markup.clone();
            }
            self.call("sendMessage", &body).await?;
        }
        Ok(())
    }
}

fn api_url(bot_token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        bot_token.expose_secret()
    )
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();

        let handle = tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!(response = %data, "Telegram getUpdates returned no result");
                    tokio::time::sleep(POLL_BACKOFF).await;
                    continue;
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(message) = update.get("message") else {
                        continue;
                    };
                    let Some(event) = event_from_message(message) else {
                        tracing::debug!("Telegram: skipping message without chat or sender");
                        continue;
                    };

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        *self.poller.lock().await = Some(handle);

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_prompt(
        &self,
        chat: &str,
        text: &str,
        choices: Option<&[Vec<String>]>,
    ) -> Result<(), ChannelError> {
        self.send_message(chat, text, Some(prompt_markup(choices)))
            .await
    }

    async fn send_contact_request(
        &self,
        chat: &str,
        text: &str,
        label: &str,
    ) -> Result<(), ChannelError> {
        self.send_message(chat, text, Some(contact_keyboard(label)))
            .await
    }

    async fn send_document(&self, chat: &str, file: &AttachmentRef) -> Result<(), ChannelError> {
        let (method, field) = match file.kind {
            AttachmentKind::Photo => ("sendPhoto", "photo"),
            AttachmentKind::Document => ("sendDocument", "document"),
        };
        let mut body = json!({ "chat_id": chat });
        body[field] = Value::String(file.file_id.clone());

        self.call(method, &body).await?;
        tracing::debug!(chat = %chat, file_id = %file.file_id, "Telegram file forwarded");
        Ok(())
    }

    async fn send_text(&self, chat: &str, text: &str) -> Result<(), ChannelError> {
        self.send_message(chat, text, None).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        if let Some(handle) = self.poller.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Build an inbound event from a Bot API `message` object.
///
/// Returns `None` when the chat or sender id is missing. Captions are
/// ignored; of a photo's sizes only the largest (last) is kept.
fn event_from_message(message: &Value) -> Option<IncomingEvent> {
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?;
    let from = message.get("from")?;
    let user_id = from.get("id").and_then(Value::as_i64)?;

    let handle = from
        .get("username")
        .and_then(Value::as_str)
        .map(String::from);
    let display_name = from
        .get("first_name")
        .and_then(Value::as_str)
        .or(handle.as_deref())
        .unwrap_or("unknown")
        .to_string();

    let mut event = IncomingEvent::new(
        "telegram",
        format!("{chat_id}:{user_id}"),
        chat_id.to_string(),
    )
    .with_sender(Sender {
        handle,
        display_name,
    });

    if let Some(text) = message.get("text").and_then(Value::as_str) {
        event = event.with_text(text);
    }

    if let Some(contact) = message.get("contact")
        && let Some(phone) = contact.get("phone_number").and_then(Value::as_str)
    {
        event = event.with_contact(SharedContact {
            phone: phone.to_string(),
            first_name: contact
                .get("first_name")
                .and_then(Value::as_str)
                .map(String::from),
        });
    }

    let photo = message
        .get("photo")
        .and_then(Value::as_array)
        .and_then(|sizes| sizes.last())
        .and_then(|size| size.get("file_id"))
        .and_then(Value::as_str)
        .map(AttachmentRef::photo);
    let document = message
        .get("document")
        .and_then(|d| d.get("file_id"))
        .and_then(Value::as_str)
        .map(AttachmentRef::document);
    if let Some(attachment) = photo.or(document) {
        event = event.with_attachment(attachment);
    }

    Some(event)
}

/// Reply markup for a prompt: its choices, or removal of any earlier keyboard.
fn prompt_markup(choices: Option<&[Vec<String>]>) -> Value {
    match choices {
        Some(rows) => choice_keyboard(rows),
        None => json!({ "remove_keyboard": true }),
    }
}

/// One-time reply keyboard with one button per choice.
fn choice_keyboard(rows: &[Vec<String>]) -> Value {
    let keyboard: Vec<Vec<Value>> = rows
        .iter()
        .map(|row| row.iter().map(|text| json!({ "text": text })).collect())
        .collect();
    json!({
        "keyboard": keyboard,
        "one_time_keyboard": true,
        "resize_keyboard": true,
    })
}

/// One-time reply keyboard with a single share-contact button.
fn contact_keyboard(label: &str) -> Value {
    json!({
        "keyboard": [[{ "text": label, "request_contact": true }]],
        "one_time_keyboard": true,
        "resize_keyboard": true,
    })
}

/// Split a message into chunks of at most `max_chars` characters.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        // Byte offset of the first character past the limit.
        let Some((limit, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            // Don't split at position 0 (infinite loop guard)
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
        if remaining.is_empty() {
            break;
        }
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
