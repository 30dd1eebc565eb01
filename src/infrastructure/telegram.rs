//! # Telegram Transport
//!
//! Bot API binding: long-poll `getUpdates` decoded into inbound events on
//! the way in, `ChatPort` over `sendMessage`/`sendPhoto`/`sendAudio`/
//! `editMessageText`/`deleteMessage` on the way out. The chat id doubles as
//! the opaque user id for direct conversations.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::providers::http_client;
use crate::domain::config::{TelegramConfig, secret_from_env};
use crate::domain::traits::ChatPort;
use crate::domain::types::{Button, InboundEvent};

pub struct TelegramService {
    base_url: String,
    poll_timeout: u64,
}

/// Bot API envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    message: Option<Message>,
}

/// One decoded inbound event plus the callback-query id to acknowledge, if
/// the event came from a button press.
pub struct DecodedUpdate {
    pub user_id: String,
    pub event: InboundEvent,
    pub callback_id: Option<String>,
}

/// Map one raw update to an inbound event. Updates the bot cannot act on
/// (joins, stickers, edits) decode to `None`.
pub fn decode_update(update: Update) -> Option<DecodedUpdate> {
    if let Some(message) = update.message {
        let text = message.text?;
        return Some(DecodedUpdate {
            user_id: message.chat.id.to_string(),
            event: InboundEvent::from_text(&text),
            callback_id: None,
        });
    }
    if let Some(query) = update.callback_query {
        let data = query.data?;
        let message = query.message?;
        return Some(DecodedUpdate {
            user_id: message.chat.id.to_string(),
            event: InboundEvent::Button(data),
            callback_id: Some(query.id),
        });
    }
    None
}

impl TelegramService {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let token = secret_from_env(&config.token_env).map_err(anyhow::Error::msg)?;
        Ok(Self {
            base_url: format!("https://api.telegram.org/bot{token}"),
            poll_timeout: config.poll_timeout,
        })
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Value, String> {
        let url = format!("{}/{method}", self.base_url);
        let response = http_client()
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("telegram {method}: {e}"))?;
        let envelope: ApiResponse<Value> = response
            .json()
            .await
            .map_err(|e| format!("telegram {method}: undecodable response: {e}"))?;
        if !envelope.ok {
            return Err(format!(
                "telegram {method}: {}",
                envelope.description.unwrap_or_else(|| "unknown error".to_string())
            ));
        }
        envelope
            .result
            .ok_or_else(|| format!("telegram {method}: missing result"))
    }

    fn message_id(result: &Value) -> Result<String, String> {
        result
            .get("message_id")
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .ok_or_else(|| "telegram: reply without message_id".to_string())
    }

    /// One long-poll round. Returns the next offset and the decoded events.
    pub async fn poll(&self, offset: i64) -> Result<(i64, Vec<DecodedUpdate>), String> {
        let url = format!("{}/getUpdates", self.base_url);
        let response = http_client()
            .post(&url)
            // The request must outlive the server-side hold.
            .timeout(std::time::Duration::from_secs(self.poll_timeout + 10))
            .json(&json!({
                "offset": offset,
                "timeout": self.poll_timeout,
                "allowed_updates": ["message", "callback_query"],
            }))
            .send()
            .await
            .map_err(|e| format!("telegram getUpdates: {e}"))?;
        let envelope: ApiResponse<Vec<Update>> = response
            .json()
            .await
            .map_err(|e| format!("telegram getUpdates: undecodable response: {e}"))?;
        if !envelope.ok {
            return Err(format!(
                "telegram getUpdates: {}",
                envelope.description.unwrap_or_else(|| "unknown error".to_string())
            ));
        }

        let updates = envelope.result.unwrap_or_default();
        let next_offset = updates
            .iter()
            .map(|u| u.update_id + 1)
            .max()
            .unwrap_or(offset);

        let mut decoded = Vec::new();
        for update in updates {
            if let Some(event) = decode_update(update) {
                // Stop the client-side spinner on the pressed button.
                if let Some(callback_id) = &event.callback_id {
                    let _ = self
                        .call("answerCallbackQuery", json!({ "callback_query_id": callback_id }))
                        .await;
                }
                decoded.push(event);
            }
        }
        Ok((next_offset, decoded))
    }
}

#[async_trait]
impl ChatPort for TelegramService {
    async fn send_message(&self, user_id: &str, content: &str) -> Result<String, String> {
        tracing::info!("Bot sending message to {user_id}");
        let result = self
            .call("sendMessage", json!({ "chat_id": user_id, "text": content }))
            .await?;
        Self::message_id(&result)
    }

    async fn send_menu(
        &self,
        user_id: &str,
        content: &str,
        buttons: &[Vec<Button>],
    ) -> Result<String, String> {
        let keyboard: Vec<Vec<Value>> = buttons
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| json!({ "text": b.label, "callback_data": b.data }))
                    .collect()
            })
            .collect();
        let result = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": user_id,
                    "text": content,
                    "reply_markup": { "inline_keyboard": keyboard },
                }),
            )
            .await?;
        Self::message_id(&result)
    }

    async fn send_photo(&self, user_id: &str, image: &[u8]) -> Result<String, String> {
        let form = reqwest::multipart::Form::new()
            .text("chat_id", user_id.to_string())
            .part(
                "photo",
                reqwest::multipart::Part::bytes(image.to_vec()).file_name("image.png"),
            );
        let url = format!("{}/sendPhoto", self.base_url);
        let response = http_client()
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("telegram sendPhoto: {e}"))?;
        let envelope: ApiResponse<Value> = response
            .json()
            .await
            .map_err(|e| format!("telegram sendPhoto: undecodable response: {e}"))?;
        if !envelope.ok {
            return Err(format!(
                "telegram sendPhoto: {}",
                envelope.description.unwrap_or_else(|| "unknown error".to_string())
            ));
        }
        Self::message_id(&envelope.result.unwrap_or_default())
    }

    async fn send_audio(
        &self,
        user_id: &str,
        audio: &[u8],
        title: &str,
    ) -> Result<String, String> {
        let form = reqwest::multipart::Form::new()
            .text("chat_id", user_id.to_string())
            .text("title", title.to_string())
            .part(
                "audio",
                reqwest::multipart::Part::bytes(audio.to_vec()).file_name("audio.mp3"),
            );
        let url = format!("{}/sendAudio", self.base_url);
        let response = http_client()
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| format!("telegram sendAudio: {e}"))?;
        let envelope: ApiResponse<Value> = response
            .json()
            .await
            .map_err(|e| format!("telegram sendAudio: undecodable response: {e}"))?;
        if !envelope.ok {
            return Err(format!(
                "telegram sendAudio: {}",
                envelope.description.unwrap_or_else(|| "unknown error".to_string())
            ));
        }
        Self::message_id(&envelope.result.unwrap_or_default())
    }

    async fn edit_message(
        &self,
        user_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), String> {
        self.call(
            "editMessageText",
            json!({ "chat_id": user_id, "message_id": message_id.parse::<i64>().unwrap_or_default(), "text": content }),
        )
        .await
        .map(|_| ())
    }

    async fn delete_message(&self, user_id: &str, message_id: &str) -> Result<(), String> {
        self.call(
            "deleteMessage",
            json!({ "chat_id": user_id, "message_id": message_id.parse::<i64>().unwrap_or_default() }),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(raw: Value) -> Update {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_decode_text_message() {
        let decoded = decode_update(update(json!({
            "update_id": 7,
            "message": { "chat": { "id": 42 }, "text": "/start" }
        })))
        .unwrap();
        assert_eq!(decoded.user_id, "42");
        assert_eq!(
            decoded.event,
            InboundEvent::Command {
                name: "start".to_string(),
                args: String::new()
            }
        );
        assert!(decoded.callback_id.is_none());
    }

    #[test]
    fn test_decode_button_press() {
        let decoded = decode_update(update(json!({
            "update_id": 8,
            "callback_query": {
                "id": "cb1",
                "data": "text2img",
                "message": { "chat": { "id": 42 } }
            }
        })))
        .unwrap();
        assert_eq!(decoded.user_id, "42");
        assert_eq!(decoded.event, InboundEvent::Button("text2img".to_string()));
        assert_eq!(decoded.callback_id.as_deref(), Some("cb1"));
    }

    #[test]
    fn test_unsupported_updates_are_skipped() {
        assert!(decode_update(update(json!({ "update_id": 9 }))).is_none());
        // A photo-only message carries no text.
        assert!(decode_update(update(json!({
            "update_id": 10,
            "message": { "chat": { "id": 42 } }
        })))
        .is_none());
    }
}
