//! Bot API client, long-polling, and wire types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use postcast_core::error::{PostcastError, Result, SendError};
use postcast_core::types::{MediaKind, PostPayload};

/// Thin Bot API client. Cloneable; the underlying connection pool is shared.
#[derive(Clone)]
pub struct TelegramClient {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(bot_token: &str, send_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(send_timeout)
            .build()
            .map_err(|e| PostcastError::Channel(format!("HTTP client init failed: {e}")))?;
        Ok(Self { bot_token: bot_token.to_string(), client })
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    /// One Bot API call with retryable/terminal error classification.
    ///
    /// Transport failures (timeouts, connection errors) are retryable; an
    /// `ok: false` answer from the API is terminal, the request itself was
    /// rejected and repeating it will not help.
    async fn invoke(&self, method: &str, body: &serde_json::Value) -> std::result::Result<(), SendError> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        let result: TelegramApiResponse<serde_json::Value> =
            response.json().await.map_err(classify)?;

        if !result.ok {
            return Err(SendError::Terminal(format!(
                "{method} rejected: {}",
                result.description.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Deliver a post payload to one chat. Used by the fan-out sender.
    pub async fn send_payload(
        &self,
        chat_id: &str,
        payload: &PostPayload,
    ) -> std::result::Result<(), SendError> {
        let (method, body) = payload_request(chat_id, payload);
        self.invoke(method, &body).await
    }

    /// Plain-text operator reply. Failures here are not retried, so the
    /// classification collapses into a single error type.
    pub async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        self.invoke("sendMessage", &body)
            .await
            .map_err(|e| PostcastError::Channel(e.to_string()))
    }

    /// Get bot info, used as a startup connectivity check.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| PostcastError::Channel(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| PostcastError::Channel(format!("Invalid getMe response: {e}")))?;
        body.result
            .ok_or_else(|| PostcastError::Channel("No bot info".into()))
    }
}

fn classify(e: reqwest::Error) -> SendError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        SendError::Retryable(format!("network error: {e}"))
    } else {
        SendError::Terminal(format!("invalid response: {e}"))
    }
}

/// Map a payload to the Bot API method and JSON body that deliver it.
fn payload_request(chat_id: &str, payload: &PostPayload) -> (&'static str, serde_json::Value) {
    match payload {
        PostPayload::Text(text) => (
            "sendMessage",
            serde_json::json!({ "chat_id": chat_id, "text": text }),
        ),
        PostPayload::Media { kind, file_id, caption } => {
            let (method, field) = match kind {
                MediaKind::Photo => ("sendPhoto", "photo"),
                MediaKind::Video => ("sendVideo", "video"),
                MediaKind::Document => ("sendDocument", "document"),
            };
            let mut body = serde_json::json!({ "chat_id": chat_id, field: file_id });
            if let Some(caption) = caption {
                body["caption"] = serde_json::json!(caption);
            }
            (method, body)
        }
    }
}

/// Long-polling update reader with offset tracking.
pub struct UpdatePoller {
    client: TelegramClient,
    last_update_id: i64,
}

impl UpdatePoller {
    pub fn new(client: TelegramClient) -> Self {
        Self { client, last_update_id: 0 }
    }

    /// Fetch the next batch of updates, advancing the offset past everything
    /// returned so updates are consumed exactly once.
    pub async fn get_updates(&mut self) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .client
            .client
            .get(self.client.api_url("getUpdates"))
            .query(&[
                ("offset", (self.last_update_id + 1).to_string()),
                ("timeout", "30".into()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .send()
            .await
            .map_err(|e| PostcastError::Channel(format!("getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| PostcastError::Channel(format!("Invalid getUpdates response: {e}")))?;

        if !body.ok {
            return Err(PostcastError::Channel(format!(
                "getUpdates rejected: {}",
                body.description.unwrap_or_default()
            )));
        }

        let updates = body.result.unwrap_or_default();
        if let Some(last) = updates.last() {
            self.last_update_id = last.update_id;
        }
        Ok(updates)
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub date: i64,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub photo: Option<Vec<TelegramPhotoSize>>,
    pub video: Option<TelegramVideo>,
    pub document: Option<TelegramDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramPhotoSize {
    pub file_id: String,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramVideo {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramDocument {
    pub file_id: String,
}

/// An operator message extracted from an update: who sent it, where, and the
/// content as a post payload. Commands arrive as `Text` starting with `/`.
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    pub chat_id: i64,
    pub sender_id: i64,
    pub payload: PostPayload,
}

impl TelegramUpdate {
    /// Extract an operator event, or `None` for updates we ignore (bots,
    /// service messages, unsupported content).
    pub fn to_event(&self) -> Option<IncomingEvent> {
        let msg = self.message.as_ref()?;
        let from = msg.from.as_ref()?;
        if from.is_bot {
            return None;
        }

        let payload = if let Some(text) = &msg.text {
            PostPayload::Text(text.clone())
        } else if let Some(photo) = msg.photo.as_ref().filter(|p| !p.is_empty()) {
            // Telegram sends multiple sizes; the last is the largest.
            PostPayload::Media {
                kind: MediaKind::Photo,
                file_id: photo[photo.len() - 1].file_id.clone(),
                caption: msg.caption.clone(),
            }
        } else if let Some(video) = &msg.video {
            PostPayload::Media {
                kind: MediaKind::Video,
                file_id: video.file_id.clone(),
                caption: msg.caption.clone(),
            }
        } else if let Some(document) = &msg.document {
            PostPayload::Media {
                kind: MediaKind::Document,
                file_id: document.file_id.clone(),
                caption: msg.caption.clone(),
            }
        } else {
            return None;
        };

        Some(IncomingEvent { chat_id: msg.chat.id, sender_id: from.id, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(message: serde_json::Value) -> TelegramUpdate {
        serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "message": message,
        }))
        .unwrap()
    }

    fn base_message() -> serde_json::Value {
        serde_json::json!({
            "message_id": 10,
            "from": { "id": 42, "is_bot": false, "first_name": "Op" },
            "chat": { "id": 42, "type": "private" },
            "date": 1767000000,
        })
    }

    #[test]
    fn test_text_update_to_event() {
        let mut msg = base_message();
        msg["text"] = serde_json::json!("/start");
        let event = update(msg).to_event().unwrap();
        assert_eq!(event.chat_id, 42);
        assert_eq!(event.payload, PostPayload::Text("/start".into()));
    }

    #[test]
    fn test_photo_update_picks_largest_size() {
        let mut msg = base_message();
        msg["photo"] = serde_json::json!([
            { "file_id": "small", "width": 90, "height": 90 },
            { "file_id": "large", "width": 1280, "height": 1280 },
        ]);
        msg["caption"] = serde_json::json!("look");
        let event = update(msg).to_event().unwrap();
        assert_eq!(
            event.payload,
            PostPayload::Media {
                kind: MediaKind::Photo,
                file_id: "large".into(),
                caption: Some("look".into()),
            }
        );
    }

    #[test]
    fn test_bot_and_empty_updates_skipped() {
        let mut msg = base_message();
        msg["from"]["is_bot"] = serde_json::json!(true);
        msg["text"] = serde_json::json!("hi");
        assert!(update(msg).to_event().is_none());

        // No content at all (e.g. a sticker)
        assert!(update(base_message()).to_event().is_none());
    }

    #[test]
    fn test_payload_request_methods() {
        let (method, body) = payload_request("-100123", &PostPayload::Text("hi".into()));
        assert_eq!(method, "sendMessage");
        assert_eq!(body["text"], "hi");
        assert_eq!(body["chat_id"], "-100123");

        let (method, body) = payload_request(
            "-100123",
            &PostPayload::Media {
                kind: MediaKind::Video,
                file_id: "V9".into(),
                caption: Some("clip".into()),
            },
        );
        assert_eq!(method, "sendVideo");
        assert_eq!(body["video"], "V9");
        assert_eq!(body["caption"], "clip");

        let (method, body) = payload_request(
            "-100123",
            &PostPayload::Media { kind: MediaKind::Document, file_id: "D1".into(), caption: None },
        );
        assert_eq!(method, "sendDocument");
        assert!(body.get("caption").is_none());
    }
}
