//! The dispatcher-facing sender: one Bot API call per destination.

use async_trait::async_trait;

use postcast_core::error::SendError;
use postcast_core::traits::DestinationSender;
use postcast_core::types::PostPayload;

use crate::api::TelegramClient;

/// Sends post payloads to Telegram chats. Destination ids are whatever the
/// Bot API accepts as `chat_id`: numeric ids (`-1001234`) or `@usernames`.
pub struct TelegramSender {
    client: TelegramClient,
}

impl TelegramSender {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DestinationSender for TelegramSender {
    async fn send(&self, destination_id: &str, payload: &PostPayload) -> Result<(), SendError> {
        self.client.send_payload(destination_id, payload).await
    }
}
