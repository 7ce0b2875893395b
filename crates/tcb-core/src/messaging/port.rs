use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::PhotoUpload,
    Result,
};

/// Outbound messaging port.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
    async fn send_photo(&self, chat_id: ChatId, photo: PhotoUpload) -> Result<MessageRef>;
}
