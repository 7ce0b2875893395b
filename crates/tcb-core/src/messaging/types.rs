use crate::domain::{AccountId, ChatId};

/// Incoming text (command or free text) from one account in one chat.
#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub account_id: AccountId,
    pub username: Option<String>,
    pub text: String,
}

/// A single in-memory photo with a caption.
#[derive(Clone, Debug)]
pub struct PhotoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}
