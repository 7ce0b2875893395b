use teloxide::types::Message;

use tcb_core::{
    domain::{AccountId, ChatId},
    messaging::types::TextMessage,
};

/// `None` for updates without text or without a sender (channel posts).
pub(crate) fn to_text_message(msg: &Message) -> Option<TextMessage> {
    let text = msg.text()?;
    let user = msg.from()?;
    Some(TextMessage {
        chat_id: ChatId(msg.chat.id.0),
        account_id: AccountId(user.id.0 as i64),
        username: user.username.clone(),
        text: text.to_string(),
    })
}
