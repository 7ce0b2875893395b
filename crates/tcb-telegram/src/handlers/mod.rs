//! Telegram update handlers.
//!
//! Text messages are converted into core `TextMessage`s and handed to the
//! command dispatcher; everything else is ignored.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::debug;

use crate::router::AppState;

mod text;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(inbound) = text::to_text_message(&msg) else {
        debug!(chat = msg.chat.id.0, "ignoring non-text message");
        return Ok(());
    };

    state.commands.handle(inbound).await;
    Ok(())
}
