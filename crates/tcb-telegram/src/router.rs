use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};
use tracing::{info, warn};

use tcb_core::{
    commands::MENU,
    config::Config,
    conversation::{Conversation, ConversationSettings},
    dispatcher::Dispatcher as CommandDispatcher,
    messaging::port::MessagingPort,
    ports::{FormClient, Store},
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<CommandDispatcher>,
}

/// Entries for the client-side command menu.
pub fn menu_commands() -> Vec<BotCommand> {
    MENU.iter()
        .map(|(name, description)| BotCommand::new(*name, *description))
        .collect()
}

pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    form: Arc<dyn FormClient>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "bot started"),
        Err(e) => warn!(error = %e, "cannot fetch bot identity"),
    }

    if let Err(e) = bot.set_my_commands(menu_commands()).await {
        warn!(error = %e, "cannot publish command menu");
    }

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let conversation = Conversation::new(
        store,
        form,
        messenger,
        ConversationSettings {
            captcha_send_delay: cfg.captcha_send_delay,
        },
    );

    let state = Arc::new(AppState {
        commands: Arc::new(CommandDispatcher::new(conversation)),
    });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("polling stopped");
    Ok(())
}
