use tracing::{debug, error};

use crate::{
    commands::Command, conversation::Conversation, errors::Error, locks::AccountLocks,
    messaging::types::TextMessage, Result,
};

/// Routes inbound texts to conversation operations and reports failures.
pub struct Dispatcher {
    conversation: Conversation,
    locks: AccountLocks,
}

impl Dispatcher {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            locks: AccountLocks::default(),
        }
    }

    /// Handle one inbound text. Never fails: errors are logged and, when they
    /// have a human reply, sent back to the chat.
    pub async fn handle(&self, msg: TextMessage) {
        let _guard = self.locks.lock(msg.account_id).await;

        debug!(
            account = msg.account_id.0,
            chat = msg.chat_id.0,
            username = msg.username.as_deref().unwrap_or(""),
            "inbound text"
        );

        if let Err(e) = self.route(&msg).await {
            self.report(&msg, e).await;
        }
    }

    async fn route(&self, msg: &TextMessage) -> Result<()> {
        let c = &self.conversation;
        match Command::parse(&msg.text)? {
            Command::Start => c.start(msg).await,
            Command::AddCard => c.add_card(msg).await,
            Command::Cards => c.cards(msg).await,
            Command::Cancel => c.cancel(msg).await,
            Command::Balance(id) => c.balance(msg, id).await,
            Command::RemoveCard(id) => c.confirm_remove(msg, id).await,
            Command::ConfirmRemove(id) => c.remove(msg, id).await,
            Command::Text(text) => c.text(msg, &text).await,
        }
    }

    async fn report(&self, msg: &TextMessage, err: Error) {
        if err.is_failure() {
            error!(account = msg.account_id.0, chat = msg.chat_id.0, error = %err, "request failed");
        } else {
            debug!(account = msg.account_id.0, chat = msg.chat_id.0, error = %err, "rejected input");
        }

        let Some(human) = err.human() else {
            return;
        };
        if let Err(e) = self
            .conversation
            .messenger()
            .send_text(msg.chat_id, human)
            .await
        {
            error!(chat = msg.chat_id.0, error = %e, "cannot send message with human readable error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        conversation::{
            tests::{harness, msg, Harness, Sent, GOOD_CODE, REPORT},
            ConversationSettings, ENTER_CAPTCHA, ENTER_CARD_NUMBER, GREETING,
        },
        domain::{AccountId, ConversationState},
        errors::replies,
    };
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    fn dispatcher(delay: Duration) -> (Arc<Dispatcher>, Harness) {
        let h = harness();
        let conversation = Conversation::new(
            h.store.clone(),
            h.form.clone(),
            h.messenger.clone(),
            ConversationSettings {
                captcha_send_delay: delay,
            },
        );
        (Arc::new(Dispatcher::new(conversation)), h)
    }

    #[tokio::test]
    async fn full_balance_check_through_commands() {
        let (d, h) = dispatcher(Duration::ZERO);

        d.handle(msg(1, "/start")).await;
        d.handle(msg(1, "/addcard")).await;
        d.handle(msg(1, "1234567890")).await;
        d.handle(msg(1, GOOD_CODE)).await;

        assert_eq!(
            h.messenger.take(),
            vec![
                Sent::Text(GREETING.to_string()),
                Sent::Text(ENTER_CARD_NUMBER.to_string()),
                Sent::Photo {
                    file_name: "captcha.jpg".to_string(),
                    caption: Some(ENTER_CAPTCHA.to_string())
                },
                Sent::Html(REPORT.to_string()),
            ]
        );
        assert_eq!(h.store.user(AccountId(1)).unwrap().state, None);
    }

    #[tokio::test]
    async fn unregistered_user_is_told_to_start() {
        let (d, h) = dispatcher(Duration::ZERO);
        for text in [
            "/addcard",
            "/cards",
            "/cancel",
            "/balance_1",
            "/remove_1",
            "/rm_confirm_1",
            "hello",
        ] {
            d.handle(msg(5, text)).await;
            assert_eq!(
                h.messenger.take(),
                vec![Sent::Text(replies::NOT_REGISTERED.to_string())],
                "{text}"
            );
        }
    }

    #[tokio::test]
    async fn malformed_shortcut_gets_bad_arguments() {
        let (d, h) = dispatcher(Duration::ZERO);
        d.handle(msg(1, "/start")).await;
        h.messenger.take();

        d.handle(msg(1, "/balance_abc")).await;
        assert_eq!(
            h.messenger.take(),
            vec![Sent::Text(replies::BAD_ARGUMENTS.to_string())]
        );
    }

    #[tokio::test]
    async fn wrong_code_reports_and_resets() {
        let (d, h) = dispatcher(Duration::ZERO);
        d.handle(msg(1, "/start")).await;
        d.handle(msg(1, "/addcard")).await;
        d.handle(msg(1, "42")).await;
        h.messenger.take();

        d.handle(msg(1, "0000")).await;
        assert_eq!(
            h.messenger.take(),
            vec![Sent::Text(replies::INCORRECT_CODE.to_string())]
        );
        assert_eq!(h.store.user(AccountId(1)).unwrap().state, None);
    }

    #[tokio::test]
    async fn failed_reply_is_only_logged() {
        let (d, h) = dispatcher(Duration::ZERO);
        *h.messenger.fail.lock().unwrap() = true;
        d.handle(msg(1, "/cards")).await;
        assert!(h.messenger.take().is_empty());
    }

    #[tokio::test]
    async fn captcha_is_sent_after_the_configured_delay() {
        let (d, h) = dispatcher(Duration::from_millis(50));
        d.handle(msg(1, "/start")).await;
        d.handle(msg(1, "/addcard")).await;
        h.messenger.take();

        let started = Instant::now();
        d.handle(msg(1, "7")).await;
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(
            h.store.user(AccountId(1)).unwrap().state,
            Some(ConversationState::AwaitingCaptchaCode)
        );
        assert_eq!(h.messenger.take().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_messages_from_one_account_do_not_interleave() {
        let (d, h) = dispatcher(Duration::ZERO);
        d.handle(msg(1, "/start")).await;
        d.handle(msg(1, "/addcard")).await;
        h.messenger.take();

        let a = tokio::spawn({
            let d = d.clone();
            async move { d.handle(msg(1, "111")).await }
        });
        let b = tokio::spawn({
            let d = d.clone();
            async move { d.handle(msg(1, "222")).await }
        });
        a.await.unwrap();
        b.await.unwrap();

        // One message moved the conversation to the captcha step; the other was
        // read as a (wrong) captcha code and reset it.
        assert_eq!(h.store.cards().len(), 1);
        assert_eq!(h.store.user(AccountId(1)).unwrap().state, None);
        assert!(d.locks.is_empty());
    }

    #[tokio::test]
    async fn handled_accounts_do_not_accumulate_locks() {
        let (d, _h) = dispatcher(Duration::ZERO);
        for account in 1..=5 {
            d.handle(msg(account, "/start")).await;
            d.handle(msg(account, "/cards")).await;
        }
        assert!(d.locks.is_empty());
    }
}
