//! Conversation state machine.
//!
//! Every free-text message is interpreted against the user's persisted state:
//! - idle: ignored
//! - awaiting card number: save the card, start a balance check
//! - awaiting captcha code: submit the code, reply with the balance report
//!
//! The state row is the only source of truth; callers serialize messages per
//! account (see `locks::AccountLocks`).

use std::{sync::Arc, time::Duration};

use tracing::{debug, info};

use crate::{
    domain::{CaptchaCode, CardId, CardNumber, ChatId, ConversationState},
    errors::{replies, Error, FormError, StoreError},
    formatting::bold,
    messaging::{
        port::MessagingPort,
        types::{PhotoUpload, TextMessage},
    },
    model::{Card, User},
    ports::{FormClient, Store},
    Result,
};

pub const GREETING: &str =
    "Hello, this bot can show balance of your transport card. Click /addcard to save your card.";
pub const ENTER_CARD_NUMBER: &str = "Enter card number (usually laser engraved):";
pub const ENTER_CAPTCHA: &str = "Enter captcha:";
pub const CANCELED: &str = "Operation canceled.";
pub const CARD_DELETED: &str = "Card deleted.";
pub const CAPTCHA_FILE_NAME: &str = "captcha.jpg";

#[derive(Clone, Copy, Debug)]
pub struct ConversationSettings {
    /// Pause before uploading the captcha photo. Empirical workaround, see `Config`.
    pub captcha_send_delay: Duration,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            captcha_send_delay: Duration::from_secs(3),
        }
    }
}

pub struct Conversation {
    store: Arc<dyn Store>,
    form: Arc<dyn FormClient>,
    messenger: Arc<dyn MessagingPort>,
    settings: ConversationSettings,
}

impl Conversation {
    pub fn new(
        store: Arc<dyn Store>,
        form: Arc<dyn FormClient>,
        messenger: Arc<dyn MessagingPort>,
        settings: ConversationSettings,
    ) -> Self {
        Self {
            store,
            form,
            messenger,
            settings,
        }
    }

    pub fn messenger(&self) -> &Arc<dyn MessagingPort> {
        &self.messenger
    }

    /// `/start`: register the account (idempotent) and greet.
    pub async fn start(&self, msg: &TextMessage) -> Result<()> {
        match self.store.insert_user(msg.account_id).await {
            Ok(user) => info!(account = msg.account_id.0, user = user.id.0, "registered user"),
            Err(StoreError::Duplicate) => {
                debug!(account = msg.account_id.0, "user already registered")
            }
            Err(e) => return Err(db_error("cannot insert user", e)),
        }
        self.send_text(msg.chat_id, GREETING).await
    }

    /// `/addcard`: wait for a card number.
    pub async fn add_card(&self, msg: &TextMessage) -> Result<()> {
        let user = self.load_user(msg).await?;
        self.store
            .set_state(user.id, Some(ConversationState::AwaitingCardNumber))
            .await
            .map_err(|e| db_error("cannot update state", e))?;
        self.send_text(msg.chat_id, ENTER_CARD_NUMBER).await
    }

    /// `/cards`: list saved cards with their balance/remove shortcuts.
    pub async fn cards(&self, msg: &TextMessage) -> Result<()> {
        let user = self.load_user(msg).await?;
        let cards = match self.store.list_cards(user.id).await {
            Ok(cards) => cards,
            Err(StoreError::NotFound) => Vec::new(),
            Err(e) => return Err(db_error("cannot get cards", e)),
        };
        self.send_html(msg.chat_id, &render_cards(&cards)).await
    }

    /// `/balance_<id>`: start a balance check for an already saved card.
    pub async fn balance(&self, msg: &TextMessage, card_id: CardId) -> Result<()> {
        let user = self.load_user(msg).await?;
        let card = self
            .store
            .get_card(user.id, card_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => Error::not_found(
                    replies::CARD_NOT_FOUND,
                    format!("cannot find card {card_id} of user {}", user.id.0),
                ),
                other => db_error("cannot get card", other),
            })?;
        self.begin_check(msg.chat_id, &user, &card).await
    }

    /// `/remove_<id>`: ask for confirmation.
    pub async fn confirm_remove(&self, msg: &TextMessage, card_id: CardId) -> Result<()> {
        self.load_user(msg).await?;
        let text = format!("Please, confirm card deletion: /rm_confirm_{card_id}");
        self.send_text(msg.chat_id, &text).await
    }

    /// `/rm_confirm_<id>`: delete the card if it belongs to the caller.
    pub async fn remove(&self, msg: &TextMessage, card_id: CardId) -> Result<()> {
        let user = self.load_user(msg).await?;
        self.store
            .delete_card(user.id, card_id)
            .await
            .map_err(|e| db_error("cannot delete card", e))?;
        info!(user = user.id.0, card = card_id.0, "card delete requested");
        self.send_text(msg.chat_id, CARD_DELETED).await
    }

    /// `/cancel`: back to idle from any state.
    pub async fn cancel(&self, msg: &TextMessage) -> Result<()> {
        let user = self.load_user(msg).await?;
        self.store
            .set_state(user.id, None)
            .await
            .map_err(|e| db_error("cannot update state", e))?;
        self.send_text(msg.chat_id, CANCELED).await
    }

    /// Any non-command text.
    pub async fn text(&self, msg: &TextMessage, text: &str) -> Result<()> {
        let user = self.load_user(msg).await?;
        match user.state {
            None => {
                debug!(user = user.id.0, "ignoring text while idle");
                Ok(())
            }
            Some(ConversationState::AwaitingCardNumber) => {
                self.on_card_number(msg.chat_id, &user, text).await
            }
            Some(ConversationState::AwaitingCaptchaCode) => {
                self.on_captcha_code(msg.chat_id, &user, text).await
            }
        }
    }

    async fn on_card_number(&self, chat_id: ChatId, user: &User, text: &str) -> Result<()> {
        let number = CardNumber::parse(text).ok_or_else(|| {
            Error::validation(
                replies::ENTER_NUMBER,
                format!("cannot convert {text:?} into card number"),
            )
        })?;

        let card = self
            .store
            .upsert_card(user.id, number)
            .await
            .map_err(|e| db_error("cannot insert card", e))?;
        self.begin_check(chat_id, user, &card).await
    }

    /// Fetch a fresh challenge for `card`, remember it, and send the captcha.
    async fn begin_check(&self, chat_id: ChatId, user: &User, card: &Card) -> Result<()> {
        self.store
            .set_current_card(user.id, Some(card.id))
            .await
            .map_err(|e| db_error("cannot update current_card_id", e))?;

        let challenge = self
            .form
            .fetch_challenge()
            .await
            .map_err(|e| service_error("cannot get form", e))?;

        let session = self
            .store
            .insert_form(card.id, challenge)
            .await
            .map_err(|e| db_error("cannot insert form", e))?;

        self.store
            .set_current_form(user.id, Some(session.id))
            .await
            .map_err(|e| db_error("cannot update current_form_id", e))?;

        self.store
            .set_state(user.id, Some(ConversationState::AwaitingCaptchaCode))
            .await
            .map_err(|e| db_error("cannot update state", e))?;

        let image = self
            .form
            .fetch_captcha(&session.challenge.captcha_url)
            .await
            .map_err(|e| service_error("cannot download captcha", e))?;

        info!(
            user = user.id.0,
            card = card.id.0,
            form = session.id.0,
            "awaiting captcha code"
        );

        if !self.settings.captcha_send_delay.is_zero() {
            tokio::time::sleep(self.settings.captcha_send_delay).await;
        }

        self.messenger
            .send_photo(
                chat_id,
                PhotoUpload {
                    file_name: CAPTCHA_FILE_NAME.to_string(),
                    bytes: image,
                    caption: Some(ENTER_CAPTCHA.to_string()),
                },
            )
            .await?;
        Ok(())
    }

    async fn on_captcha_code(&self, chat_id: ChatId, user: &User, text: &str) -> Result<()> {
        // Leave the captcha state first so a failed round is never retried implicitly.
        self.store
            .set_state(user.id, None)
            .await
            .map_err(|e| db_error("cannot update state", e))?;

        let card_id = user.current_card.ok_or_else(|| {
            Error::InvariantViolation(format!("user {} awaits captcha without card", user.id.0))
        })?;
        let card = self
            .store
            .get_card(user.id, card_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => Error::InvariantViolation(format!(
                    "current card {card_id} of user {} is gone",
                    user.id.0
                )),
                other => db_error("cannot get card", other),
            })?;

        let form_id = user.current_form.ok_or_else(|| {
            Error::InvariantViolation(format!("user {} awaits captcha without form", user.id.0))
        })?;
        let session = self
            .store
            .get_form(card.id, form_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => Error::InvariantViolation(format!(
                    "current form {} of card {card_id} is gone",
                    form_id.0
                )),
                other => db_error("cannot get form", other),
            })?;

        let code = CaptchaCode::parse(text).ok_or_else(|| {
            Error::validation(
                replies::ENTER_CODE,
                format!("cannot convert {text:?} into captcha code"),
            )
        })?;

        let report = self
            .form
            .submit_code(
                &session.challenge.view_state,
                &session.challenge.event_validation,
                card.number,
                code,
            )
            .await
            .map_err(|e| match e {
                FormError::IncorrectCode => {
                    Error::IncorrectCode(format!("form {} rejected the code", form_id.0))
                }
                FormError::Scrape(_) => service_error("cannot get form result", e),
            })?;

        info!(user = user.id.0, card = card.id.0, "balance delivered");
        self.send_html(chat_id, &report).await
    }

    async fn load_user(&self, msg: &TextMessage) -> Result<User> {
        self.store
            .get_user(msg.account_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => Error::not_found(
                    replies::NOT_REGISTERED,
                    format!("account {} didn't click /start", msg.account_id.0),
                ),
                other => db_error("cannot get user", other),
            })
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.messenger.send_text(chat_id, text).await.map(|_| ())
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.messenger.send_html(chat_id, html).await.map(|_| ())
    }
}

fn render_cards(cards: &[Card]) -> String {
    let mut text = format!("{}\n", bold("Your cards:"));
    if cards.is_empty() {
        text.push_str("empty");
        return text;
    }
    for c in cards {
        text.push_str(&format!(
            "{}: /balance_{} /remove_{}\n",
            c.number, c.id, c.id
        ));
    }
    text
}

fn db_error(context: &str, e: StoreError) -> Error {
    Error::transient(replies::DATABASE_DOWN, format!("{context}: {e}"))
}

fn service_error(context: &str, e: FormError) -> Error {
    Error::transient(replies::SERVICE_DOWN, format!("{context}: {e}"))
}
