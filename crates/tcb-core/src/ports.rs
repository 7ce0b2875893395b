use async_trait::async_trait;

use crate::{
    domain::{AccountId, CaptchaCode, CardId, CardNumber, ConversationState, FormId, UserId},
    errors::{FormError, StoreError},
    model::{Card, Challenge, FormSession, User},
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type FormResult<T> = std::result::Result<T, FormError>;

/// Persistence gateway for users, cards and form sessions.
///
/// Lookups that match nothing return `StoreError::NotFound`; inserts that hit a
/// unique constraint return `StoreError::Duplicate`. Everything else is
/// `StoreError::Unavailable`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, account: AccountId) -> StoreResult<User>;
    async fn get_user(&self, account: AccountId) -> StoreResult<User>;
    async fn set_state(&self, user: UserId, state: Option<ConversationState>) -> StoreResult<()>;
    async fn set_current_card(&self, user: UserId, card: Option<CardId>) -> StoreResult<()>;
    async fn set_current_form(&self, user: UserId, form: Option<FormId>) -> StoreResult<()>;

    async fn insert_card(&self, user: UserId, number: CardNumber) -> StoreResult<Card>;
    async fn get_card(&self, user: UserId, card: CardId) -> StoreResult<Card>;
    async fn get_card_by_number(&self, user: UserId, number: CardNumber) -> StoreResult<Card>;
    async fn list_cards(&self, user: UserId) -> StoreResult<Vec<Card>>;

    /// Delete a card owned by `user`. Matching nothing is not an error.
    async fn delete_card(&self, user: UserId, card: CardId) -> StoreResult<()>;

    async fn insert_form(&self, card: CardId, challenge: Challenge) -> StoreResult<FormSession>;
    async fn get_form(&self, card: CardId, form: FormId) -> StoreResult<FormSession>;

    /// Insert a card, or return the existing one when the user already saved this number.
    async fn upsert_card(&self, user: UserId, number: CardNumber) -> StoreResult<Card> {
        match self.insert_card(user, number).await {
            Err(StoreError::Duplicate) => self.get_card_by_number(user, number).await,
            other => other,
        }
    }
}

/// Client for the third-party balance page.
#[async_trait]
pub trait FormClient: Send + Sync {
    /// GET the page and pull out the postback tokens and captcha location.
    async fn fetch_challenge(&self) -> FormResult<Challenge>;

    /// Download the captcha image referenced by a challenge.
    async fn fetch_captcha(&self, captcha_url: &str) -> FormResult<Vec<u8>>;

    /// POST the card number and captcha code; returns the formatted balance report (HTML).
    async fn submit_code(
        &self,
        view_state: &str,
        event_validation: &str,
        number: CardNumber,
        code: CaptchaCode,
    ) -> FormResult<String>;
}
