//! Persisted entities.

use chrono::{DateTime, Utc};

use crate::domain::{AccountId, CardId, CardNumber, ConversationState, FormId, UserId};

/// A person who pressed `/start`.
///
/// `current_card` / `current_form` are weak pointers used only to resume an
/// in-flight balance check; they never own the rows they reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub account_id: AccountId,
    pub state: Option<ConversationState>,
    pub current_card: Option<CardId>,
    pub current_form: Option<FormId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub user_id: UserId,
    pub number: CardNumber,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Postback tokens and captcha location scraped from the balance page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub view_state: String,
    pub event_validation: String,
    pub captcha_url: String,
}

/// A challenge bound to a card. Single use: consumed by one captcha round-trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormSession {
    pub id: FormId,
    pub card_id: CardId,
    pub challenge: Challenge,
    pub created_at: DateTime<Utc>,
}
