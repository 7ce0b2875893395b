//! Raw table rows and their conversion into domain models.

use chrono::{DateTime, Utc};

use tcb_core::{
    domain::{AccountId, CardId, CardNumber, ConversationState, FormId, UserId},
    errors::StoreError,
    model::{Card, Challenge, FormSession, User},
};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: i64,
    pub account_id: i64,
    pub state: Option<i64>,
    pub current_card_id: Option<i64>,
    pub current_form_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let state = match r.state {
            None => None,
            Some(code) => Some(ConversationState::from_code(code).ok_or_else(|| {
                StoreError::Unavailable(format!("user {} has unknown state {code}", r.id))
            })?),
        };
        Ok(User {
            id: UserId(r.id),
            account_id: AccountId(r.account_id),
            state,
            current_card: r.current_card_id.map(CardId),
            current_form: r.current_form_id.map(FormId),
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CardRow {
    pub id: i64,
    pub user_id: i64,
    pub number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<CardRow> for Card {
    type Error = StoreError;

    fn try_from(r: CardRow) -> Result<Self, Self::Error> {
        let number = u64::try_from(r.number)
            .ok()
            .and_then(CardNumber::new)
            .ok_or_else(|| {
                StoreError::Unavailable(format!("card {} has invalid number {}", r.id, r.number))
            })?;
        Ok(Card {
            id: CardId(r.id),
            user_id: UserId(r.user_id),
            number,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FormRow {
    pub id: i64,
    pub card_id: i64,
    pub view_state: String,
    pub event_validation: String,
    pub captcha_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<FormRow> for FormSession {
    fn from(r: FormRow) -> Self {
        FormSession {
            id: FormId(r.id),
            card_id: CardId(r.card_id),
            challenge: Challenge {
                view_state: r.view_state,
                event_validation: r.event_validation,
                captcha_url: r.captcha_url,
            },
            created_at: r.created_at,
        }
    }
}
