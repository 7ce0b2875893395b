//! SQLite persistence for users, cards and form sessions.

mod rows;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    ConnectOptions, SqlitePool,
};
use tracing::info;

use tcb_core::{
    domain::{AccountId, CardId, CardNumber, ConversationState, FormId, UserId},
    errors::{Error, StoreError},
    model::{Card, Challenge, FormSession, User},
    ports::{Store, StoreResult},
    Result,
};

use crate::rows::{CardRow, FormRow, UserRow};

static MIGRATOR: Migrator = sqlx::migrate!();

const USER_COLUMNS: &str =
    "id, account_id, state, current_card_id, current_form_id, created_at, updated_at";
const CARD_COLUMNS: &str = "id, user_id, number, created_at, updated_at";
const FORM_COLUMNS: &str = "id, card_id, view_state, event_validation, captcha_url, created_at";

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::Config(format!("invalid DATABASE_URL: {e}")))?
            .create_if_missing(true);
        Self::connect_with(options, SqlitePoolOptions::new().max_connections(5)).await
    }

    pub async fn connect_with(
        options: SqliteConnectOptions,
        pool: SqlitePoolOptions,
    ) -> Result<Self> {
        let options = options.foreign_keys(true).disable_statement_logging();
        let pool = pool
            .connect_with(options)
            .await
            .map_err(|e| Error::External(format!("cannot open database: {e}")))?;
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| Error::External(format!("cannot apply migrations: {e}")))?;
        info!("database ready");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn update_user(&self, sql: &str, user: UserId, value: Option<i64>) -> StoreResult<()> {
        let result = sqlx::query(sql)
            .bind(value)
            .bind(Utc::now())
            .bind(user.0)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn store_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Duplicate,
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn number_param(number: CardNumber) -> i64 {
    // CardNumber::MAX fits comfortably in i64.
    number.get() as i64
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_user(&self, account: AccountId) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (account_id, created_at) VALUES (?, ?) RETURNING {USER_COLUMNS}"
        ))
        .bind(account.0)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;
        row.try_into()
    }

    async fn get_user(&self, account: AccountId) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE account_id = ?"
        ))
        .bind(account.0)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;
        row.try_into()
    }

    async fn set_state(&self, user: UserId, state: Option<ConversationState>) -> StoreResult<()> {
        self.update_user(
            "UPDATE users SET state = ?, updated_at = ? WHERE id = ?",
            user,
            state.map(ConversationState::code),
        )
        .await
    }

    async fn set_current_card(&self, user: UserId, card: Option<CardId>) -> StoreResult<()> {
        self.update_user(
            "UPDATE users SET current_card_id = ?, updated_at = ? WHERE id = ?",
            user,
            card.map(|c| c.0),
        )
        .await
    }

    async fn set_current_form(&self, user: UserId, form: Option<FormId>) -> StoreResult<()> {
        self.update_user(
            "UPDATE users SET current_form_id = ?, updated_at = ? WHERE id = ?",
            user,
            form.map(|f| f.0),
        )
        .await
    }

    async fn insert_card(&self, user: UserId, number: CardNumber) -> StoreResult<Card> {
        let row = sqlx::query_as::<_, CardRow>(&format!(
            "INSERT INTO cards (user_id, number, created_at) VALUES (?, ?, ?) RETURNING {CARD_COLUMNS}"
        ))
        .bind(user.0)
        .bind(number_param(number))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;
        row.try_into()
    }

    async fn get_card(&self, user: UserId, card: CardId) -> StoreResult<Card> {
        let row = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE id = ? AND user_id = ?"
        ))
        .bind(card.0)
        .bind(user.0)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;
        row.try_into()
    }

    async fn get_card_by_number(&self, user: UserId, number: CardNumber) -> StoreResult<Card> {
        let row = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE number = ? AND user_id = ?"
        ))
        .bind(number_param(number))
        .bind(user.0)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;
        row.try_into()
    }

    async fn list_cards(&self, user: UserId) -> StoreResult<Vec<Card>> {
        let rows = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE user_id = ? ORDER BY id"
        ))
        .bind(user.0)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        rows.into_iter().map(Card::try_from).collect()
    }

    async fn delete_card(&self, user: UserId, card: CardId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM cards WHERE id = ? AND user_id = ?")
            .bind(card.0)
            .bind(user.0)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        if result.rows_affected() > 0 {
            info!(user = user.0, card = card.0, "card deleted");
        }
        Ok(())
    }

    async fn insert_form(&self, card: CardId, challenge: Challenge) -> StoreResult<FormSession> {
        let row = sqlx::query_as::<_, FormRow>(&format!(
            "INSERT INTO forms (card_id, view_state, event_validation, captcha_url, created_at)
             VALUES (?, ?, ?, ?, ?) RETURNING {FORM_COLUMNS}"
        ))
        .bind(card.0)
        .bind(challenge.view_state)
        .bind(challenge.event_validation)
        .bind(challenge.captcha_url)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(row.into())
    }

    async fn get_form(&self, card: CardId, form: FormId) -> StoreResult<FormSession> {
        let row = sqlx::query_as::<_, FormRow>(&format!(
            "SELECT {FORM_COLUMNS} FROM forms WHERE id = ? AND card_id = ?"
        ))
        .bind(form.0)
        .bind(card.0)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        SqliteStore::connect_with(options, pool).await.unwrap()
    }

    fn challenge(n: u32) -> Challenge {
        Challenge {
            view_state: format!("vs{n}"),
            event_validation: format!("ev{n}"),
            captcha_url: format!("http://form.test/captcha.aspx?{n}"),
        }
    }

    fn number(n: u64) -> CardNumber {
        CardNumber::new(n).unwrap()
    }

    #[tokio::test]
    async fn users_are_unique_per_account() {
        let s = store().await;
        let u = s.insert_user(AccountId(100)).await.unwrap();
        assert_eq!(u.account_id, AccountId(100));
        assert_eq!(u.state, None);
        assert_eq!(u.updated_at, None);

        assert_eq!(
            s.insert_user(AccountId(100)).await.unwrap_err(),
            StoreError::Duplicate
        );
        assert_eq!(
            s.get_user(AccountId(7)).await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn state_and_pointers_persist() {
        let s = store().await;
        let u = s.insert_user(AccountId(1)).await.unwrap();
        let card = s.insert_card(u.id, number(1234567890)).await.unwrap();
        let form = s.insert_form(card.id, challenge(1)).await.unwrap();

        s.set_current_card(u.id, Some(card.id)).await.unwrap();
        s.set_current_form(u.id, Some(form.id)).await.unwrap();
        s.set_state(u.id, Some(ConversationState::AwaitingCaptchaCode))
            .await
            .unwrap();

        let u = s.get_user(AccountId(1)).await.unwrap();
        assert_eq!(u.state, Some(ConversationState::AwaitingCaptchaCode));
        assert_eq!(u.current_card, Some(card.id));
        assert_eq!(u.current_form, Some(form.id));
        assert!(u.updated_at.is_some());

        s.set_state(u.id, None).await.unwrap();
        assert_eq!(s.get_user(AccountId(1)).await.unwrap().state, None);

        assert_eq!(
            s.set_state(UserId(999), None).await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn card_numbers_are_unique_per_user_only() {
        let s = store().await;
        let a = s.insert_user(AccountId(1)).await.unwrap();
        let b = s.insert_user(AccountId(2)).await.unwrap();

        let first = s.insert_card(a.id, number(42)).await.unwrap();
        assert_eq!(
            s.insert_card(a.id, number(42)).await.unwrap_err(),
            StoreError::Duplicate
        );
        s.insert_card(b.id, number(42)).await.unwrap();

        let again = s.upsert_card(a.id, number(42)).await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(s.list_cards(a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cards_are_scoped_to_their_owner() {
        let s = store().await;
        let a = s.insert_user(AccountId(1)).await.unwrap();
        let b = s.insert_user(AccountId(2)).await.unwrap();
        let card = s.insert_card(a.id, number(9_999_999_999)).await.unwrap();

        assert_eq!(s.get_card(a.id, card.id).await.unwrap().number, number(9_999_999_999));
        assert_eq!(
            s.get_card(b.id, card.id).await.unwrap_err(),
            StoreError::NotFound
        );

        s.delete_card(b.id, card.id).await.unwrap();
        assert!(s.get_card(a.id, card.id).await.is_ok());

        s.delete_card(a.id, card.id).await.unwrap();
        assert_eq!(
            s.get_card(a.id, card.id).await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn list_is_ordered_by_insertion() {
        let s = store().await;
        let u = s.insert_user(AccountId(1)).await.unwrap();
        assert!(s.list_cards(u.id).await.unwrap().is_empty());
        for n in [30, 10, 20] {
            s.insert_card(u.id, number(n)).await.unwrap();
        }
        let numbers: Vec<u64> = s
            .list_cards(u.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.number.get())
            .collect();
        assert_eq!(numbers, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn forms_are_bound_to_their_card() {
        let s = store().await;
        let u = s.insert_user(AccountId(1)).await.unwrap();
        let c1 = s.insert_card(u.id, number(1)).await.unwrap();
        let c2 = s.insert_card(u.id, number(2)).await.unwrap();
        let f = s.insert_form(c1.id, challenge(5)).await.unwrap();

        let got = s.get_form(c1.id, f.id).await.unwrap();
        assert_eq!(got.challenge, challenge(5));
        assert_eq!(
            s.get_form(c2.id, f.id).await.unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn deleting_a_card_drops_its_forms_and_clears_pointers() {
        let s = store().await;
        let u = s.insert_user(AccountId(1)).await.unwrap();
        let card = s.insert_card(u.id, number(1)).await.unwrap();
        let form = s.insert_form(card.id, challenge(1)).await.unwrap();
        s.set_current_card(u.id, Some(card.id)).await.unwrap();
        s.set_current_form(u.id, Some(form.id)).await.unwrap();

        s.delete_card(u.id, card.id).await.unwrap();

        let u = s.get_user(AccountId(1)).await.unwrap();
        assert_eq!(u.current_card, None);
        assert_eq!(u.current_form, None);
        assert_eq!(
            s.get_form(card.id, form.id).await.unwrap_err(),
            StoreError::NotFound
        );
    }
}
