/// Replies used when an error reaches the user.
pub mod replies {
    pub const DATABASE_DOWN: &str = "Sorry, my database seems to be down. Come later!";
    pub const SERVICE_DOWN: &str =
        "Sorry, seems like balance checker service is down. Nothing to deal with it. Come later!";
    pub const NOT_REGISTERED: &str =
        "Hm. Seems like I cannot find record about you. Try again by clicking /start!";
    pub const CARD_NOT_FOUND: &str =
        "Hm. Seems like I cannot find record about you. Please, try again.";
    pub const BAD_ARGUMENTS: &str = "Incorrect command arguments.";
    pub const ENTER_NUMBER: &str = "Enter number please.";
    pub const ENTER_CODE: &str = "Enter valid code.";
    pub const INCORRECT_CODE: &str = "Captcha code is incorrect! Please, start operation again.";
    pub const INTERNAL: &str =
        "Sorry, internal bot error happened. Please, try again or come later.";
}

/// Core error type.
///
/// Every user-facing variant carries a human reply that is distinct from the
/// diagnostic text rendered by `Display`. The dispatcher sends the former and
/// logs the latter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad user input.
    #[error("validation: {detail}")]
    Validation { human: &'static str, detail: String },

    /// No such user/card/form row.
    #[error("not found: {detail}")]
    NotFound { human: &'static str, detail: String },

    /// Database or balance site unreachable or misbehaving.
    #[error("service unavailable: {detail}")]
    Transient { human: &'static str, detail: String },

    #[error("incorrect captcha code: {0}")]
    IncorrectCode(String),

    /// Persisted state points at something that is not there.
    #[error("invalid state: {0}")]
    InvariantViolation(String),

    #[error("config error: {0}")]
    Config(String),

    /// Adapter failure with nothing useful to tell the user (e.g. the reply itself failed).
    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(human: &'static str, detail: impl Into<String>) -> Self {
        Self::Validation {
            human,
            detail: detail.into(),
        }
    }

    pub fn not_found(human: &'static str, detail: impl Into<String>) -> Self {
        Self::NotFound {
            human,
            detail: detail.into(),
        }
    }

    pub fn transient(human: &'static str, detail: impl Into<String>) -> Self {
        Self::Transient {
            human,
            detail: detail.into(),
        }
    }

    /// Text for the user, if this error should be reported to them at all.
    pub fn human(&self) -> Option<&str> {
        match self {
            Self::Validation { human, .. }
            | Self::NotFound { human, .. }
            | Self::Transient { human, .. } => Some(*human),
            Self::IncorrectCode(_) => Some(replies::INCORRECT_CODE),
            Self::InvariantViolation(_) => Some(replies::INTERNAL),
            Self::Config(_) | Self::External(_) => None,
        }
    }

    /// Whether this is a genuine failure (as opposed to expected bad input).
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Validation { .. } | Self::IncorrectCode(_))
    }
}

/// Closed error kinds reported by the persistence gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no rows")]
    NotFound,

    #[error("duplicate key")]
    Duplicate,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Closed error kinds reported by the balance form client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("form: incorrect code")]
    IncorrectCode,

    #[error("form scrape failed: {0}")]
    Scrape(String),
}
