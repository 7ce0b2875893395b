use std::fmt;

/// Telegram account id (numeric). Stable key of the person talking to the bot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccountId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Row id of a registered user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Row id of a saved card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CardId(pub i64);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row id of a stored form session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FormId(pub i64);

/// Number printed on a transport card. Always positive and at most ten digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CardNumber(u64);

impl CardNumber {
    pub const MAX: u64 = 9_999_999_999;

    /// Parse user input. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let n = s.parse::<u64>().ok()?;
        Self::new(n)
    }

    pub fn new(n: u64) -> Option<Self> {
        (1..=Self::MAX).contains(&n).then_some(Self(n))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Zero-padded form expected by the balance page.
    pub fn padded(self) -> String {
        format!("{:010}", self.0)
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Digits read off a captcha image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptchaCode(u16);

impl CaptchaCode {
    pub const MAX: u16 = 9999;

    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        if s.is_empty() || s.len() > 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse::<u16>().ok().filter(|n| *n <= Self::MAX).map(Self)
    }

    pub fn padded(self) -> String {
        format!("{:04}", self.0)
    }
}

/// Which free-text reply the bot is waiting for. Absent state means idle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversationState {
    AwaitingCardNumber,
    AwaitingCaptchaCode,
}

impl ConversationState {
    /// Persisted integer representation.
    pub fn code(self) -> i64 {
        match self {
            Self::AwaitingCardNumber => 0,
            Self::AwaitingCaptchaCode => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::AwaitingCardNumber),
            1 => Some(Self::AwaitingCaptchaCode),
            _ => None,
        }
    }
}
