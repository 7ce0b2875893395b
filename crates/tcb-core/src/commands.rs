use crate::{
    domain::CardId,
    errors::{replies, Error},
    Result,
};

pub const BALANCE_PREFIX: &str = "balance_";
pub const REMOVE_PREFIX: &str = "remove_";
pub const REMOVE_CONFIRM_PREFIX: &str = "rm_confirm_";

/// What an inbound text asks the bot to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    AddCard,
    Cards,
    Cancel,
    Balance(CardId),
    RemoveCard(CardId),
    ConfirmRemove(CardId),
    /// Anything else: routed to the conversation state machine.
    Text(String),
}

/// `(name, description)` pairs for the messenger's command menu.
pub const MENU: &[(&str, &str)] = &[
    ("start", "Register and show help"),
    ("addcard", "Save a transport card"),
    ("cards", "List saved cards"),
    ("cancel", "Cancel the current operation"),
];

impl Command {
    /// Classify an inbound text.
    ///
    /// Fails only for a recognized `balance_` / `remove_` / `rm_confirm_` prefix
    /// with a missing or non-numeric id.
    pub fn parse(text: &str) -> Result<Self> {
        let Some(name) = command_name(text) else {
            return Ok(Self::Text(text.to_string()));
        };

        let cmd = match name.as_str() {
            "start" => Self::Start,
            "addcard" => Self::AddCard,
            "cards" => Self::Cards,
            "cancel" => Self::Cancel,
            other => {
                if let Some(rest) = other.strip_prefix(REMOVE_CONFIRM_PREFIX) {
                    Self::ConfirmRemove(parse_id(rest)?)
                } else if let Some(rest) = other.strip_prefix(BALANCE_PREFIX) {
                    Self::Balance(parse_id(rest)?)
                } else if let Some(rest) = other.strip_prefix(REMOVE_PREFIX) {
                    Self::RemoveCard(parse_id(rest)?)
                } else {
                    Self::Text(text.to_string())
                }
            }
        };
        Ok(cmd)
    }
}

/// Telegram may send `/cmd@botname arg1 ...`; returns the lowercase `cmd`.
fn command_name(text: &str) -> Option<String> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or("");
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}

fn parse_id(raw: &str) -> Result<CardId> {
    if raw.is_empty() {
        return Err(Error::validation(
            replies::BAD_ARGUMENTS,
            "there is no card id",
        ));
    }
    raw.parse::<i64>().map(CardId).map_err(|e| {
        Error::validation(
            replies::BAD_ARGUMENTS,
            format!("cannot convert card id {raw:?} into int: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_commands() {
        assert_eq!(Command::parse("/start").unwrap(), Command::Start);
        assert_eq!(Command::parse("/addcard").unwrap(), Command::AddCard);
        assert_eq!(Command::parse("/cards@TransportBot").unwrap(), Command::Cards);
        assert_eq!(Command::parse("  /CANCEL ").unwrap(), Command::Cancel);
    }

    #[test]
    fn prefixed_commands_carry_ids() {
        assert_eq!(
            Command::parse("/balance_12").unwrap(),
            Command::Balance(CardId(12))
        );
        assert_eq!(
            Command::parse("/remove_3").unwrap(),
            Command::RemoveCard(CardId(3))
        );
        assert_eq!(
            Command::parse("/rm_confirm_3@bot").unwrap(),
            Command::ConfirmRemove(CardId(3))
        );
    }

    #[test]
    fn prefixed_commands_without_numeric_id_fail_validation() {
        for input in ["/balance_", "/remove_x", "/rm_confirm_1a"] {
            let err = Command::parse(input).unwrap_err();
            assert!(matches!(err, Error::Validation { .. }), "{input}");
            assert_eq!(err.human(), Some(replies::BAD_ARGUMENTS));
        }
    }

    #[test]
    fn everything_else_is_free_text() {
        assert_eq!(
            Command::parse("1234567890").unwrap(),
            Command::Text("1234567890".to_string())
        );
        assert_eq!(
            Command::parse("/help").unwrap(),
            Command::Text("/help".to_string())
        );
        assert_eq!(Command::parse("/").unwrap(), Command::Text("/".to_string()));
    }
}
