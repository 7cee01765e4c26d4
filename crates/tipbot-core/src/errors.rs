use std::time::Duration;

use alloy_primitives::U256;

use crate::amount::format_eth;

/// Core error type for the tip bot.
///
/// Adapter crates map their specific errors into this type so the router can
/// turn every failure into a short user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Chat platform failures (send/edit/answer).
    #[error("external error: {0}")]
    External(String),

    #[error("remote read failed: {0}")]
    RemoteRead(String),

    #[error("remote write failed: {0}")]
    RemoteWrite(String),

    /// `balance` is `None` when the ledger itself rejected the transfer.
    #[error("insufficient funds")]
    InsufficientFunds { balance: Option<U256> },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("pending tip expired or already used")]
    ExpiredTip,

    #[error("cannot tip yourself")]
    SelfTip,

    #[error("cannot tip a bot")]
    BotRecipient,

    #[error("only the tip initiator can confirm it")]
    UnauthorizedConfirm,

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short message suitable for showing to the chat user.
    pub fn user_message(&self) -> String {
        match self {
            Error::RemoteRead(_) => "❌ Could not reach the tip ledger. Please try again.".into(),
            Error::RemoteWrite(_) => {
                "❌ The transaction failed and no funds were moved. Please try again.".into()
            }
            Error::InsufficientFunds {
                balance: Some(balance),
            } => format!(
                "❌ Insufficient balance. You have {} ETH.",
                format_eth(*balance)
            ),
            Error::InsufficientFunds { balance: None } => {
                "❌ Insufficient balance. The ledger rejected the transfer.".into()
            }
            Error::InvalidAddress(_) => "❌ Invalid Ethereum address.".into(),
            Error::InvalidAmount(_) => {
                "❌ Invalid amount. Please use a positive number with at most 18 decimals.".into()
            }
            Error::ExpiredTip => "❌ Tip expired. Please use `/tip` again.".into(),
            Error::SelfTip => "❌ You cannot tip yourself!".into(),
            Error::BotRecipient => "❌ You cannot tip bots!".into(),
            Error::UnauthorizedConfirm => {
                "❌ Only the person who initiated the tip can complete it.".into()
            }
            Error::InvalidUserId(_) => "❌ That username is not valid.".into(),
            Error::RateLimited { retry_after } => format!(
                "⏳ Slow down! Try again in {}s.",
                retry_after.as_secs().max(1)
            ),
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::External(_) => {
                "❌ An error occurred. Please try again later.".into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_funds_mentions_local_balance() {
        let err = Error::InsufficientFunds {
            balance: Some(U256::from(5_000_000_000_000_000u64)),
        };
        assert!(err.user_message().contains("0.005 ETH"));
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let err = Error::External("telegram error: token=abc".to_string());
        assert!(!err.user_message().contains("abc"));
    }
}
