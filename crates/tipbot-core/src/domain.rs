use std::fmt;

use alloy_primitives::U256;

pub use alloy_primitives::{Address, TxHash};

pub const FALLBACK_SEPARATOR: char = ':';

/// Chat platform a user or event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Platform {
    Telegram,
    Discord,
}

impl Platform {
    pub fn name(self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
            Platform::Discord => "discord",
        }
    }

    /// Prefix for contract user ids of users without a display name.
    ///
    /// Ends in [`FALLBACK_SEPARATOR`], which neither platform allows in usernames,
    /// so a chosen name can never equal another user's fallback key.
    pub fn fallback_prefix(self) -> &'static str {
        match self {
            Platform::Telegram => "tg:",
            Platform::Discord => "dc:",
        }
    }

    /// Leading character users type (or legacy names carry) before a handle.
    pub fn handle_sigil(self) -> char {
        match self {
            Platform::Telegram => '@',
            Platform::Discord => '#',
        }
    }

    /// Whether a typed handle names a bot account.
    ///
    /// Telegram requires every bot username to end in "bot"; Discord mentions always
    /// arrive with a full user object, so the flag on that object is authoritative.
    pub fn is_bot_handle(self, normalized: &str) -> bool {
        match self {
            Platform::Telegram => normalized.ends_with("bot"),
            Platform::Discord => false,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A live user object delivered by a chat platform event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformUser {
    pub platform: Platform,
    /// Platform-native numeric account id.
    pub id: u64,
    pub username: Option<String>,
    pub is_bot: bool,
}

impl PlatformUser {
    pub fn new(platform: Platform, id: u64, username: Option<String>) -> Self {
        Self {
            platform,
            id,
            username,
            is_bot: false,
        }
    }

    pub fn bot(mut self, is_bot: bool) -> Self {
        self.is_bot = is_bot;
        self
    }

    /// Name shown in chat messages.
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{}{}", self.platform.fallback_prefix(), self.id))
    }
}

/// The string key the ledger contract stores balances under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractUserId(pub String);

impl ContractUserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a proposed-but-unconfirmed tip.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PendingKey(pub String);

impl PendingKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserStats {
    pub balance: U256,
    pub total_sent: U256,
    pub total_received: U256,
}

/// Result of a submitted transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed { tx_hash: TxHash },
    /// The confirmation wait timed out; the transaction may still land.
    Pending { tx_hash: TxHash },
}

impl TxOutcome {
    pub fn tx_hash(&self) -> TxHash {
        match self {
            TxOutcome::Confirmed { tx_hash } | TxOutcome::Pending { tx_hash } => *tx_hash,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, TxOutcome::Confirmed { .. })
    }
}

/// Builds `https://<explorer host>/tx/<hash>` links.
#[derive(Clone, Debug)]
pub struct ExplorerLinks {
    base: String,
}

impl ExplorerLinks {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn tx(&self, tx_hash: TxHash) -> String {
        format!("{}/tx/{tx_hash:#x}", self.base)
    }
}
