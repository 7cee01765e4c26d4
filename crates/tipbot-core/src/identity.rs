//! Chat identity -> ledger key resolution.
//!
//! The contract keys balances by string. Every call site (sender, recipient,
//! balance query) must derive that string the same way, otherwise funds end up
//! under a key no command can address again.

use std::{collections::HashMap, sync::Arc, sync::OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::RwLock;

use crate::{
    domain::{ContractUserId, Platform, PlatformUser, FALLBACK_SEPARATOR},
    errors::Error,
    Result,
};

const MAX_USER_ID_LEN: usize = 64;

/// Reverse mapping: normalized display name -> platform-native id.
///
/// Swap in a shared key-value implementation when running several instances.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Last writer wins.
    async fn upsert(&self, name: &str, native_id: u64);
    async fn lookup(&self, name: &str) -> Option<u64>;
}

/// Process-local store; mappings are lost on restart.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    names: RwLock<HashMap<String, u64>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.names.read().await.len()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn upsert(&self, name: &str, native_id: u64) {
        self.names.write().await.insert(name.to_string(), native_id);
    }

    async fn lookup(&self, name: &str) -> Option<u64> {
        self.names.read().await.get(name).copied()
    }
}

/// Lowercase and strip one leading platform sigil (`@` on Telegram, `#` on Discord).
pub fn normalize_name(platform: Platform, raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    match lower.strip_prefix(platform.handle_sigil()) {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

/// Normalized username usable as a ledger key. Names carrying the fallback
/// separator are refused so they cannot shadow an id-derived key.
fn usable_name(platform: Platform, raw: &str) -> Option<String> {
    let name = normalize_name(platform, raw);
    (!name.is_empty() && !name.contains(FALLBACK_SEPARATOR)).then_some(name)
}

/// Pure derivation of the ledger key; does not touch any store.
pub fn contract_user_id(platform: Platform, native_id: u64, username: Option<&str>) -> ContractUserId {
    match username.and_then(|n| usable_name(platform, n)) {
        Some(name) => ContractUserId(name),
        None => ContractUserId(format!("{}{native_id}", platform.fallback_prefix())),
    }
}

/// Guard for user-id strings that did not come from a platform user object
/// (typed handles, dashboard input).
pub fn validate_user_id(raw: &str) -> Result<ContractUserId> {
    if raw.is_empty() || raw.chars().count() > MAX_USER_ID_LEN {
        return Err(Error::InvalidUserId(format!(
            "user id must be 1..={MAX_USER_ID_LEN} characters"
        )));
    }
    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidUserId(
            "user id must not contain whitespace".to_string(),
        ));
    }
    Ok(ContractUserId(raw.to_string()))
}

fn handle_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9_.]+$").expect("valid regex"))
}

pub struct IdentityResolver {
    platform: Platform,
    store: Arc<dyn IdentityStore>,
}

impl IdentityResolver {
    pub fn new(platform: Platform, store: Arc<dyn IdentityStore>) -> Self {
        Self { platform, store }
    }

    pub fn in_memory(platform: Platform) -> Self {
        Self::new(platform, Arc::new(InMemoryIdentityStore::new()))
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn normalize(&self, raw: &str) -> String {
        normalize_name(self.platform, raw)
    }

    /// Resolve a live platform user and remember its display name for later DMs.
    pub async fn resolve(&self, user: &PlatformUser) -> ContractUserId {
        debug_assert_eq!(user.platform, self.platform);
        match user.username.as_deref().and_then(|n| usable_name(self.platform, n)) {
            Some(name) => {
                self.store.upsert(&name, user.id).await;
                ContractUserId(name)
            }
            None => contract_user_id(self.platform, user.id, None),
        }
    }

    /// Rebuild a ledger key from a handle the user typed (e.g. `@alice`).
    ///
    /// Never updates the reverse mapping: there is no live user object to vouch for it.
    pub fn from_handle(&self, handle: &str) -> Result<ContractUserId> {
        let normalized = self.normalize(handle);
        let id = validate_user_id(&normalized)?;
        if !handle_re().is_match(id.as_str()) {
            return Err(Error::InvalidUserId(format!(
                "{handle:?} is not a valid {} username",
                self.platform
            )));
        }
        Ok(id)
    }

    pub async fn reverse_lookup(&self, display_name: &str) -> Option<u64> {
        let name = self.normalize(display_name);
        if name.is_empty() {
            return None;
        }
        self.store.lookup(&name).await
    }
}
