//! Port to the ledger contract.

use std::{str::FromStr, sync::Arc, time::Duration};

use alloy_primitives::U256;
use async_trait::async_trait;

use crate::{
    domain::{Address, ContractUserId, TxOutcome, UserStats},
    errors::Error,
    Result,
};

/// The four remote operations of the ledger contract.
///
/// Mutating calls submit exactly once and wait (bounded) for confirmation.
#[async_trait]
pub trait ContractGateway: Send + Sync {
    async fn get_balance(&self, user: &ContractUserId) -> Result<U256>;
    async fn get_stats(&self, user: &ContractUserId) -> Result<UserStats>;
    async fn tip(
        &self,
        from: &ContractUserId,
        to: &ContractUserId,
        amount: U256,
    ) -> Result<TxOutcome>;
    async fn withdraw(
        &self,
        user: &ContractUserId,
        destination: Address,
        amount: U256,
    ) -> Result<TxOutcome>;
}

/// Parse a withdrawal destination.
///
/// Requires `0x` + 40 hex digits; mixed-case input must carry a valid EIP-55
/// checksum. The zero address is refused since the ledger would burn the funds.
pub fn parse_address(raw: &str) -> Result<Address> {
    let s = raw.trim();
    let invalid = || Error::InvalidAddress(raw.to_string());

    let hex = s.strip_prefix("0x").ok_or_else(invalid)?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let mixed_case = hex.bytes().any(|b| b.is_ascii_lowercase())
        && hex.bytes().any(|b| b.is_ascii_uppercase());
    let address = if mixed_case {
        Address::parse_checksummed(s, None).map_err(|_| invalid())?
    } else {
        Address::from_str(s).map_err(|_| invalid())?
    };

    if address.is_zero() {
        return Err(invalid());
    }
    Ok(address)
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_backoff: Duration::from_millis(250),
        }
    }
}

/// Gateway decorator that retries read-only calls on `RemoteRead`.
///
/// Writes are forwarded exactly once: retrying a submission could move funds twice.
pub struct RetryingGateway {
    inner: Arc<dyn ContractGateway>,
    policy: RetryPolicy,
}

impl RetryingGateway {
    pub fn new(inner: Arc<dyn ContractGateway>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn read<T, F, Fut>(&self, op_name: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T>> + Send,
        T: Send,
    {
        let attempts = self.policy.attempts.max(1);
        let mut backoff = self.policy.base_backoff;
        let mut attempt = 1;
        loop {
            match op().await {
                Err(Error::RemoteRead(msg)) if attempt < attempts => {
                    tracing::warn!(op = op_name, attempt, error = %msg, "retrying ledger read");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl ContractGateway for RetryingGateway {
    async fn get_balance(&self, user: &ContractUserId) -> Result<U256> {
        self.read("get_balance", || self.inner.get_balance(user))
            .await
    }

    async fn get_stats(&self, user: &ContractUserId) -> Result<UserStats> {
        self.read("get_stats", || self.inner.get_stats(user)).await
    }

    async fn tip(
        &self,
        from: &ContractUserId,
        to: &ContractUserId,
        amount: U256,
    ) -> Result<TxOutcome> {
        self.inner.tip(from, to, amount).await
    }

    async fn withdraw(
        &self,
        user: &ContractUserId,
        destination: Address,
        amount: U256,
    ) -> Result<TxOutcome> {
        self.inner.withdraw(user, destination, amount).await
    }
}
