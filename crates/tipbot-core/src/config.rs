use std::{env, fmt, path::PathBuf, time::Duration};

use alloy_primitives::U256;

use crate::{
    amount::parse_positive_eth,
    domain::Address,
    errors::Error,
    gateway::{parse_address, RetryPolicy},
    Result,
};

pub const DEFAULT_RPC_URL: &str = "https://mainnet.base.org";
pub const DEFAULT_EXPLORER_URL: &str = "https://basescan.org";
pub const DEFAULT_QUICK_TIP_AMOUNTS: &str = "0.0005,0.0015,0.005";

/// A string that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(<redacted>)")
    }
}

/// Typed runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    // Front-ends (at least one)
    pub telegram_bot_token: Option<SecretString>,
    pub discord_bot_token: Option<SecretString>,

    // Ledger
    pub contract_address: Address,
    pub private_key: SecretString,
    pub rpc_url: String,
    pub explorer_url: String,
    pub dashboard_url: Option<String>,
    pub tx_confirm_timeout: Duration,
    /// Bound on a single RPC round trip (reads, transaction submission).
    pub rpc_timeout: Duration,
    pub read_retry: RetryPolicy,

    // Tip flow
    pub pending_tip_ttl: Duration,
    pub pending_tip_sweep: Duration,
    pub quick_tip_amounts: Vec<U256>,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,

    // Audit
    pub audit_log_path: Option<PathBuf>,
    pub audit_log_json: bool,

    pub notify_min_interval: Duration,
}

impl Config {
    /// Read `.env` (without overriding the real environment), then the environment.
    pub fn load() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(Error::Config(format!("failed to read .env: {e}")));
            }
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);

        let telegram_bot_token = env.non_empty("TELEGRAM_BOT_TOKEN").map(SecretString);
        let discord_bot_token = env.non_empty("DISCORD_BOT_TOKEN").map(SecretString);
        if telegram_bot_token.is_none() && discord_bot_token.is_none() {
            return Err(Error::Config(
                "set TELEGRAM_BOT_TOKEN and/or DISCORD_BOT_TOKEN".to_string(),
            ));
        }

        let contract_address = parse_address(&env.required("CONTRACT_ADDRESS")?)
            .map_err(|_| Error::Config("CONTRACT_ADDRESS is not a valid address".to_string()))?;
        let private_key = SecretString(env.required("PRIVATE_KEY")?);

        let rpc_url = env
            .non_empty("RPC_URL")
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let explorer_url = env
            .non_empty("EXPLORER_URL")
            .unwrap_or_else(|| DEFAULT_EXPLORER_URL.to_string());
        let dashboard_url = env.non_empty("DASHBOARD_URL");

        let tx_confirm_timeout = Duration::from_secs(env.parse("TX_CONFIRM_TIMEOUT_SECS", 120)?);
        let rpc_timeout = Duration::from_secs(env.parse("RPC_TIMEOUT_SECS", 30u64)?.max(1));
        let read_retry = RetryPolicy {
            attempts: env.parse("READ_RETRY_ATTEMPTS", 3u32)?.max(1),
            base_backoff: Duration::from_millis(env.parse("READ_RETRY_BACKOFF_MS", 250)?),
        };

        let pending_tip_ttl = Duration::from_secs(env.parse("PENDING_TIP_TTL_SECS", 600)?);
        let pending_tip_sweep =
            Duration::from_secs(env.parse("PENDING_TIP_SWEEP_SECS", 60u64)?.max(1));
        let quick_tip_amounts = parse_amount_list(
            &env.non_empty("QUICK_TIP_AMOUNTS")
                .unwrap_or_else(|| DEFAULT_QUICK_TIP_AMOUNTS.to_string()),
        )?;

        let rate_limit_enabled = env.flag("RATE_LIMIT_ENABLED", true);
        let rate_limit_requests = env.parse("RATE_LIMIT_REQUESTS", 10)?;
        let rate_limit_window = Duration::from_secs(env.parse("RATE_LIMIT_WINDOW", 60)?);

        let audit_log_path = env.non_empty("AUDIT_LOG_PATH").map(PathBuf::from);
        let audit_log_json = env.flag("AUDIT_LOG_JSON", false);

        let notify_min_interval =
            Duration::from_millis(env.parse("NOTIFY_MIN_INTERVAL_MS", 1050)?);

        Ok(Self {
            telegram_bot_token,
            discord_bot_token,
            contract_address,
            private_key,
            rpc_url,
            explorer_url,
            dashboard_url,
            tx_confirm_timeout,
            rpc_timeout,
            read_retry,
            pending_tip_ttl,
            pending_tip_sweep,
            quick_tip_amounts,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
            audit_log_path,
            audit_log_json,
            notify_min_interval,
        })
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn non_empty(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.non_empty(key)
            .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.non_empty(key) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| Error::Config(format!("{key} has an invalid value: {v:?}"))),
        }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.non_empty(key)
            .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(default)
    }
}

fn parse_amount_list(raw: &str) -> Result<Vec<U256>> {
    let amounts = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            parse_positive_eth(s)
                .map_err(|_| Error::Config(format!("QUICK_TIP_AMOUNTS has an invalid amount: {s:?}")))
        })
        .collect::<Result<Vec<_>>>()?;
    if amounts.is_empty() {
        return Err(Error::Config("QUICK_TIP_AMOUNTS must not be empty".to_string()));
    }
    Ok(amounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn cfg(pairs: &[(&str, &str)]) -> Result<Config> {
        let mut map: HashMap<String, String> = HashMap::from([
            ("TELEGRAM_BOT_TOKEN".to_string(), "123:abc".to_string()),
            (
                "CONTRACT_ADDRESS".to_string(),
                "0x52908400098527886E0F7030069857D2E4169EE7".to_string(),
            ),
            ("PRIVATE_KEY".to_string(), KEY.to_string()),
        ]);
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let c = cfg(&[]).unwrap();
        assert_eq!(c.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(c.explorer_url, DEFAULT_EXPLORER_URL);
        assert_eq!(c.tx_confirm_timeout, Duration::from_secs(120));
        assert_eq!(c.rpc_timeout, Duration::from_secs(30));
        assert_eq!(c.pending_tip_ttl, Duration::from_secs(600));
        assert_eq!(c.quick_tip_amounts.len(), 3);
        assert_eq!(
            c.quick_tip_amounts[0],
            U256::from(500_000_000_000_000u64)
        );
        assert!(c.rate_limit_enabled);
        assert!(c.discord_bot_token.is_none());
        assert!(c.audit_log_path.is_none());
    }

    #[test]
    fn needs_at_least_one_front_end() {
        let err = Config::from_lookup(|k| match k {
            "CONTRACT_ADDRESS" => Some("0x52908400098527886E0F7030069857D2E4169EE7".into()),
            "PRIVATE_KEY" => Some(KEY.into()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(cfg(&[("CONTRACT_ADDRESS", "nope")]).is_err());
        assert!(cfg(&[("TX_CONFIRM_TIMEOUT_SECS", "soon")]).is_err());
        assert!(cfg(&[("QUICK_TIP_AMOUNTS", "0.001,-1")]).is_err());
        assert!(cfg(&[("QUICK_TIP_AMOUNTS", " , ")]).is_err());
    }

    #[test]
    fn private_key_is_redacted_in_debug() {
        let c = cfg(&[]).unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains(KEY));
        assert!(!dbg.contains("123:abc"));
        assert_eq!(c.private_key.expose(), KEY);
    }
}
