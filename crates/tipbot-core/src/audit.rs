//! Append-only audit trail of money-moving actions and refusals.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use alloy_primitives::U256;
use chrono::Utc;
use serde::Serialize;

use crate::{
    amount::format_eth,
    domain::{Address, ContractUserId, Platform, TxOutcome},
    errors::Error,
    Result,
};

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: &'static str,
    pub platform: &'static str,
    pub user_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Decimal ETH string; never a float.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_eth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
}

impl AuditEvent {
    fn base(event: &'static str, platform: Platform, user: &ContractUserId) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event,
            platform: platform.name(),
            user_id: user.to_string(),
            recipient: None,
            destination: None,
            amount_eth: None,
            tx_hash: None,
            confirmed: None,
            error: None,
            context: None,
            retry_after: None,
        }
    }

    pub fn tip(
        platform: Platform,
        from: &ContractUserId,
        to: &ContractUserId,
        amount: U256,
        outcome: &TxOutcome,
    ) -> Self {
        Self {
            recipient: Some(to.to_string()),
            amount_eth: Some(format_eth(amount)),
            tx_hash: Some(format!("{:#x}", outcome.tx_hash())),
            confirmed: Some(outcome.is_confirmed()),
            ..Self::base("tip", platform, from)
        }
    }

    pub fn withdraw(
        platform: Platform,
        user: &ContractUserId,
        destination: Address,
        amount: U256,
        outcome: &TxOutcome,
    ) -> Self {
        Self {
            destination: Some(destination.to_checksum(None)),
            amount_eth: Some(format_eth(amount)),
            tx_hash: Some(format!("{:#x}", outcome.tx_hash())),
            confirmed: Some(outcome.is_confirmed()),
            ..Self::base("withdraw", platform, user)
        }
    }

    pub fn error(platform: Platform, user: &ContractUserId, error: &str, context: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            context: Some(context.to_string()),
            ..Self::base("error", platform, user)
        }
    }

    pub fn rate_limit(platform: Platform, user: &ContractUserId, retry_after: f64) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::base("rate_limit", platform, user)
        }
    }
}

/// File-backed audit sink, JSON lines or a readable block format.
#[derive(Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
    write_lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        if let Some(s) = &event.error {
            event.error = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let rendered = if self.json {
            let mut line = serde_json::to_string(&event)?;
            line.push('\n');
            line
        } else {
            render_plain(&event)?
        };

        // Keep concurrent events from interleaving within one record.
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::External("audit log lock poisoned".to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(rendered.as_bytes())?;
        Ok(())
    }

    /// Write and log on failure; auditing never fails the user's action.
    pub fn record(&self, event: AuditEvent) {
        let kind = event.event;
        if let Err(e) = self.write(event) {
            tracing::warn!(event = kind, error = %e, path = %self.path.display(), "audit write failed");
        }
    }
}

fn render_plain(event: &AuditEvent) -> Result<String> {
    let value = serde_json::to_value(event)?;
    let Some(obj) = value.as_object() else {
        return Err(Error::External(
            "audit event is not a JSON object".to_string(),
        ));
    };

    let mut out = String::new();
    out.push('\n');
    out.push_str(&"=".repeat(60));
    for (k, v) in obj {
        out.push('\n');
        out.push_str(k);
        out.push_str(": ");
        match v {
            serde_json::Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
    }
    out.push('\n');
    Ok(out)
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}
