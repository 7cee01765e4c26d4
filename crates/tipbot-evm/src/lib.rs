//! `ContractGateway` over JSON-RPC.
//!
//! One service-held key signs every transaction; user funds live in the
//! contract under string ids.

mod abi;

use std::{future::Future, time::Duration};

use alloy::{
    network::{Ethereum, EthereumWallet, ReceiptResponse},
    primitives::{Address, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder},
    rpc::types::TransactionReceipt,
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;
use tipbot_core::{
    config::SecretString,
    domain::{ContractUserId, TxHash, TxOutcome, UserStats},
    gateway::ContractGateway,
    Error, Result,
};

pub use abi::TipBot;

/// Contract client bound to one deployment.
pub struct EvmGateway {
    contract: TipBot::TipBotInstance<DynProvider>,
    confirm_timeout: Duration,
    rpc_timeout: Duration,
}

/// Run one RPC round trip, failing with `on_timeout` once `limit` passes.
async fn bounded<T>(
    limit: Duration,
    op: &'static str,
    on_timeout: fn(String) -> Error,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(res) => res,
        Err(_) => {
            tracing::warn!(op, timeout_secs = limit.as_secs(), "rpc call timed out");
            Err(on_timeout(format!("{op}: no response within {}s", limit.as_secs())))
        }
    }
}

impl EvmGateway {
    pub async fn connect(
        rpc_url: &str,
        contract_address: Address,
        private_key: &SecretString,
        confirm_timeout: Duration,
        rpc_timeout: Duration,
    ) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .expose()
            .trim()
            .parse()
            .map_err(|_| Error::Config("PRIVATE_KEY is not a valid secp256k1 key".to_string()))?;
        let service_address = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(rpc_url)
            .await
            .map_err(|e| Error::Config(format!("cannot connect to RPC {rpc_url}: {e}")))?
            .erased();

        let chain_id = bounded(rpc_timeout, "eth_chainId", Error::RemoteRead, async {
            provider
                .get_chain_id()
                .await
                .map_err(|e| Error::RemoteRead(e.to_string()))
        })
        .await?;
        tracing::info!(
            chain_id,
            contract = %contract_address,
            signer = %service_address,
            "connected to ledger contract"
        );

        Ok(Self {
            contract: TipBot::new(contract_address, provider),
            confirm_timeout,
            rpc_timeout,
        })
    }

    /// Wait (bounded) for the receipt of a submitted transaction.
    async fn await_receipt(
        &self,
        op: &'static str,
        pending: PendingTransactionBuilder<Ethereum>,
    ) -> Result<TxOutcome> {
        let tx_hash: TxHash = *pending.tx_hash();
        tracing::debug!(op, tx_hash = %tx_hash, "transaction submitted");

        match tokio::time::timeout(self.confirm_timeout, pending.get_receipt()).await {
            Err(_) => {
                tracing::warn!(
                    op,
                    tx_hash = %tx_hash,
                    timeout_secs = self.confirm_timeout.as_secs(),
                    "confirmation wait timed out"
                );
                Ok(TxOutcome::Pending { tx_hash })
            }
            Ok(Err(e)) => Err(Error::RemoteWrite(format!("{op}: {e}"))),
            Ok(Ok(receipt)) if !receipt.status() => Err(Error::RemoteWrite(format!(
                "{op}: transaction {tx_hash:#x} reverted"
            ))),
            Ok(Ok(receipt)) => {
                log_tip_events(&receipt);
                Ok(TxOutcome::Confirmed { tx_hash })
            }
        }
    }
}

#[async_trait]
impl ContractGateway for EvmGateway {
    async fn get_balance(&self, user: &ContractUserId) -> Result<U256> {
        let call = self.contract.getBalance(user.to_string());
        bounded(self.rpc_timeout, "getBalance", Error::RemoteRead, async {
            call.call()
                .await
                .map_err(|e| Error::RemoteRead(format!("getBalance: {e}")))
        })
        .await
    }

    async fn get_stats(&self, user: &ContractUserId) -> Result<UserStats> {
        let call = self.contract.getStats(user.to_string());
        let stats = bounded(self.rpc_timeout, "getStats", Error::RemoteRead, async {
            call.call()
                .await
                .map_err(|e| Error::RemoteRead(format!("getStats: {e}")))
        })
        .await?;
        Ok(UserStats {
            balance: stats.balance,
            total_sent: stats.totalSent,
            total_received: stats.totalReceived,
        })
    }

    async fn tip(&self, from: &ContractUserId, to: &ContractUserId, amount: U256) -> Result<TxOutcome> {
        let call = self.contract.tip(from.to_string(), to.to_string(), amount);
        let pending = bounded(self.rpc_timeout, "tip", Error::RemoteWrite, async {
            call.send().await.map_err(|e| map_submit_error("tip", e))
        })
        .await?;
        self.await_receipt("tip", pending).await
    }

    async fn withdraw(
        &self,
        user: &ContractUserId,
        destination: Address,
        amount: U256,
    ) -> Result<TxOutcome> {
        let call = self.contract.withdraw(user.to_string(), destination, amount);
        let pending = bounded(self.rpc_timeout, "withdraw", Error::RemoteWrite, async {
            call.send().await.map_err(|e| map_submit_error("withdraw", e))
        })
        .await?;
        self.await_receipt("withdraw", pending).await
    }
}

/// Submission failures. Gas estimation runs the call first, so a ledger-side
/// balance check surfaces here as a revert message.
fn map_submit_error(op: &'static str, err: alloy::contract::Error) -> Error {
    classify_submit_error(op, &err.to_string())
}

fn classify_submit_error(op: &'static str, message: &str) -> Error {
    if message.to_lowercase().contains("insufficient balance") {
        return Error::InsufficientFunds { balance: None };
    }
    Error::RemoteWrite(format!("{op}: {message}"))
}

fn log_tip_events(receipt: &TransactionReceipt) {
    for log in receipt.inner.logs() {
        if let Ok(ev) = log.log_decode::<TipBot::Tip>() {
            let data = ev.inner.data;
            tracing::debug!(
                from = %data.fromId,
                to = %data.toId,
                amount = %data.amount,
                fee = %data.fee,
                "ledger emitted Tip"
            );
        }
    }
}
