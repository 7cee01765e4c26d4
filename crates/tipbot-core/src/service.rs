//! Tip workflow, implemented once for every platform.
//!
//! Each operation is split into a `prepare`/`confirm` step that performs all
//! local validation (and the balance pre-check) and an `execute` step that makes
//! the single mutating ledger call. The router shows its "processing" state in
//! between. The pre-check is a UX shortcut only: concurrent commands can both
//! pass it, and the ledger's own rejection is what actually protects funds.

use std::sync::Arc;

use alloy_primitives::U256;
use tokio::task::JoinHandle;

use crate::{
    amount::split_fee,
    domain::{Address, ContractUserId, ExplorerLinks, PendingKey, Platform, PlatformUser, TxOutcome, UserStats},
    errors::Error,
    gateway::{parse_address, ContractGateway},
    identity::IdentityResolver,
    notify::{Delivery, NotificationDispatcher, TipNotice},
    pending::{PendingTip, PendingTipStore},
    Result,
};

/// Who a tip is addressed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// A user object delivered by the platform (mention, reply target).
    Live(PlatformUser),
    /// A handle typed as text, e.g. `@bob`.
    Handle(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmountChoice {
    Preset(U256),
    Custom,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositInfo {
    pub contract: Address,
    pub user_id: ContractUserId,
    pub dashboard_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TipProposal {
    pub key: PendingKey,
    pub recipient_name: String,
    /// `None` when the balance could not be read; the proposal still stands.
    pub balance: Option<U256>,
    pub amounts: Vec<U256>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedTip {
    pub sender_id: ContractUserId,
    pub recipient_id: ContractUserId,
    pub sender_name: String,
    pub recipient_name: String,
    pub recipient_native: Option<u64>,
    pub amount: U256,
    /// Pending tip this transfer settles; claimed right before submission.
    pub claim: Option<PendingKey>,
}

#[derive(Debug)]
pub enum Confirmation {
    /// The initiator asked for a custom amount; the pending tip stays in place.
    Custom { recipient_name: String },
    Ready(PreparedTip),
}

#[derive(Debug)]
pub struct TipReceipt {
    pub tip: PreparedTip,
    pub outcome: TxOutcome,
    pub tx_link: String,
    /// Set only for confirmed transfers.
    pub notification: Option<JoinHandle<Delivery>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedWithdrawal {
    pub user_id: ContractUserId,
    pub destination: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawReceipt {
    pub withdrawal: PreparedWithdrawal,
    pub outcome: TxOutcome,
    pub tx_link: String,
}

#[derive(Clone, Debug)]
pub struct ServiceSettings {
    pub contract_address: Address,
    pub dashboard_url: Option<String>,
    pub explorer: ExplorerLinks,
    pub quick_amounts: Vec<U256>,
}

pub struct TipService {
    identity: Arc<IdentityResolver>,
    gateway: Arc<dyn ContractGateway>,
    pending: Arc<dyn PendingTipStore>,
    notifier: NotificationDispatcher,
    settings: ServiceSettings,
}

impl TipService {
    pub fn new(
        identity: Arc<IdentityResolver>,
        gateway: Arc<dyn ContractGateway>,
        pending: Arc<dyn PendingTipStore>,
        notifier: NotificationDispatcher,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            identity,
            gateway,
            pending,
            notifier,
            settings,
        }
    }

    pub fn platform(&self) -> Platform {
        self.identity.platform()
    }

    pub async fn resolve_identity(&self, user: &PlatformUser) -> ContractUserId {
        self.identity.resolve(user).await
    }

    pub async fn read_balance(&self, user: &PlatformUser) -> Result<U256> {
        let id = self.resolve_identity(user).await;
        self.gateway.get_balance(&id).await
    }

    pub async fn read_stats(&self, user: &PlatformUser) -> Result<UserStats> {
        let id = self.resolve_identity(user).await;
        self.gateway.get_stats(&id).await
    }

    pub async fn deposit_info(&self, user: &PlatformUser) -> DepositInfo {
        DepositInfo {
            contract: self.settings.contract_address,
            user_id: self.resolve_identity(user).await,
            dashboard_url: self.settings.dashboard_url.clone(),
        }
    }

    /// Create a pending tip and report the choices to offer the sender.
    pub async fn propose_tip(&self, sender: &PlatformUser, recipient: &Recipient) -> Result<TipProposal> {
        let sender_id = self.resolve_identity(sender).await;
        let target = self.check_recipient(sender, &sender_id, recipient).await?;

        let balance = match self.gateway.get_balance(&sender_id).await {
            Ok(b) => Some(b),
            Err(e) => {
                tracing::warn!(user = %sender_id, error = %e, "balance unavailable for tip proposal");
                None
            }
        };

        let key = self
            .pending
            .create(PendingTip {
                initiator: sender.id,
                sender_id,
                recipient_id: target.id,
                sender_name: sender.display_name(),
                recipient_name: target.name.clone(),
                recipient_native: target.native,
            })
            .await;
        tracing::debug!(key = %key, "pending tip created");

        Ok(TipProposal {
            key,
            recipient_name: target.name,
            balance,
            amounts: self.settings.quick_amounts.clone(),
        })
    }

    /// Validate a tip with an explicit amount.
    pub async fn direct_tip(
        &self,
        sender: &PlatformUser,
        recipient: &Recipient,
        amount: U256,
    ) -> Result<PreparedTip> {
        let sender_id = self.resolve_identity(sender).await;
        let target = self.check_recipient(sender, &sender_id, recipient).await?;
        ensure_positive(amount)?;
        self.ensure_funds(&sender_id, amount).await?;

        Ok(PreparedTip {
            sender_id,
            recipient_id: target.id,
            sender_name: sender.display_name(),
            recipient_name: target.name,
            recipient_native: target.native,
            amount,
            claim: None,
        })
    }

    /// Handle a quick-amount selection on a pending tip.
    ///
    /// Nothing is consumed here: the entry is claimed by [`TipService::execute_tip`],
    /// so a refused press (wrong user, failed pre-check) or a reply that never
    /// reached the user leaves it usable.
    pub async fn confirm_tip(
        &self,
        presser: &PlatformUser,
        key: &PendingKey,
        choice: AmountChoice,
    ) -> Result<Confirmation> {
        let pending = self.pending.get(key).await.ok_or(Error::ExpiredTip)?;
        if pending.initiator != presser.id {
            return Err(Error::UnauthorizedConfirm);
        }

        let amount = match choice {
            AmountChoice::Custom => {
                return Ok(Confirmation::Custom {
                    recipient_name: pending.recipient_name,
                })
            }
            AmountChoice::Preset(amount) => amount,
        };
        if !self.settings.quick_amounts.contains(&amount) {
            return Err(Error::InvalidAmount(
                "not one of the offered amounts".to_string(),
            ));
        }

        self.ensure_funds(&pending.sender_id, amount).await?;

        Ok(Confirmation::Ready(PreparedTip {
            sender_id: pending.sender_id,
            recipient_id: pending.recipient_id,
            sender_name: pending.sender_name,
            recipient_name: pending.recipient_name,
            recipient_native: pending.recipient_native,
            amount,
            claim: Some(key.clone()),
        }))
    }

    /// Submit the transfer; on confirmation queue the recipient notification.
    ///
    /// A tip confirmed from a pending entry first consumes that entry; when two
    /// presses race, only one of them gets past this point.
    pub async fn execute_tip(&self, tip: PreparedTip) -> Result<TipReceipt> {
        if let Some(key) = &tip.claim {
            self.pending.consume(key).await.ok_or(Error::ExpiredTip)?;
        }
        let outcome = self
            .gateway
            .tip(&tip.sender_id, &tip.recipient_id, tip.amount)
            .await?;
        let tx_link = self.settings.explorer.tx(outcome.tx_hash());
        tracing::info!(
            platform = %self.platform(),
            from = %tip.sender_id,
            to = %tip.recipient_id,
            tx_hash = %outcome.tx_hash(),
            confirmed = outcome.is_confirmed(),
            "tip submitted"
        );

        let notification = outcome.is_confirmed().then(|| {
            let (_, net_amount) = split_fee(tip.amount);
            self.notifier.dispatch(TipNotice {
                sender_name: tip.sender_name.clone(),
                recipient_name: tip.recipient_name.clone(),
                recipient_id: tip.recipient_id.clone(),
                recipient_native: tip.recipient_native,
                net_amount,
                tx_link: tx_link.clone(),
            })
        });

        Ok(TipReceipt {
            tip,
            outcome,
            tx_link,
            notification,
        })
    }

    pub async fn prepare_withdraw(
        &self,
        user: &PlatformUser,
        destination: &str,
        amount: U256,
    ) -> Result<PreparedWithdrawal> {
        let destination = parse_address(destination)?;
        ensure_positive(amount)?;
        let user_id = self.resolve_identity(user).await;
        self.ensure_funds(&user_id, amount).await?;
        Ok(PreparedWithdrawal {
            user_id,
            destination,
            amount,
        })
    }

    pub async fn execute_withdraw(&self, withdrawal: PreparedWithdrawal) -> Result<WithdrawReceipt> {
        let outcome = self
            .gateway
            .withdraw(&withdrawal.user_id, withdrawal.destination, withdrawal.amount)
            .await?;
        tracing::info!(
            platform = %self.platform(),
            user = %withdrawal.user_id,
            tx_hash = %outcome.tx_hash(),
            confirmed = outcome.is_confirmed(),
            "withdrawal submitted"
        );
        Ok(WithdrawReceipt {
            tx_link: self.settings.explorer.tx(outcome.tx_hash()),
            withdrawal,
            outcome,
        })
    }

    async fn check_recipient(
        &self,
        sender: &PlatformUser,
        sender_id: &ContractUserId,
        recipient: &Recipient,
    ) -> Result<ResolvedRecipient> {
        let target = match recipient {
            Recipient::Live(user) => {
                if user.is_bot {
                    return Err(Error::BotRecipient);
                }
                if user.id == sender.id {
                    return Err(Error::SelfTip);
                }
                ResolvedRecipient {
                    id: self.identity.resolve(user).await,
                    name: user.display_name(),
                    native: Some(user.id),
                }
            }
            Recipient::Handle(handle) => {
                let id = self.identity.from_handle(handle)?;
                if self.platform().is_bot_handle(id.as_str()) {
                    return Err(Error::BotRecipient);
                }
                ResolvedRecipient {
                    name: id.to_string(),
                    id,
                    native: None,
                }
            }
        };
        if &target.id == sender_id {
            return Err(Error::SelfTip);
        }
        Ok(target)
    }

    async fn ensure_funds(&self, user: &ContractUserId, amount: U256) -> Result<()> {
        let balance = self.gateway.get_balance(user).await?;
        if balance < amount {
            return Err(Error::InsufficientFunds {
                balance: Some(balance),
            });
        }
        Ok(())
    }
}

struct ResolvedRecipient {
    id: ContractUserId,
    name: String,
    native: Option<u64>,
}

fn ensure_positive(amount: U256) -> Result<()> {
    if amount.is_zero() {
        return Err(Error::InvalidAmount("amount must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        amount::parse_eth,
        test_support::{eth, harness, Call},
    };

    fn tg(id: u64, name: &str) -> PlatformUser {
        PlatformUser::new(Platform::Telegram, id, Some(name.to_string()))
    }

    #[tokio::test]
    async fn quick_amount_scenario_tips_once_then_expires() {
        let h = harness(Platform::Telegram);
        h.gateway.set_balance("alice", eth("0.01"));
        let alice = tg(1, "alice");

        let proposal = h
            .service
            .propose_tip(&alice, &Recipient::Handle("@bob".into()))
            .await
            .unwrap();
        assert_eq!(proposal.balance, Some(eth("0.01")));
        assert_eq!(h.pending.len().await, 1);

        let preset = AmountChoice::Preset(eth("0.005"));
        let Confirmation::Ready(prepared) = h
            .service
            .confirm_tip(&alice, &proposal.key, preset)
            .await
            .unwrap()
        else {
            panic!("expected a ready tip");
        };
        h.service.execute_tip(prepared).await.unwrap();

        assert_eq!(
            h.gateway.writes(),
            vec![Call::Tip(
                "alice".into(),
                "bob".into(),
                U256::from(5_000_000_000_000_000u64)
            )]
        );
        assert_eq!(h.pending.len().await, 0);

        let again = h.service.confirm_tip(&alice, &proposal.key, preset).await;
        assert!(matches!(again, Err(Error::ExpiredTip)));
        assert_eq!(h.gateway.writes().len(), 1);
    }

    #[tokio::test]
    async fn self_and_bot_tips_make_no_remote_calls() {
        let h = harness(Platform::Telegram);
        let alice = tg(1, "alice");

        let to_self = h
            .service
            .direct_tip(&alice, &Recipient::Live(tg(1, "alice")), eth("0.001"))
            .await;
        assert!(matches!(to_self, Err(Error::SelfTip)));

        let by_handle = h
            .service
            .propose_tip(&alice, &Recipient::Handle("@Alice".into()))
            .await;
        assert!(matches!(by_handle, Err(Error::SelfTip)));

        let bot_user = tg(9, "helper").bot(true);
        let to_bot = h
            .service
            .direct_tip(&alice, &Recipient::Live(bot_user), eth("0.001"))
            .await;
        assert!(matches!(to_bot, Err(Error::BotRecipient)));

        let bot_handle = h
            .service
            .propose_tip(&alice, &Recipient::Handle("@price_bot".into()))
            .await;
        assert!(matches!(bot_handle, Err(Error::BotRecipient)));

        assert_eq!(h.gateway.total_calls(), 0);
        assert_eq!(h.pending.len().await, 0);
    }

    #[tokio::test]
    async fn insufficient_precheck_never_submits() {
        let h = harness(Platform::Discord);
        h.gateway.set_balance("alice", eth("0.001"));
        let alice = PlatformUser::new(Platform::Discord, 1, Some("alice".into()));
        let bob = PlatformUser::new(Platform::Discord, 2, Some("bob".into()));

        let res = h
            .service
            .direct_tip(&alice, &Recipient::Live(bob), eth("0.002"))
            .await;
        assert!(matches!(
            res,
            Err(Error::InsufficientFunds { balance: Some(b) }) if b == eth("0.001")
        ));

        let res = h
            .service
            .prepare_withdraw(&alice, "0x52908400098527886E0F7030069857D2E4169EE7", eth("1"))
            .await;
        assert!(matches!(res, Err(Error::InsufficientFunds { .. })));
        assert!(h.gateway.writes().is_empty());
    }

    #[tokio::test]
    async fn invalid_address_fails_before_any_remote_call() {
        let h = harness(Platform::Telegram);
        let res = h
            .service
            .prepare_withdraw(&tg(1, "alice"), "not-an-address", eth("0.01"))
            .await;
        assert!(matches!(res, Err(Error::InvalidAddress(_))));
        assert_eq!(h.gateway.total_calls(), 0);
    }

    #[tokio::test]
    async fn only_the_initiator_may_confirm_and_the_tip_survives() {
        let h = harness(Platform::Telegram);
        h.gateway.set_balance("alice", eth("1"));
        let alice = tg(1, "alice");
        let mallory = tg(3, "mallory");

        let p = h
            .service
            .propose_tip(&alice, &Recipient::Handle("bob".into()))
            .await
            .unwrap();
        let res = h
            .service
            .confirm_tip(&mallory, &p.key, AmountChoice::Preset(eth("0.0005")))
            .await;
        assert!(matches!(res, Err(Error::UnauthorizedConfirm)));
        assert_eq!(h.pending.len().await, 1);

        let custom = h
            .service
            .confirm_tip(&alice, &p.key, AmountChoice::Custom)
            .await
            .unwrap();
        assert!(matches!(custom, Confirmation::Custom { ref recipient_name } if recipient_name == "bob"));
        assert_eq!(h.pending.len().await, 1);
    }

    #[tokio::test]
    async fn failed_precheck_keeps_pending_tip_for_a_smaller_preset() {
        let h = harness(Platform::Telegram);
        h.gateway.set_balance("alice", eth("0.001"));
        let alice = tg(1, "alice");
        let p = h
            .service
            .propose_tip(&alice, &Recipient::Handle("bob".into()))
            .await
            .unwrap();

        let big = h
            .service
            .confirm_tip(&alice, &p.key, AmountChoice::Preset(eth("0.005")))
            .await;
        assert!(matches!(big, Err(Error::InsufficientFunds { .. })));

        let small = h
            .service
            .confirm_tip(&alice, &p.key, AmountChoice::Preset(eth("0.0005")))
            .await
            .unwrap();
        assert!(matches!(small, Confirmation::Ready(_)));
    }

    #[tokio::test]
    async fn racing_confirmations_submit_once() {
        let h = harness(Platform::Telegram);
        h.gateway.set_balance("alice", eth("1"));
        let alice = tg(1, "alice");
        let p = h
            .service
            .propose_tip(&alice, &Recipient::Handle("bob".into()))
            .await
            .unwrap();

        let preset = AmountChoice::Preset(eth("0.0015"));
        let mut ready = Vec::new();
        for _ in 0..2 {
            match h.service.confirm_tip(&alice, &p.key, preset).await.unwrap() {
                Confirmation::Ready(tip) => ready.push(tip),
                other => panic!("unexpected {other:?}"),
            }
        }
        // Confirming alone claims nothing.
        assert_eq!(h.pending.len().await, 1);

        let second = ready.pop().unwrap();
        let first = ready.pop().unwrap();
        h.service.execute_tip(first).await.unwrap();
        let res = h.service.execute_tip(second).await;
        assert!(matches!(res, Err(Error::ExpiredTip)));
        assert_eq!(h.gateway.writes().len(), 1);
        assert_eq!(h.pending.len().await, 0);
    }

    #[tokio::test]
    async fn forged_preset_is_refused() {
        let h = harness(Platform::Telegram);
        h.gateway.set_balance("alice", eth("10"));
        let alice = tg(1, "alice");
        let p = h
            .service
            .propose_tip(&alice, &Recipient::Handle("bob".into()))
            .await
            .unwrap();
        let res = h
            .service
            .confirm_tip(&alice, &p.key, AmountChoice::Preset(eth("5")))
            .await;
        assert!(matches!(res, Err(Error::InvalidAmount(_))));
    }

    #[tokio::test]
    async fn tip_to_unseen_recipient_succeeds_without_dm() {
        let h = harness(Platform::Telegram);
        h.gateway.set_balance("alice", eth("1"));
        let prepared = h
            .service
            .direct_tip(&tg(1, "alice"), &Recipient::Handle("@carol".into()), eth("0.01"))
            .await
            .unwrap();
        let receipt = h.service.execute_tip(prepared).await.unwrap();

        assert!(receipt.outcome.is_confirmed());
        let delivery = receipt.notification.unwrap().await.unwrap();
        assert_eq!(delivery, Delivery::RecipientUnknown);
        assert!(h.dm.sent().is_empty());
    }

    #[tokio::test]
    async fn live_recipient_is_notified_with_net_amount() {
        let h = harness(Platform::Discord);
        h.gateway.set_balance("alice", eth("1"));
        let alice = PlatformUser::new(Platform::Discord, 1, Some("alice".into()));
        let bob = PlatformUser::new(Platform::Discord, 2, Some("Bob".into()));

        let prepared = h
            .service
            .direct_tip(&alice, &Recipient::Live(bob), eth("0.01"))
            .await
            .unwrap();
        assert_eq!(prepared.recipient_id.as_str(), "bob");
        let receipt = h.service.execute_tip(prepared).await.unwrap();
        assert_eq!(receipt.notification.unwrap().await.unwrap(), Delivery::Sent);

        let sent = h.dm.sent();
        assert_eq!(sent[0].0, 2);
        assert!(sent[0].1.contains("0.0099 ETH"));
    }

    #[tokio::test]
    async fn pending_outcome_skips_notification() {
        let h = harness(Platform::Discord);
        h.gateway.set_balance("alice", eth("1"));
        h.gateway.confirm_writes(false);
        let prepared = h
            .service
            .direct_tip(
                &PlatformUser::new(Platform::Discord, 1, Some("alice".into())),
                &Recipient::Handle("bob".into()),
                eth("0.01"),
            )
            .await
            .unwrap();
        let receipt = h.service.execute_tip(prepared).await.unwrap();
        assert!(!receipt.outcome.is_confirmed());
        assert!(receipt.notification.is_none());
    }

    #[tokio::test]
    async fn remote_rejection_surfaces_even_after_precheck_passed() {
        let h = harness(Platform::Telegram);
        h.gateway.set_balance("alice", eth("1"));
        h.gateway.reject_writes_for_funds();
        let prepared = h
            .service
            .direct_tip(&tg(1, "alice"), &Recipient::Handle("bob".into()), eth("0.5"))
            .await
            .unwrap();
        let res = h.service.execute_tip(prepared).await;
        assert!(matches!(res, Err(Error::InsufficientFunds { balance: None })));
    }

    #[tokio::test]
    async fn zero_amount_is_invalid() {
        let h = harness(Platform::Telegram);
        let res = h
            .service
            .direct_tip(&tg(1, "alice"), &Recipient::Handle("bob".into()), parse_eth("0").unwrap())
            .await;
        assert!(matches!(res, Err(Error::InvalidAmount(_))));
        assert_eq!(h.gateway.total_calls(), 0);
    }
}
