//! Best-effort recipient notification after a confirmed tip.

use std::sync::Arc;

use alloy_primitives::U256;
use tokio::task::JoinHandle;

use crate::{
    domain::ContractUserId, formatting::recipient_notice_text, identity::IdentityResolver,
    messaging::port::DirectMessenger,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TipNotice {
    pub sender_name: String,
    pub recipient_name: String,
    pub recipient_id: ContractUserId,
    /// Native id when the recipient was a live user object; skips the reverse lookup.
    pub recipient_native: Option<u64>,
    pub net_amount: U256,
    pub tx_link: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    RecipientUnknown,
    Failed,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    identity: Arc<IdentityResolver>,
    messenger: Arc<dyn DirectMessenger>,
}

impl NotificationDispatcher {
    pub fn new(identity: Arc<IdentityResolver>, messenger: Arc<dyn DirectMessenger>) -> Self {
        Self {
            identity,
            messenger,
        }
    }

    /// Queue delivery as an independent task. The handle is only useful for tests;
    /// dropping it does not cancel the task.
    pub fn dispatch(&self, notice: TipNotice) -> JoinHandle<Delivery> {
        let this = self.clone();
        tokio::spawn(async move { this.deliver(notice).await })
    }

    pub async fn deliver(&self, notice: TipNotice) -> Delivery {
        let native_id = match notice.recipient_native {
            Some(id) => Some(id),
            None => self.identity.reverse_lookup(&notice.recipient_name).await,
        };
        let Some(native_id) = native_id else {
            tracing::info!(
                recipient = %notice.recipient_id,
                "recipient never seen by the bot; skipping notification"
            );
            return Delivery::RecipientUnknown;
        };

        let text = recipient_notice_text(
            &notice.sender_name,
            notice.net_amount,
            &notice.recipient_id,
            &notice.tx_link,
        );
        match self.messenger.send_direct(native_id, &text).await {
            Ok(()) => {
                tracing::debug!(recipient = %notice.recipient_id, "tip notification sent");
                Delivery::Sent
            }
            Err(e) => {
                tracing::warn!(
                    recipient = %notice.recipient_id,
                    error = %e,
                    "could not notify tip recipient"
                );
                Delivery::Failed
            }
        }
    }
}
