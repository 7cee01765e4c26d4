//! Fakes for the ports, shared by the service and router tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use alloy_primitives::U256;
use async_trait::async_trait;

use crate::{
    amount::parse_eth,
    domain::{Address, ContractUserId, ExplorerLinks, Platform, TxHash, TxOutcome, UserStats},
    errors::Error,
    gateway::ContractGateway,
    identity::IdentityResolver,
    messaging::{
        port::{Conversation, DirectMessenger},
        types::{MessagingCapabilities, OutgoingMessage, Visibility},
    },
    notify::NotificationDispatcher,
    pending::InMemoryPendingTips,
    service::{ServiceSettings, TipService},
    Result,
};

pub fn eth(s: &str) -> U256 {
    parse_eth(s).unwrap()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Tip(String, String, U256),
    Withdraw(String, Address, U256),
}

pub struct FakeGateway {
    balances: Mutex<HashMap<String, U256>>,
    writes: Mutex<Vec<Call>>,
    calls: AtomicUsize,
    confirm: AtomicBool,
    reject_for_funds: AtomicBool,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            confirm: AtomicBool::new(true),
            reject_for_funds: AtomicBool::new(false),
        }
    }
}

impl FakeGateway {
    pub fn set_balance(&self, user: &str, amount: U256) {
        self.balances.lock().unwrap().insert(user.to_string(), amount);
    }

    pub fn confirm_writes(&self, confirm: bool) {
        self.confirm.store(confirm, Ordering::SeqCst);
    }

    pub fn reject_writes_for_funds(&self) {
        self.reject_for_funds.store(true, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<Call> {
        self.writes.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn balance_of(&self, user: &ContractUserId) -> U256 {
        self.balances
            .lock()
            .unwrap()
            .get(user.as_str())
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn write(&self, call: Call) -> Result<TxOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_for_funds.load(Ordering::SeqCst) {
            return Err(Error::InsufficientFunds { balance: None });
        }
        self.writes.lock().unwrap().push(call);
        let tx_hash = TxHash::repeat_byte(0xab);
        Ok(if self.confirm.load(Ordering::SeqCst) {
            TxOutcome::Confirmed { tx_hash }
        } else {
            TxOutcome::Pending { tx_hash }
        })
    }
}

#[async_trait]
impl ContractGateway for FakeGateway {
    async fn get_balance(&self, user: &ContractUserId) -> Result<U256> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.balance_of(user))
    }

    async fn get_stats(&self, user: &ContractUserId) -> Result<UserStats> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(UserStats {
            balance: self.balance_of(user),
            total_sent: eth("0.02"),
            total_received: eth("0.5"),
        })
    }

    async fn tip(&self, from: &ContractUserId, to: &ContractUserId, amount: U256) -> Result<TxOutcome> {
        self.write(Call::Tip(from.to_string(), to.to_string(), amount))
    }

    async fn withdraw(
        &self,
        user: &ContractUserId,
        destination: Address,
        amount: U256,
    ) -> Result<TxOutcome> {
        self.write(Call::Withdraw(user.to_string(), destination, amount))
    }
}

#[derive(Default)]
pub struct FakeDirectMessenger {
    sent: Mutex<Vec<(u64, String)>>,
}

impl FakeDirectMessenger {
    pub fn sent(&self) -> Vec<(u64, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectMessenger for FakeDirectMessenger {
    async fn send_direct(&self, native_id: u64, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((native_id, text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeConversation {
    shown: Mutex<Vec<OutgoingMessage>>,
    acks: Mutex<Vec<Visibility>>,
    /// How many upcoming `show` calls fail, as if the platform dropped the event.
    failing_shows: AtomicUsize,
}

impl FakeConversation {
    pub fn failing(shows: usize) -> Self {
        Self {
            failing_shows: AtomicUsize::new(shows),
            ..Default::default()
        }
    }

    pub fn acks(&self) -> Vec<Visibility> {
        self.acks.lock().unwrap().clone()
    }

    pub fn shown(&self) -> Vec<OutgoingMessage> {
        self.shown.lock().unwrap().clone()
    }

    pub fn last_text(&self) -> String {
        self.shown
            .lock()
            .unwrap()
            .last()
            .map(|m| m.text.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Conversation for FakeConversation {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_inline_keyboards: true,
            max_message_len: 4096,
        }
    }

    async fn acknowledge(&self, expected: Visibility) -> Result<()> {
        self.acks.lock().unwrap().push(expected);
        Ok(())
    }

    async fn show(&self, message: OutgoingMessage) -> Result<()> {
        let fail = self
            .failing_shows
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(Error::External("unknown interaction".to_string()));
        }
        self.shown.lock().unwrap().push(message);
        Ok(())
    }
}

pub struct Harness {
    pub service: Arc<TipService>,
    pub gateway: Arc<FakeGateway>,
    pub pending: Arc<InMemoryPendingTips>,
    pub dm: Arc<FakeDirectMessenger>,
}

pub fn harness(platform: Platform) -> Harness {
    let identity = Arc::new(IdentityResolver::in_memory(platform));
    let gateway = Arc::new(FakeGateway::default());
    let pending = Arc::new(InMemoryPendingTips::new(Duration::from_secs(600)));
    let dm = Arc::new(FakeDirectMessenger::default());
    let notifier = NotificationDispatcher::new(identity.clone(), dm.clone());
    let settings = ServiceSettings {
        contract_address: Address::repeat_byte(0x42),
        dashboard_url: Some("https://tips.example".to_string()),
        explorer: ExplorerLinks::new("https://basescan.org"),
        quick_amounts: vec![eth("0.0005"), eth("0.0015"), eth("0.005")],
    };
    let service = Arc::new(TipService::new(
        identity,
        gateway.clone(),
        pending.clone(),
        notifier,
        settings,
    ));
    Harness {
        service,
        gateway,
        pending,
        dm,
    }
}
