//! Platform-neutral command and button dispatch.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use alloy_primitives::U256;

use crate::{
    amount::{eth_from_f64, format_eth, parse_eth, parse_positive_eth},
    audit::{AuditEvent, AuditLogger},
    domain::{ContractUserId, PendingKey, Platform, PlatformUser},
    errors::Error,
    formatting,
    gateway::ContractGateway,
    identity::{contract_user_id, IdentityResolver},
    messaging::{
        port::{Conversation, DirectMessenger},
        throttled::{ThrottleConfig, ThrottledMessenger},
        types::{InlineButton, InlineKeyboard, OutgoingMessage, Visibility},
    },
    notify::NotificationDispatcher,
    pending::PendingTipStore,
    security::RateLimiter,
    service::{
        AmountChoice, Confirmation, PreparedTip, Recipient, ServiceSettings, TipProposal,
        TipService,
    },
    Result,
};

const BUTTON_PREFIX: &str = "tip:";
const CUSTOM_TOKEN: &str = "custom";

/// Amount as the platform delivered it.
#[derive(Clone, Debug, PartialEq)]
pub enum AmountArg {
    /// Typed text (Telegram).
    Text(String),
    /// Number option (Discord).
    Number(f64),
}

impl AmountArg {
    pub fn to_wei(&self) -> Result<U256> {
        match self {
            AmountArg::Text(s) => parse_positive_eth(s),
            AmountArg::Number(n) => eth_from_f64(*n),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Start,
    Help,
    Balance,
    Deposit,
    Stats,
    Tip {
        recipient: Recipient,
        amount: Option<AmountArg>,
    },
    Withdraw {
        address: String,
        amount: AmountArg,
    },
    /// A known command with missing or malformed arguments.
    Usage(&'static str),
}

#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    Command {
        user: PlatformUser,
        command: Command,
    },
    Button {
        user: PlatformUser,
        data: String,
    },
}

impl InboundEvent {
    pub fn user(&self) -> &PlatformUser {
        match self {
            InboundEvent::Command { user, .. } | InboundEvent::Button { user, .. } => user,
        }
    }
}

const TIP_USAGE: &str = "Usage: `/tip @username [amount]` or reply to a message with `/tip [amount]`";
const WITHDRAW_USAGE: &str = "Usage: `/withdraw <address> <amount>`";

/// Parse a text command such as `/tip@TipBot @bob 0.01`.
///
/// `reply_target` is the author of the message being replied to, if any.
/// Returns `None` for plain text and unknown commands.
pub fn parse_text_command(text: &str, reply_target: Option<&PlatformUser>) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    let args: Vec<&str> = parts.collect();

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "balance" => Command::Balance,
        "deposit" => Command::Deposit,
        "stats" => Command::Stats,
        "tip" => parse_tip_args(&args, reply_target),
        "withdraw" => match args.as_slice() {
            [address, amount] => Command::Withdraw {
                address: address.to_string(),
                amount: AmountArg::Text(amount.to_string()),
            },
            _ => Command::Usage(WITHDRAW_USAGE),
        },
        _ => return None,
    };
    Some(command)
}

fn parse_tip_args(args: &[&str], reply_target: Option<&PlatformUser>) -> Command {
    let amount = |s: Option<&&str>| s.map(|a| AmountArg::Text(a.to_string()));
    match (args.first(), reply_target) {
        (Some(first), _) if first.starts_with('@') => {
            if args.len() > 2 {
                return Command::Usage(TIP_USAGE);
            }
            Command::Tip {
                recipient: Recipient::Handle(first.to_string()),
                amount: amount(args.get(1)),
            }
        }
        (_, Some(target)) if args.len() <= 1 => Command::Tip {
            recipient: Recipient::Live(target.clone()),
            amount: amount(args.first()),
        },
        (Some(first), None) if args.len() <= 2 => Command::Tip {
            recipient: Recipient::Handle(first.to_string()),
            amount: amount(args.get(1)),
        },
        _ => Command::Usage(TIP_USAGE),
    }
}

pub fn encode_button(key: &PendingKey, choice: AmountChoice) -> String {
    let token = match choice {
        AmountChoice::Preset(amount) => format_eth(amount),
        AmountChoice::Custom => CUSTOM_TOKEN.to_string(),
    };
    format!("{BUTTON_PREFIX}{key}:{token}")
}

pub fn decode_button(data: &str) -> Option<(PendingKey, AmountChoice)> {
    let rest = data.strip_prefix(BUTTON_PREFIX)?;
    let (key, token) = rest.rsplit_once(':')?;
    if key.is_empty() {
        return None;
    }
    let choice = if token == CUSTOM_TOKEN {
        AmountChoice::Custom
    } else {
        AmountChoice::Preset(parse_eth(token).ok()?)
    };
    Some((PendingKey(key.to_string()), choice))
}

/// Reply slot that remembers whether anything public has been shown, so that a
/// late failure replaces a public "processing" message in place.
struct Reply<'a> {
    conv: &'a dyn Conversation,
    public: AtomicBool,
}

impl<'a> Reply<'a> {
    fn new(conv: &'a dyn Conversation) -> Self {
        Self {
            conv,
            public: AtomicBool::new(false),
        }
    }

    async fn show(&self, mut message: OutgoingMessage) -> Result<()> {
        if message.visibility == Visibility::Public {
            self.public.store(true, Ordering::SeqCst);
        }
        let caps = self.conv.capabilities();
        if !caps.supports_inline_keyboards {
            message.keyboard = None;
        }
        if message.text.chars().count() > caps.max_message_len {
            message.text = message.text.chars().take(caps.max_message_len).collect();
        }
        self.conv.show(message).await
    }

    async fn fail(&self, err: &Error) -> Result<()> {
        let text = err.user_message();
        let message = if self.public.load(Ordering::SeqCst) {
            OutgoingMessage::public(text)
        } else {
            OutgoingMessage::private(text)
        };
        self.show(message).await
    }
}

pub struct Router {
    service: Arc<TipService>,
    limiter: Mutex<RateLimiter>,
    audit: Option<Arc<AuditLogger>>,
}

impl Router {
    pub fn new(service: Arc<TipService>, limiter: RateLimiter, audit: Option<Arc<AuditLogger>>) -> Self {
        Self {
            service,
            limiter: Mutex::new(limiter),
            audit,
        }
    }

    pub fn platform(&self) -> Platform {
        self.service.platform()
    }

    /// Handle one inbound event. Domain failures are shown to the user; only
    /// failures of the conversation itself are returned.
    pub async fn dispatch(&self, event: InboundEvent, conv: &dyn Conversation) -> Result<()> {
        let reply = Reply::new(conv);
        let user = event.user().clone();

        if let Err(retry_after) = self.check_rate(&user) {
            tracing::info!(platform = %self.platform(), user_id = user.id, "rate limited");
            self.audit_with(|| {
                AuditEvent::rate_limit(self.platform(), &self.audit_id(&user), retry_after.as_secs_f64())
            });
            return reply.fail(&Error::RateLimited { retry_after }).await;
        }

        // Before any ledger call: platforms with a response deadline must hear
        // back even when the ledger is slow.
        conv.acknowledge(expected_visibility(&event)).await?;

        let context = event_context(&event);
        match self.handle(event, &reply).await {
            Ok(()) => Ok(()),
            Err(Error::External(e)) => Err(Error::External(e)),
            Err(err) => {
                tracing::warn!(platform = %self.platform(), user_id = user.id, context, error = %err, "command failed");
                self.audit_with(|| {
                    AuditEvent::error(self.platform(), &self.audit_id(&user), &err.to_string(), context)
                });
                reply.fail(&err).await
            }
        }
    }

    async fn handle(&self, event: InboundEvent, reply: &Reply<'_>) -> Result<()> {
        match event {
            InboundEvent::Command { user, command } => self.handle_command(user, command, reply).await,
            InboundEvent::Button { user, data } => {
                let (key, choice) = decode_button(&data).ok_or(Error::ExpiredTip)?;
                self.handle_confirm(user, key, choice, reply).await
            }
        }
    }

    async fn handle_command(&self, user: PlatformUser, command: Command, reply: &Reply<'_>) -> Result<()> {
        let platform = self.platform();
        match command {
            Command::Start | Command::Help => {
                reply
                    .show(OutgoingMessage::private(formatting::help_text(platform)))
                    .await
            }
            Command::Usage(usage) => reply.show(OutgoingMessage::private(usage)).await,
            Command::Balance => {
                let balance = self.service.read_balance(&user).await?;
                reply
                    .show(OutgoingMessage::private(formatting::balance_text(balance)))
                    .await
            }
            Command::Stats => {
                let stats = self.service.read_stats(&user).await?;
                reply
                    .show(OutgoingMessage::private(formatting::stats_text(&stats)))
                    .await
            }
            Command::Deposit => {
                let info = self.service.deposit_info(&user).await;
                let text = formatting::deposit_text(
                    info.contract,
                    &info.user_id,
                    info.dashboard_url.as_deref(),
                );
                reply.show(OutgoingMessage::private(text)).await
            }
            Command::Tip {
                recipient,
                amount: None,
            } => {
                let proposal = self.service.propose_tip(&user, &recipient).await?;
                reply.show(self.proposal_message(&proposal)).await
            }
            Command::Tip {
                recipient,
                amount: Some(amount),
            } => {
                let amount = amount.to_wei()?;
                let prepared = self.service.direct_tip(&user, &recipient, amount).await?;
                self.run_tip(prepared, reply).await
            }
            Command::Withdraw { address, amount } => {
                let amount = amount.to_wei()?;
                let prepared = self
                    .service
                    .prepare_withdraw(&user, &address, amount)
                    .await?;
                reply
                    .show(OutgoingMessage::private(formatting::PROCESSING_WITHDRAWAL))
                    .await?;
                let receipt = self.service.execute_withdraw(prepared).await?;
                self.audit_with(|| {
                    AuditEvent::withdraw(
                        platform,
                        &receipt.withdrawal.user_id,
                        receipt.withdrawal.destination,
                        receipt.withdrawal.amount,
                        &receipt.outcome,
                    )
                });
                let text = formatting::withdraw_result_text(
                    receipt.withdrawal.amount,
                    receipt.withdrawal.destination,
                    &receipt.outcome,
                    &receipt.tx_link,
                );
                reply.show(OutgoingMessage::private(text)).await
            }
        }
    }

    async fn handle_confirm(
        &self,
        user: PlatformUser,
        key: PendingKey,
        choice: AmountChoice,
        reply: &Reply<'_>,
    ) -> Result<()> {
        match self.service.confirm_tip(&user, &key, choice).await? {
            Confirmation::Custom { recipient_name } => {
                let text = formatting::custom_amount_text(self.platform(), &recipient_name);
                reply.show(OutgoingMessage::private(text)).await
            }
            Confirmation::Ready(prepared) => self.run_tip(prepared, reply).await,
        }
    }

    async fn run_tip(&self, prepared: PreparedTip, reply: &Reply<'_>) -> Result<()> {
        reply
            .show(OutgoingMessage::public(formatting::PROCESSING_TIP))
            .await?;
        let receipt = self.service.execute_tip(prepared).await?;
        self.audit_with(|| {
            AuditEvent::tip(
                self.platform(),
                &receipt.tip.sender_id,
                &receipt.tip.recipient_id,
                receipt.tip.amount,
                &receipt.outcome,
            )
        });
        let text = formatting::tip_result_text(
            &receipt.tip.sender_name,
            &receipt.tip.recipient_name,
            receipt.tip.amount,
            &receipt.outcome,
            &receipt.tx_link,
        );
        reply.show(OutgoingMessage::public(text)).await
    }

    fn proposal_message(&self, proposal: &TipProposal) -> OutgoingMessage {
        let mut buttons: Vec<InlineButton> = proposal
            .amounts
            .iter()
            .map(|amount| InlineButton {
                label: format!("{} ETH", format_eth(*amount)),
                callback_data: encode_button(&proposal.key, AmountChoice::Preset(*amount)),
                secondary: false,
            })
            .collect();
        buttons.push(InlineButton {
            label: "Custom".to_string(),
            callback_data: encode_button(&proposal.key, AmountChoice::Custom),
            secondary: true,
        });

        let text =
            formatting::proposal_text(self.platform(), &proposal.recipient_name, proposal.balance);
        OutgoingMessage::public(text).with_keyboard(InlineKeyboard::new(buttons))
    }

    fn check_rate(&self, user: &PlatformUser) -> std::result::Result<(), std::time::Duration> {
        match self.limiter.lock() {
            Ok(mut limiter) => limiter.check((user.platform, user.id)),
            // A poisoned limiter only loses bucket state; fail open.
            Err(poisoned) => poisoned.into_inner().check((user.platform, user.id)),
        }
    }

    /// Ledger key for audit records; pure, so it never touches the identity store.
    fn audit_id(&self, user: &PlatformUser) -> ContractUserId {
        contract_user_id(user.platform, user.id, user.username.as_deref())
    }

    fn audit_with(&self, event: impl FnOnce() -> AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.record(event());
        }
    }
}

/// State shared by every front-end. Each platform builds its own [`Router`]
/// with its own identity namespace, rate limiter and direct messenger, while
/// the gateway and the pending-tip store are common.
#[derive(Clone)]
pub struct RouterDeps {
    pub gateway: Arc<dyn ContractGateway>,
    pub pending: Arc<dyn PendingTipStore>,
    pub settings: ServiceSettings,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
    pub audit: Option<Arc<AuditLogger>>,
    pub notify_throttle: ThrottleConfig,
}

impl RouterDeps {
    pub fn build(&self, platform: Platform, messenger: Arc<dyn DirectMessenger>) -> Router {
        let identity = Arc::new(IdentityResolver::in_memory(platform));
        let messenger: Arc<dyn DirectMessenger> =
            Arc::new(ThrottledMessenger::new(messenger, self.notify_throttle));
        let notifier = NotificationDispatcher::new(identity.clone(), messenger);
        let service = TipService::new(
            identity,
            self.gateway.clone(),
            self.pending.clone(),
            notifier,
            self.settings.clone(),
        );
        let limiter = RateLimiter::new(
            self.rate_limit_enabled,
            self.rate_limit_requests,
            self.rate_limit_window,
        );
        Router::new(Arc::new(service), limiter, self.audit.clone())
    }
}

/// Visibility of the first reply an event produces when it succeeds.
fn expected_visibility(event: &InboundEvent) -> Visibility {
    match event {
        InboundEvent::Button { .. } => Visibility::Public,
        InboundEvent::Command { command, .. } => match command {
            Command::Tip { .. } => Visibility::Public,
            _ => Visibility::Private,
        },
    }
}

fn event_context(event: &InboundEvent) -> &'static str {
    match event {
        InboundEvent::Button { .. } => "confirm_tip",
        InboundEvent::Command { command, .. } => match command {
            Command::Start | Command::Help | Command::Usage(_) => "help",
            Command::Balance => "balance",
            Command::Deposit => "deposit",
            Command::Stats => "stats",
            Command::Tip { .. } => "tip",
            Command::Withdraw { .. } => "withdraw",
        },
    }
}
