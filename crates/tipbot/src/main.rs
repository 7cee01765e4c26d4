use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use tipbot_core::{
    audit::AuditLogger,
    config::Config,
    domain::ExplorerLinks,
    gateway::{ContractGateway, RetryingGateway},
    messaging::throttled::ThrottleConfig,
    pending::{spawn_sweeper, InMemoryPendingTips, PendingTipStore},
    router::RouterDeps,
    service::ServiceSettings,
};
use tipbot_evm::EvmGateway;

#[tokio::main]
async fn main() -> Result<(), tipbot_core::Error> {
    tipbot_core::logging::init("tipbot")?;

    let cfg = Config::load()?;

    let evm = EvmGateway::connect(
        &cfg.rpc_url,
        cfg.contract_address,
        &cfg.private_key,
        cfg.tx_confirm_timeout,
        cfg.rpc_timeout,
    )
    .await?;
    let gateway: Arc<dyn ContractGateway> =
        Arc::new(RetryingGateway::new(Arc::new(evm), cfg.read_retry));

    let cancel = CancellationToken::new();

    let pending: Arc<dyn PendingTipStore> = Arc::new(InMemoryPendingTips::new(cfg.pending_tip_ttl));
    let sweeper = spawn_sweeper(pending.clone(), cfg.pending_tip_sweep, cancel.clone());

    let audit = cfg.audit_log_path.as_ref().map(|path| {
        tracing::info!(path = %path.display(), json = cfg.audit_log_json, "audit log enabled");
        Arc::new(AuditLogger::new(path.clone(), cfg.audit_log_json))
    });

    let deps = Arc::new(RouterDeps {
        gateway,
        pending,
        settings: ServiceSettings {
            contract_address: cfg.contract_address,
            dashboard_url: cfg.dashboard_url.clone(),
            explorer: ExplorerLinks::new(cfg.explorer_url.clone()),
            quick_amounts: cfg.quick_tip_amounts.clone(),
        },
        rate_limit_enabled: cfg.rate_limit_enabled,
        rate_limit_requests: cfg.rate_limit_requests,
        rate_limit_window: cfg.rate_limit_window,
        audit,
        notify_throttle: ThrottleConfig {
            per_recipient_min_interval: cfg.notify_min_interval,
            ..ThrottleConfig::default()
        },
    });

    let mut fronts = JoinSet::new();
    if let Some(token) = cfg.telegram_bot_token.clone() {
        let (deps, cancel) = (deps.clone(), cancel.clone());
        fronts.spawn(async move {
            let res = tipbot_telegram::router::run_polling(&token, &deps, cancel).await;
            ("telegram", res)
        });
    }
    if let Some(token) = cfg.discord_bot_token.clone() {
        let (deps, cancel) = (deps.clone(), cancel.clone());
        fronts.spawn(async move {
            let res = tipbot_discord::run_gateway(&token, &deps, cancel).await;
            ("discord", res)
        });
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    let mut failure = None;
    while let Some(joined) = fronts.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((name, Err(e))) => {
                tracing::error!(front_end = name, error = %e, "front-end failed");
                failure.get_or_insert_with(|| format!("{name} bot failed: {e}"));
            }
            Err(e) => {
                tracing::error!(error = %e, "front-end task panicked");
                failure.get_or_insert_with(|| format!("front-end task panicked: {e}"));
            }
        }
        // One front-end stopping takes the process down with it.
        cancel.cancel();
    }
    if let Err(e) = sweeper.await {
        tracing::debug!(error = %e, "pending-tip sweeper did not stop cleanly");
    }

    match failure {
        Some(msg) => Err(tipbot_core::Error::External(msg)),
        None => Ok(()),
    }
}
