use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;

use tipbot_core::{
    config::SecretString,
    domain::Platform,
    router::{Router, RouterDeps},
};

use crate::handlers;
use crate::TelegramMessenger;

pub struct AppState {
    pub router: Arc<Router>,
    /// Lowercased `@username` of this bot, used to ignore `/cmd@OtherBot`.
    pub bot_username: Option<String>,
}

pub async fn run_polling(
    token: &SecretString,
    deps: &RouterDeps,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let bot = Bot::new(token.expose());

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            tracing::info!(username = %me.username(), "telegram bot started");
            me.user.username.as_ref().map(|u| u.to_lowercase())
        }
        Err(e) => {
            tracing::warn!(error = %e, "get_me failed; commands addressed to other bots will not be filtered");
            None
        }
    };

    let messenger = Arc::new(TelegramMessenger::new(bot.clone()));
    let router = Arc::new(deps.build(Platform::Telegram, messenger));

    let state = Arc::new(AppState {
        router,
        bot_username,
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        cancel.cancelled().await;
        match shutdown.shutdown() {
            Ok(done) => done.await,
            Err(e) => tracing::debug!(error = %e, "telegram dispatcher was idle at shutdown"),
        }
    });

    dispatcher.dispatch().await;
    tracing::info!("telegram dispatcher stopped");
    Ok(())
}
