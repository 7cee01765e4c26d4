use std::sync::Arc;

use teloxide::prelude::*;

use tipbot_core::router::InboundEvent;

use crate::{platform_user, router::AppState, TelegramConversation};

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let data = q.data.clone().unwrap_or_default();

    // Inline-mode messages carry no chat; we never create those.
    let message = match q.message.as_ref() {
        Some(message) if !data.is_empty() => message,
        _ => {
            if let Err(e) = bot.answer_callback_query(cb_id).await {
                tracing::debug!(error = %e, "answer_callback_query failed");
            }
            return Ok(());
        }
    };

    let user = platform_user(&q.from);
    let conv =
        TelegramConversation::for_callback(bot, message.chat.id, message.id, cb_id, q.from.id);
    let event = InboundEvent::Button {
        user: user.clone(),
        data,
    };

    if let Err(e) = state.router.dispatch(event, &conv).await {
        tracing::warn!(user_id = user.id, error = %e, "telegram callback reply failed");
    }
    if let Err(e) = conv.finish().await {
        tracing::debug!(error = %e, "answer_callback_query failed");
    }
    Ok(())
}
