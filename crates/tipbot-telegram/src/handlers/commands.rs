use std::sync::Arc;

use teloxide::prelude::*;

use tipbot_core::router::{parse_text_command, InboundEvent};

use crate::{platform_user, router::AppState, TelegramConversation};

/// `/cmd@name ...` addressed to some other bot in a group chat.
fn addressed_elsewhere(text: &str, me: Option<&str>) -> bool {
    let head = text.split_whitespace().next().unwrap_or("");
    match (head.split_once('@'), me) {
        (Some((_, target)), Some(me)) => !target.eq_ignore_ascii_case(me),
        _ => false,
    }
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let (Some(text), Some(from)) = (msg.text(), msg.from()) else {
        return Ok(());
    };
    if addressed_elsewhere(text, state.bot_username.as_deref()) {
        return Ok(());
    }

    let reply_target = msg
        .reply_to_message()
        .and_then(|m| m.from())
        .map(platform_user);
    let Some(command) = parse_text_command(text, reply_target.as_ref()) else {
        return Ok(());
    };

    let user = platform_user(from);
    let conv = TelegramConversation::for_command(bot, msg.chat.id, msg.id, from.id);
    let event = InboundEvent::Command {
        user: user.clone(),
        command,
    };
    if let Err(e) = state.router.dispatch(event, &conv).await {
        tracing::warn!(user_id = user.id, chat_id = msg.chat.id.0, error = %e, "telegram reply failed");
    }
    Ok(())
}
