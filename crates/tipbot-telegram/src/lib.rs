//! Telegram adapter (teloxide).
//!
//! Implements the `tipbot-core` messaging ports over the Telegram Bot API and
//! translates updates into router events.

use std::sync::Mutex;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, User, UserId},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use tipbot_core::{
    domain::{Platform, PlatformUser},
    errors::Error,
    formatting::markdown_to_telegram_html,
    messaging::{
        port::{Conversation, DirectMessenger},
        types::{InlineKeyboard, MessagingCapabilities, OutgoingMessage, Visibility},
    },
    Result,
};

const MAX_MESSAGE_LEN: usize = 4096;
/// Telegram truncates callback alerts beyond this.
const MAX_ALERT_LEN: usize = 200;

fn map_err(e: teloxide::RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

/// Run a request, retrying once when Telegram answers with `RetryAfter`.
async fn with_retry<T, Fut>(mut op: impl FnMut() -> Fut) -> Result<T>
where
    Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
    Fut::IntoFuture: Send,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                sleep(d).await;
            }
            Err(other) => return Err(map_err(other)),
        }
    }
}

pub fn platform_user(user: &User) -> PlatformUser {
    PlatformUser::new(Platform::Telegram, user.id.0, user.username.clone()).bot(user.is_bot)
}

fn keyboard_markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
    let row: Vec<InlineKeyboardButton> = keyboard
        .buttons
        .iter()
        .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
        .collect();
    InlineKeyboardMarkup::new(vec![row])
}

/// Strip the light markdown for plain-text surfaces (callback alerts).
pub fn plain_text(markdown: &str) -> String {
    let mut out = markdown.replace("**", "").replace('`', "");
    if out.chars().count() > MAX_ALERT_LEN {
        out = out.chars().take(MAX_ALERT_LEN - 1).collect();
        out.push('…');
    }
    out
}

/// Direct messages to a user's private chat (chat id == user id).
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl DirectMessenger for TelegramMessenger {
    async fn send_direct(&self, native_id: u64, text: &str) -> Result<()> {
        let html = markdown_to_telegram_html(text);
        let chat = ChatId(native_id as i64);
        with_retry(|| {
            self.bot
                .send_message(chat, html.clone())
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(true)
        })
        .await?;
        Ok(())
    }
}

const DM_BLOCKED_NOTICE: &str =
    "📬 I couldn't message you privately. Open a chat with me, press Start, then try again.";

/// The user's private chat, when the update came from somewhere else.
fn private_chat_for(chat_id: ChatId, user: UserId) -> Option<ChatId> {
    let own = ChatId::from(user);
    (chat_id != own).then_some(own)
}

/// Reply slot for one update.
///
/// Command context: the first `show` replies to the command, later calls edit
/// that reply. Button context: private notices become a callback alert,
/// public ones edit the message that carried the keyboard. Outside the user's
/// own chat, any other private output goes to them by DM.
pub struct TelegramConversation {
    bot: Bot,
    chat_id: ChatId,
    private_chat: Option<ChatId>,
    reply_to: Option<MessageId>,
    callback_id: Option<String>,
    callback_answered: Mutex<bool>,
    message: Mutex<Option<(ChatId, MessageId)>>,
}

impl TelegramConversation {
    pub fn for_command(bot: Bot, chat_id: ChatId, reply_to: MessageId, user: UserId) -> Self {
        Self {
            bot,
            chat_id,
            private_chat: private_chat_for(chat_id, user),
            reply_to: Some(reply_to),
            callback_id: None,
            callback_answered: Mutex::new(false),
            message: Mutex::new(None),
        }
    }

    pub fn for_callback(
        bot: Bot,
        chat_id: ChatId,
        message_id: MessageId,
        callback_id: String,
        user: UserId,
    ) -> Self {
        Self {
            bot,
            chat_id,
            private_chat: private_chat_for(chat_id, user),
            reply_to: None,
            callback_id: Some(callback_id),
            callback_answered: Mutex::new(false),
            message: Mutex::new(Some((chat_id, message_id))),
        }
    }

    /// Telegram shows a spinner until every callback query is answered.
    pub async fn finish(&self) -> Result<()> {
        let Some(id) = self.callback_id.clone() else {
            return Ok(());
        };
        if self.take_callback_answer() {
            with_retry(|| self.bot.answer_callback_query(id.clone())).await?;
        }
        Ok(())
    }

    /// Returns true exactly once for callback contexts.
    fn take_callback_answer(&self) -> bool {
        if self.callback_id.is_none() {
            return false;
        }
        let mut answered = self
            .callback_answered
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        !std::mem::replace(&mut *answered, true)
    }

    fn current_message(&self) -> Option<(ChatId, MessageId)> {
        *self.message.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn remember_message(&self, chat: ChatId, id: MessageId) {
        *self.message.lock().unwrap_or_else(|p| p.into_inner()) = Some((chat, id));
    }

    /// Edit the last message in `chat`, or send a new one there.
    async fn put(&self, chat: ChatId, html: &str, markup: Option<&InlineKeyboardMarkup>) -> Result<()> {
        match self.current_message() {
            Some((shown_in, message_id)) if shown_in == chat => {
                with_retry(|| {
                    let mut req = self
                        .bot
                        .edit_message_text(chat, message_id, html.to_string())
                        .parse_mode(ParseMode::Html)
                        .disable_web_page_preview(true);
                    if let Some(m) = markup {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?;
            }
            _ => {
                let sent = with_retry(|| {
                    let mut req = self
                        .bot
                        .send_message(chat, html.to_string())
                        .parse_mode(ParseMode::Html)
                        .disable_web_page_preview(true);
                    if chat == self.chat_id {
                        if let Some(reply_to) = self.reply_to {
                            req = req.reply_to_message_id(reply_to);
                        }
                    }
                    if let Some(m) = markup {
                        req = req.reply_markup(m.clone());
                    }
                    req
                })
                .await?;
                self.remember_message(chat, sent.id);
            }
        }
        Ok(())
    }

    async fn alert(&self, callback_id: String, text: &str) -> Result<()> {
        let text = plain_text(text);
        with_retry(|| {
            self.bot
                .answer_callback_query(callback_id.clone())
                .text(text.clone())
                .show_alert(true)
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Conversation for TelegramConversation {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_inline_keyboards: true,
            max_message_len: MAX_MESSAGE_LEN,
        }
    }

    async fn show(&self, message: OutgoingMessage) -> Result<()> {
        if message.visibility == Visibility::Private {
            if let Some(id) = self.callback_id.clone() {
                if self.take_callback_answer() {
                    return self.alert(id, &message.text).await;
                }
            }
        }

        let html = markdown_to_telegram_html(&message.text);
        let markup = message.keyboard.as_ref().map(keyboard_markup);

        match (message.visibility, self.private_chat) {
            (Visibility::Private, Some(dm)) => {
                if let Err(e) = self.put(dm, &html, markup.as_ref()).await {
                    // Bots cannot open a private chat the user never started.
                    tracing::debug!(chat_id = dm.0, error = %e, "private reply could not be delivered");
                    if let Some(id) = self.callback_id.clone() {
                        if self.take_callback_answer() {
                            return self.alert(id, DM_BLOCKED_NOTICE).await;
                        }
                    }
                    let notice = markdown_to_telegram_html(DM_BLOCKED_NOTICE);
                    self.put(self.chat_id, &notice, None).await?;
                }
                Ok(())
            }
            _ => self.put(self.chat_id, &html, markup.as_ref()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tipbot_core::messaging::types::InlineButton;

    #[test]
    fn alerts_drop_markup_and_stay_short() {
        assert_eq!(
            plain_text("❌ Tip expired. Please use `/tip` again."),
            "❌ Tip expired. Please use /tip again."
        );
        let long = plain_text(&"x".repeat(500));
        assert_eq!(long.chars().count(), MAX_ALERT_LEN);
        assert!(long.ends_with('…'));
    }

    #[test]
    fn private_output_leaves_group_chats() {
        let user = UserId(42);
        assert_eq!(private_chat_for(ChatId(42), user), None);
        assert_eq!(private_chat_for(ChatId(-100123), user), Some(ChatId(42)));
    }

    #[test]
    fn keyboard_is_one_row() {
        let kb = InlineKeyboard::new(vec![
            InlineButton {
                label: "0.0005 ETH".into(),
                callback_data: "tip:1-2:0.0005".into(),
                secondary: false,
            },
            InlineButton {
                label: "Custom".into(),
                callback_data: "tip:1-2:custom".into(),
                secondary: true,
            },
        ]);
        let markup = keyboard_markup(&kb);
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
    }
}
