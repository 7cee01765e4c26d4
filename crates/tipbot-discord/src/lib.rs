//! Discord adapter (serenity).
//!
//! Slash commands and buttons arrive as interactions. Each one is answered
//! before any slow work starts; later shows fill or edit that answer, and
//! private output is sent ephemeral.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serenity::all::{
    ButtonStyle, CommandInteraction, ComponentInteraction, CreateActionRow, CreateButton,
    CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage, CreateMessage, EditInteractionResponse, Http, MessageId, User,
    UserId,
};

pub mod handler;

use tipbot_core::{
    domain::{Platform, PlatformUser},
    errors::Error,
    messaging::{
        port::{Conversation, DirectMessenger},
        types::{InlineKeyboard, MessagingCapabilities, OutgoingMessage, Visibility},
    },
    Result,
};

pub use handler::run_gateway;

const MAX_MESSAGE_LEN: usize = 2000;
/// Discord allows five buttons per action row.
const MAX_BUTTONS_PER_ROW: usize = 5;

fn map_err(e: serenity::Error) -> Error {
    Error::External(format!("discord error: {e}"))
}

pub fn platform_user(user: &User) -> PlatformUser {
    PlatformUser::new(Platform::Discord, user.id.get(), Some(user.name.clone())).bot(user.bot)
}

fn action_rows(keyboard: Option<&InlineKeyboard>) -> Vec<CreateActionRow> {
    let Some(keyboard) = keyboard else {
        return Vec::new();
    };
    keyboard
        .buttons
        .chunks(MAX_BUTTONS_PER_ROW)
        .map(|chunk| {
            let buttons = chunk
                .iter()
                .map(|b| {
                    let style = if b.secondary {
                        ButtonStyle::Secondary
                    } else {
                        ButtonStyle::Primary
                    };
                    CreateButton::new(b.callback_data.clone())
                        .label(b.label.clone())
                        .style(style)
                })
                .collect();
            CreateActionRow::Buttons(buttons)
        })
        .collect()
}

/// Direct messages through the user's DM channel.
#[derive(Clone)]
pub struct DiscordMessenger {
    http: Arc<Http>,
}

impl DiscordMessenger {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl DirectMessenger for DiscordMessenger {
    async fn send_direct(&self, native_id: u64, text: &str) -> Result<()> {
        if native_id == 0 {
            return Err(Error::External("discord user id 0 is invalid".into()));
        }
        UserId::new(native_id)
            .direct_message(&self.http, CreateMessage::new().content(text))
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

enum Origin {
    Command(CommandInteraction),
    Component(ComponentInteraction),
}

/// What the interaction's reply currently looks like.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Fresh,
    /// Button press acknowledged without a message.
    Acknowledged,
    /// Deferred "thinking" response, not yet filled.
    Deferred(Visibility),
    Original(Visibility),
    /// The follow-up message written last.
    Followup(Visibility, MessageId),
}

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Respond,
    EditOriginal,
    EditFollowup(MessageId),
    /// An ephemeral message cannot become public (or vice versa), so a change
    /// of visibility goes out as a new follow-up. An unfilled deferral of the
    /// other visibility is deleted first.
    FollowUp { discard_deferred: bool },
}

fn plan(slot: Slot, visibility: Visibility) -> Action {
    match slot {
        Slot::Fresh => Action::Respond,
        Slot::Deferred(v) | Slot::Original(v) if v == visibility => Action::EditOriginal,
        Slot::Followup(v, id) if v == visibility => Action::EditFollowup(id),
        Slot::Deferred(_) => Action::FollowUp {
            discard_deferred: true,
        },
        Slot::Acknowledged | Slot::Original(_) | Slot::Followup(..) => Action::FollowUp {
            discard_deferred: false,
        },
    }
}

/// Reply slot for one interaction.
///
/// Discord drops interactions that get no response within three seconds, so
/// commands are deferred and button presses acknowledged before any slow work.
pub struct DiscordConversation {
    http: Arc<Http>,
    origin: Origin,
    slot: Mutex<Slot>,
}

impl DiscordConversation {
    pub fn for_command(http: Arc<Http>, interaction: CommandInteraction) -> Self {
        Self::new(http, Origin::Command(interaction))
    }

    pub fn for_component(http: Arc<Http>, interaction: ComponentInteraction) -> Self {
        Self::new(http, Origin::Component(interaction))
    }

    fn new(http: Arc<Http>, origin: Origin) -> Self {
        Self {
            http,
            origin,
            slot: Mutex::new(Slot::Fresh),
        }
    }

    fn slot(&self) -> Slot {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_slot(&self, slot: Slot) {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = slot;
    }

    async fn create_response(&self, response: CreateInteractionResponse) -> Result<()> {
        match &self.origin {
            Origin::Command(i) => i.create_response(&self.http, response).await,
            Origin::Component(i) => i.create_response(&self.http, response).await,
        }
        .map_err(map_err)
    }

    async fn respond(&self, message: &OutgoingMessage) -> Result<()> {
        let body = CreateInteractionResponseMessage::new()
            .content(message.text.clone())
            .ephemeral(message.visibility == Visibility::Private)
            .components(action_rows(message.keyboard.as_ref()));
        self.create_response(CreateInteractionResponse::Message(body))
            .await
    }

    async fn edit_original(&self, message: &OutgoingMessage) -> Result<()> {
        let edit = EditInteractionResponse::new()
            .content(message.text.clone())
            .components(action_rows(message.keyboard.as_ref()));
        match &self.origin {
            Origin::Command(i) => i.edit_response(&self.http, edit).await,
            Origin::Component(i) => i.edit_response(&self.http, edit).await,
        }
        .map_err(map_err)?;
        Ok(())
    }

    async fn discard_original(&self) {
        let res = match &self.origin {
            Origin::Command(i) => i.delete_response(&self.http).await,
            Origin::Component(i) => i.delete_response(&self.http).await,
        };
        if let Err(e) = res {
            tracing::debug!(error = %e, "could not delete deferred response");
        }
    }

    fn followup_body(message: &OutgoingMessage) -> CreateInteractionResponseFollowup {
        CreateInteractionResponseFollowup::new()
            .content(message.text.clone())
            .ephemeral(message.visibility == Visibility::Private)
            .components(action_rows(message.keyboard.as_ref()))
    }

    async fn follow_up(&self, message: &OutgoingMessage) -> Result<MessageId> {
        let body = Self::followup_body(message);
        let sent = match &self.origin {
            Origin::Command(i) => i.create_followup(&self.http, body).await,
            Origin::Component(i) => i.create_followup(&self.http, body).await,
        }
        .map_err(map_err)?;
        Ok(sent.id)
    }

    async fn edit_followup(&self, id: MessageId, message: &OutgoingMessage) -> Result<()> {
        let body = Self::followup_body(message);
        match &self.origin {
            Origin::Command(i) => i.edit_followup(&self.http, id, body).await,
            Origin::Component(i) => i.edit_followup(&self.http, id, body).await,
        }
        .map_err(map_err)?;
        Ok(())
    }
}

#[async_trait]
impl Conversation for DiscordConversation {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_inline_keyboards: true,
            max_message_len: MAX_MESSAGE_LEN,
        }
    }

    async fn acknowledge(&self, expected: Visibility) -> Result<()> {
        if self.slot() != Slot::Fresh {
            return Ok(());
        }
        match &self.origin {
            Origin::Command(_) => {
                let defer = CreateInteractionResponseMessage::new()
                    .ephemeral(expected == Visibility::Private);
                self.create_response(CreateInteractionResponse::Defer(defer))
                    .await?;
                self.set_slot(Slot::Deferred(expected));
            }
            // The press already has a visible message (the proposal); replies
            // go out as follow-ups of either visibility.
            Origin::Component(_) => {
                self.create_response(CreateInteractionResponse::Acknowledge)
                    .await?;
                self.set_slot(Slot::Acknowledged);
            }
        }
        Ok(())
    }

    async fn show(&self, message: OutgoingMessage) -> Result<()> {
        let visibility = message.visibility;
        match plan(self.slot(), visibility) {
            Action::Respond => {
                self.respond(&message).await?;
                self.set_slot(Slot::Original(visibility));
            }
            Action::EditOriginal => {
                self.edit_original(&message).await?;
                self.set_slot(Slot::Original(visibility));
            }
            Action::EditFollowup(id) => self.edit_followup(id, &message).await?,
            Action::FollowUp { discard_deferred } => {
                if discard_deferred {
                    self.discard_original().await;
                }
                let id = self.follow_up(&message).await?;
                self.set_slot(Slot::Followup(visibility, id));
            }
        }
        Ok(())
    }
}
