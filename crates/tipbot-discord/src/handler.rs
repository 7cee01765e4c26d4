use std::sync::Arc;

use serenity::all::{
    Client, Command as SlashCommand, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, EventHandler, GatewayIntents, Http, Interaction, Ready,
    ResolvedValue,
};
use tokio_util::sync::CancellationToken;

use tipbot_core::{
    config::SecretString,
    domain::{Platform, PlatformUser},
    router::{AmountArg, Command, InboundEvent, Router, RouterDeps},
    service::Recipient,
};

use crate::{platform_user, DiscordConversation, DiscordMessenger};

const TIP_USAGE: &str = "Usage: `/tip user:<user> [amount]`";
const WITHDRAW_USAGE: &str = "Usage: `/withdraw address:<address> amount:<amount>`";

fn slash_commands() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("tip")
            .description("Send ETH tip to a user")
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "user", "User to tip")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Number,
                    "amount",
                    "Amount in ETH (leave empty for quick tip buttons)",
                )
                .required(false),
            ),
        CreateCommand::new("balance").description("Check your tip balance"),
        CreateCommand::new("deposit").description("Get deposit instructions"),
        CreateCommand::new("withdraw")
            .description("Withdraw ETH to your wallet")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "address", "Ethereum address")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(CommandOptionType::Number, "amount", "Amount in ETH")
                    .required(true),
            ),
        CreateCommand::new("stats").description("View your tipping stats"),
        CreateCommand::new("help").description("Show how the tip bot works"),
    ]
}

/// Slash-command options, already pulled out of the interaction.
#[derive(Debug, Default)]
struct SlashArgs {
    user: Option<PlatformUser>,
    amount: Option<f64>,
    address: Option<String>,
}

impl SlashArgs {
    fn from_interaction(cmd: &CommandInteraction) -> Self {
        let mut args = SlashArgs::default();
        for opt in cmd.data.options() {
            match (opt.name, opt.value) {
                ("user", ResolvedValue::User(user, _)) => args.user = Some(platform_user(user)),
                ("amount", ResolvedValue::Number(n)) => args.amount = Some(n),
                ("address", ResolvedValue::String(s)) => args.address = Some(s.to_string()),
                _ => {}
            }
        }
        args
    }

    fn into_command(self, name: &str) -> Option<Command> {
        let command = match name {
            "help" => Command::Help,
            "balance" => Command::Balance,
            "deposit" => Command::Deposit,
            "stats" => Command::Stats,
            "tip" => match self.user {
                Some(user) => Command::Tip {
                    recipient: Recipient::Live(user),
                    amount: self.amount.map(AmountArg::Number),
                },
                None => Command::Usage(TIP_USAGE),
            },
            "withdraw" => match (self.address, self.amount) {
                (Some(address), Some(amount)) => Command::Withdraw {
                    address,
                    amount: AmountArg::Number(amount),
                },
                _ => Command::Usage(WITHDRAW_USAGE),
            },
            _ => return None,
        };
        Some(command)
    }
}

struct Handler {
    router: Arc<Router>,
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, "discord bot connected");
        match SlashCommand::set_global_commands(&ctx.http, slash_commands()).await {
            Ok(registered) => tracing::info!(count = registered.len(), "slash commands registered"),
            Err(e) => tracing::error!(error = %e, "failed to register slash commands"),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(cmd) => {
                let user = platform_user(&cmd.user);
                let Some(command) =
                    SlashArgs::from_interaction(&cmd).into_command(&cmd.data.name)
                else {
                    tracing::debug!(name = %cmd.data.name, "unknown slash command");
                    return;
                };
                let conv = DiscordConversation::for_command(ctx.http.clone(), cmd);
                let event = InboundEvent::Command {
                    user: user.clone(),
                    command,
                };
                if let Err(e) = self.router.dispatch(event, &conv).await {
                    tracing::warn!(user_id = user.id, error = %e, "discord reply failed");
                }
            }
            Interaction::Component(component) => {
                let user = platform_user(&component.user);
                let data = component.data.custom_id.clone();
                let conv = DiscordConversation::for_component(ctx.http.clone(), component);
                let event = InboundEvent::Button {
                    user: user.clone(),
                    data,
                };
                if let Err(e) = self.router.dispatch(event, &conv).await {
                    tracing::warn!(user_id = user.id, error = %e, "discord button reply failed");
                }
            }
            _ => {}
        }
    }
}

/// Connect to the Discord gateway and serve interactions until `cancel` fires.
pub async fn run_gateway(
    token: &SecretString,
    deps: &RouterDeps,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let http = Arc::new(Http::new(token.expose()));
    let messenger = Arc::new(DiscordMessenger::new(http));
    let router = Arc::new(deps.build(Platform::Discord, messenger));

    let mut client = Client::builder(token.expose(), GatewayIntents::GUILDS)
        .event_handler(Handler { router })
        .await?;

    let shards = client.shard_manager.clone();
    tokio::spawn(async move {
        cancel.cancelled().await;
        shards.shutdown_all().await;
    });

    client.start().await?;
    tracing::info!("discord client stopped");
    Ok(())
}
