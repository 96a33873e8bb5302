// addgif.rs - /addgif Slash Command Module
// Discord side of the add-GIF workflow: guild command registration, option parsing,
// and the reply adapter that turns workflow messages into interaction responses
// and channel messages.
//
// Key Features:
// - Registers `addgif(name, url)` on the configured guild only
// - Exactly one initial interaction response per invocation; everything else goes
//   to the invoking channel, including a rejected initial response
// - Workflow services come from the client TypeMap (see main.rs)
//
// Used by: main.rs (ready + interaction_create)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serenity::{
    client::Context,
    http::Http,
    model::{
        application::{
            command::{Command, CommandOptionType},
            interaction::{application_command::ApplicationCommandInteraction, InteractionResponseType},
        },
        id::GuildId,
    },
};

use crate::workflow::{AddGifRequest, Outcome, Replies};
use crate::AddGifWorkflowKey;

pub const COMMAND_NAME: &str = "addgif";

// ============================================================================
// REPLY ADAPTER
// ============================================================================

/// The two ways a reply can reach the user
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// The interaction response; Discord accepts exactly one
    async fn respond(&self, content: &str) -> Result<(), serenity::Error>;
    /// A plain message in the invoking channel
    async fn say(&self, content: &str) -> Result<(), serenity::Error>;
}

/// Routes workflow messages for one interaction.
/// Discord needs an initial response within a few seconds; if the workflow halts
/// before acknowledging, its first follow-up is promoted to the initial response.
/// When the initial response is rejected (usually the window expired), the text
/// goes to the channel so the user still sees it.
pub struct ReplyRouter<S> {
    sink: S,
    acknowledged: AtomicBool,
}

impl<S: ReplySink> ReplyRouter<S> {
    pub fn new(sink: S) -> Self {
        ReplyRouter {
            sink,
            acknowledged: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<S: ReplySink> Replies for ReplyRouter<S> {
    async fn initial_response(&self, content: &str) -> Result<(), serenity::Error> {
        if self.acknowledged.swap(true, Ordering::SeqCst) {
            warn!("[ADDGIF] Interaction already acknowledged, sending to channel instead");
            return self.sink.say(content).await;
        }

        match self.sink.respond(content).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("⚠️ [ADDGIF] Initial response rejected ({}), sending to channel instead", e);
                self.sink.say(content).await
            }
        }
    }

    async fn follow_up(&self, content: &str) -> Result<(), serenity::Error> {
        if !self.acknowledged.load(Ordering::SeqCst) {
            return self.initial_response(content).await;
        }
        self.sink.say(content).await
    }
}

/// Serenity side of [`ReplySink`] for one slash command interaction
pub struct InteractionSink<'a> {
    http: Arc<Http>,
    command: &'a ApplicationCommandInteraction,
}

impl<'a> InteractionSink<'a> {
    pub fn new(http: Arc<Http>, command: &'a ApplicationCommandInteraction) -> Self {
        InteractionSink { http, command }
    }
}

#[async_trait]
impl<'a> ReplySink for InteractionSink<'a> {
    async fn respond(&self, content: &str) -> Result<(), serenity::Error> {
        self.command
            .create_interaction_response(&self.http, |response| {
                response
                    .kind(InteractionResponseType::ChannelMessageWithSource)
                    .interaction_response_data(|message| message.content(content))
            })
            .await
    }

    async fn say(&self, content: &str) -> Result<(), serenity::Error> {
        self.command.channel_id.say(&self.http, content).await?;
        Ok(())
    }
}

// ============================================================================
// COMMAND HANDLER
// ============================================================================

fn string_option<'a>(command: &'a ApplicationCommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_ref())
        .and_then(|value| value.as_str())
}

async fn respond_plain(ctx: &Context, command: &ApplicationCommandInteraction, text: &str) -> Result<(), serenity::Error> {
    command
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| message.content(text))
        })
        .await
}

/// Dispatch an application command interaction
pub async fn handle_slash_command(ctx: &Context, command: &ApplicationCommandInteraction) -> Result<(), serenity::Error> {
    match command.data.name.as_str() {
        COMMAND_NAME => handle_addgif(ctx, command).await,
        other => respond_plain(ctx, command, &format!("Unknown command: {}", other)).await,
    }
}

async fn handle_addgif(ctx: &Context, command: &ApplicationCommandInteraction) -> Result<(), serenity::Error> {
    let workflow = {
        let data = ctx.data.read().await;
        data.get::<AddGifWorkflowKey>().cloned()
    };

    let workflow = match workflow {
        Some(workflow) => workflow,
        None => {
            error!("❌ [ADDGIF] Workflow services missing from client data");
            return respond_plain(ctx, command, "The bot is still starting up, please try again in a moment.").await;
        }
    };

    let (raw_name, source_url) = match (string_option(command, "name"), string_option(command, "url")) {
        (Some(name), Some(url)) => (name.to_string(), url.to_string()),
        _ => {
            return respond_plain(ctx, command, "Please provide both a name and a URL! Usage: `/addgif name:<name> url:<link to gif>`").await;
        }
    };

    let request = AddGifRequest {
        raw_name,
        source_url,
        requesting_user: command.user.id,
        reply_channel: command.channel_id,
    };

    let replies = ReplyRouter::new(InteractionSink::new(ctx.http.clone(), command));
    match workflow.run(&request, &replies).await {
        Outcome::Published { url } => debug!("[ADDGIF] {} added {}", command.user.name, url),
        Outcome::Halted { after, reason } => {
            debug!("[ADDGIF] Request from {} stopped after {}: {}", command.user.name, after, reason)
        }
    }

    Ok(())
}

// ============================================================================
// SLASH COMMAND REGISTRATION
// ============================================================================

/// Register /addgif on a single guild (guild commands update immediately, unlike global ones)
pub async fn register_guild_commands(http: &Http, guild_id: GuildId) -> Result<Vec<Command>, serenity::Error> {
    let commands = guild_id
        .set_application_commands(http, |commands| {
            commands.create_application_command(|command| {
                command
                    .name(COMMAND_NAME)
                    .description("Add a gif to LedFx assets")
                    .create_option(|option| {
                        option
                            .name("name")
                            .description("Name for the GIF (spaces become underscores)")
                            .kind(CommandOptionType::String)
                            .required(true)
                    })
                    .create_option(|option| {
                        option
                            .name("url")
                            .description("Direct link to the GIF")
                            .kind(CommandOptionType::String)
                            .required(true)
                    })
            })
        })
        .await?;

    info!("✅ Registered {} slash command(s) on guild {}", commands.len(), guild_id);
    Ok(commands)
}
