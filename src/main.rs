mod assets;
mod commands;
mod config;
mod fetch;
mod sftp;
mod workflow;

use std::sync::Arc;

use serenity::{
    async_trait,
    client::{Client, Context, EventHandler},
    model::{application::interaction::Interaction, gateway::Ready, id::GuildId},
    prelude::{GatewayIntents, TypeMapKey},
};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;

use crate::config::BotConfig;
use crate::fetch::ReqwestHttp;
use crate::sftp::SftpPublisher;
use crate::workflow::AddGifWorkflow;

// TypeMap key for the shared /addgif services (HTTP client, SFTP publisher, asset host)
pub struct AddGifWorkflowKey;
impl TypeMapKey for AddGifWorkflowKey {
    type Value = Arc<AddGifWorkflow>;
}

// Event handler implementation
struct Handler {
    guild_id: GuildId,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        println!("✅ Bot connected as {}!", ready.user.name);
        log::info!("Connected to {} guild(s)", ready.guilds.len());

        // Guild-scoped so the command shows up immediately on the LedFx server
        if let Err(e) = commands::addgif::register_guild_commands(&ctx.http, self.guild_id).await {
            log::error!("❌ Failed to register slash commands on guild {}: {:?}", self.guild_id, e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::ApplicationCommand(command) = interaction {
            if let Err(e) = commands::addgif::handle_slash_command(&ctx, &command).await {
                log::error!(
                    "❌ Slash command '{}' failed for user {} ({}): {:?}",
                    command.data.name, command.user.name, command.user.id, e
                );
            }
        }
    }
}

// Operator console on stdin: quit / help / status
async fn handle_command_line(shutdown_tx: mpsc::Sender<String>) {
    println!("📝 Command line interface active. Type 'help' for available commands.");

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin).lines();

    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                let command = line.trim().to_lowercase();

                match command.as_str() {
                    "quit" | "q" | "exit" => {
                        println!("⏹️  Shutting down bot...");
                        if shutdown_tx.send("quit".to_string()).await.is_err() {
                            eprintln!("❌ Failed to send shutdown signal");
                        }
                        break;
                    }
                    "help" | "h" => {
                        println!("🤖 Available commands:");
                        println!("  quit, q, exit  - Stop the bot gracefully");
                        println!("  help, h        - Show this help message");
                        println!("  status         - Show bot status");
                    }
                    "status" => {
                        println!("🤖 Bot Status: Running");
                        println!("📡 Discord connection: Active");
                        println!("💬 Command interface: Active");
                    }
                    "" => {}
                    _ => {
                        println!("❓ Unknown command: '{}'. Type 'help' for available commands.", command);
                    }
                }
            }
            // EOF (e.g. running under a service manager without a tty)
            Ok(None) => break,
            Err(e) => {
                eprintln!("❌ Error reading command line: {}", e);
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logger - must be done before any logging calls
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    log::info!("🚀 gifbot starting up...");

    config::load_bot_config();
    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            log::error!("❌ Invalid configuration: {}", error);
            eprintln!("❌ Invalid configuration: {}", error);
            eprintln!("Set DISCORD_TOKEN, LEDFX_SERVER_GUILD, SFTP_HOST, SFTP_USERNAME, SFTP_PASSWORD, SFTP_PATH and ASSETS_BASE_URL in the environment or in botconfig.txt");
            std::process::exit(1);
        }
    };

    let http = match ReqwestHttp::new(config.http_timeout) {
        Ok(http) => http,
        Err(e) => {
            log::error!("❌ Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };
    let publisher = SftpPublisher::new(config.sftp.clone());
    let workflow = AddGifWorkflow::new(Arc::new(http), Arc::new(publisher), config.assets_base_url.clone());

    // Slash commands only; no message content needed
    let intents = GatewayIntents::non_privileged();

    let mut client = match Client::builder(&config.discord_token, intents)
        .event_handler(Handler { guild_id: config.guild_id })
        .await
    {
        Ok(client) => client,
        Err(e) => {
            log::error!("❌ Error creating Discord client: {:?}", e);
            eprintln!("Check DISCORD_TOKEN in your environment or botconfig.txt");
            std::process::exit(1);
        }
    };

    {
        let mut data = client.data.write().await;
        data.insert::<AddGifWorkflowKey>(Arc::new(workflow));
    }

    // Set up command line interface for graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<String>(1);
    let cmd_task = tokio::spawn(async move {
        handle_command_line(shutdown_tx).await;
    });

    println!("🚀 Bot is running...");
    println!("💡 Use 'quit' command to stop gracefully, or press Ctrl+C");
    tokio::select! {
        _ = signal::ctrl_c() => {
            println!("\n⏹️ Stopping bot gracefully...");
        }
        Some(signal) = shutdown_rx.recv() => {
            println!("📡 Received '{}' command, stopping bot gracefully...", signal);
        }
        result = client.start() => {
            if let Err(why) = result {
                log::error!("❌ Client error: {:?}", why);
            }
        }
    }

    client.shard_manager.lock().await.shutdown_all().await;
    cmd_task.abort();

    println!("✅ Bot stopped");
}
