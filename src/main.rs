mod agent;
mod auth;
mod config;
mod decision;
mod error;
mod google;
mod handlers;
mod llm;
mod registry;
mod session;
mod tools;

use anyhow::Result;
use config::Config;
use handlers::{
    brief_handler, code_handler, connect_handler, disconnect_handler, help_handler,
    start_handler, status_handler, text_handler,
};
use session::SessionStore;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::Me;
use teloxide::utils::command::BotCommands;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Load configuration
    let config = Config::from_file("config.toml")?;

    // Initialize logging, config level unless RUST_LOG is set
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", &config.logging.level);
    }
    pretty_env_logger::init();
    log::info!("Starting Morning Brief Bot...");

    config.validate()?;
    log::info!(
        "Configuration loaded successfully (decision process: {:?})",
        config.ai_model.provider
    );

    // Create bot instance
    let bot = Bot::new(&config.telegram.bot_token);
    log::info!("Bot instance created");

    // Get bot info
    let me = bot.get_me().await?;
    log::info!("Bot started as @{}", me.username());

    bot.set_my_commands(Command::bot_commands()).await?;

    // Print startup info
    println!("☀️ Morning Brief Bot is running!");
    println!("   Username: @{}", me.username());
    println!("   Press Ctrl+C to stop");

    let handler = dptree::entry()
        // Handle commands
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(command_handler),
        )
        // Handle all other messages
        .branch(Update::filter_message().endpoint(text_handler));

    // Start the dispatcher
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![Arc::new(config), SessionStore::new()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Bot stopped");
    Ok(())
}

/// Command enumeration
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
enum Command {
    #[command(description = "Start the assistant")]
    Start,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Show connection status")]
    Status,
    #[command(description = "Connect your Google account")]
    Connect,
    #[command(description = "Finish connecting: paste the code or redirect address")]
    Code(String),
    #[command(description = "Generate today's brief")]
    Brief,
    #[command(description = "Disconnect your Google account")]
    Disconnect,
}

/// Command handler that routes to specific command functions
async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    me: Me,
    config: Arc<Config>,
    sessions: SessionStore,
) -> ResponseResult<()> {
    match cmd {
        Command::Start => start_handler(bot, msg, me).await,
        Command::Help => help_handler(bot, msg).await,
        Command::Status => status_handler(bot, msg, config, sessions).await,
        Command::Connect => connect_handler(bot, msg, config, sessions).await,
        Command::Code(input) => code_handler(bot, msg, input, config, sessions).await,
        Command::Brief => brief_handler(bot, msg, config, sessions).await,
        Command::Disconnect => disconnect_handler(bot, msg, sessions).await,
    }
}
