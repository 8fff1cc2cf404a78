use dotenvy::dotenv;
use push_helper::bot::commands::Command;
use push_helper::bot::{callbacks, commands, BotContext};
use push_helper::config::{Catalog, Settings};
use push_helper::dispatch::DispatchEngine;
use push_helper::gateway::TelegramGateway;
use push_helper::prompt::PendingPrompts;
use push_helper::providers;
use push_helper::queue::PushQueue;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    init_logging();

    info!("Starting push helper bot...");

    let settings = init_settings();

    let bot = Bot::new(settings.telegram_token.clone());
    let gateway = Arc::new(TelegramGateway::new(bot.clone()));

    let http = reqwest::Client::new();
    let catalog = Arc::new(Catalog::from_settings(&settings));
    let queue = Arc::new(PushQueue::new());
    let prompts = Arc::new(PendingPrompts::new());
    let engine = Arc::new(DispatchEngine::new(
        gateway.clone(),
        catalog.clone(),
        providers::default_providers(http),
    ));

    let ctx = Arc::new(BotContext {
        gateway,
        queue,
        prompts,
        catalog,
        engine,
    });

    info!(
        tags = ctx.catalog.tags.len(),
        targets = ctx.catalog.targets.len(),
        "Catalogs loaded."
    );

    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx, settings])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(on_callback))
        .branch(
            Update::filter_message()
                .filter(|msg: Message, settings: Arc<Settings>| settings.is_watcher(&msg.chat))
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(on_command),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.reply_to_message().is_some())
                        .endpoint(on_reply),
                )
                .branch(
                    dptree::filter(|msg: Message| {
                        msg.text().is_some() || msg.caption().is_some()
                    })
                    .endpoint(on_new_message),
                ),
        )
}

async fn on_callback(
    q: CallbackQuery,
    ctx: Arc<BotContext>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = callbacks::handle_callback(q, ctx).await {
        error!("Callback handler error: {}", e);
    }
    respond(())
}

async fn on_command(
    msg: Message,
    cmd: Command,
    ctx: Arc<BotContext>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = commands::handle_command(msg, cmd, ctx).await {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn on_reply(msg: Message, ctx: Arc<BotContext>) -> Result<(), teloxide::RequestError> {
    // Only meaningful when it answers an open custom-tag prompt;
    // anything else is a plain conversation reply and is ignored.
    callbacks::handle_prompt_reply(&ctx, &msg).await;
    respond(())
}

async fn on_new_message(msg: Message, ctx: Arc<BotContext>) -> Result<(), teloxide::RequestError> {
    if let Err(e) = commands::handle_message(msg, ctx).await {
        error!("Message handler error: {}", e);
    }
    respond(())
}
