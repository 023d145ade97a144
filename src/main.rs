use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, bail, eyre};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tdmedia::application::SessionContext;
use tdmedia::domain::entities::{Chat, ChatId, MessageId};
use tdmedia::infrastructure::{
    AppConfig, CliArgs, Fixture, InMemoryEngine, StorageManager, Walk,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

async fn replay(args: &CliArgs, config: &AppConfig) -> Result<()> {
    let fixture = Fixture::load(&args.fixture).await?;
    let engine = Arc::new(InMemoryEngine::new(fixture));
    let session = Arc::new(SessionContext::new(
        engine.clone(),
        config.to_session_config(),
    ));

    let pump = tokio::spawn({
        let session = session.clone();
        let events = engine.subscribe();
        async move { session.pump_events(events).await }
    });
    engine.announce_chats();

    let chat_id = args
        .chat
        .map(ChatId)
        .or_else(|| engine.chats().first().map(Chat::id))
        .ok_or_else(|| eyre!("fixture has no chats"))?;
    let anchor = args
        .anchor
        .map(MessageId)
        .or_else(|| engine.newest_media(chat_id))
        .ok_or_else(|| eyre!("chat {chat_id} has no photos or videos"))?;

    let media = session.media_count(chat_id).await;
    info!(chat_id = %chat_id, anchor = %anchor, media, "Opening media viewer");
    if !session.open_viewer(chat_id, anchor).await {
        bail!("could not open message {anchor} of chat {chat_id}");
    }
    println!("opened message {anchor} of chat {chat_id} ({media} photos and videos)");

    for step in 1..=args.steps {
        let moved = match args.walk {
            Walk::Newer => session.viewer_next().await,
            Walk::Older => session.viewer_previous().await,
        };
        let Some(message_id) = moved else {
            println!("step {step}: end of history");
            break;
        };
        println!("step {step}: message {message_id}");
    }

    let stats = session.files().stats();
    info!(%stats, "Replay finished");
    println!("cache: {stats}");

    session.close_viewer();
    pump.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = tdmedia::VERSION, "Starting {}", tdmedia::NAME);

    replay(&args, &config).await
}
