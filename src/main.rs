//! # Postcast — Multi-Channel Post Scheduler
//!
//! Schedules posts through a Telegram operator chat and fans them out to a
//! set of destination channels at the planned times.
//!
//! Usage:
//!   postcast                          # Run with ~/.postcast/config.toml
//!   postcast --config ./postcast.toml # Explicit config file
//!   postcast --db ./posts.db          # Explicit database path

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use postcast_core::config::PostcastConfig;
use postcast_scheduler::{Dispatcher, PostStore, SchedulerService, poller};
use postcast_telegram::{TelegramClient, TelegramSender, UpdatePoller};

mod router;

#[derive(Parser)]
#[command(name = "postcast", version, about = "📮 Postcast — multi-channel post scheduler")]
struct Cli {
    /// Config file path (default: ~/.postcast/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path (default: ~/.postcast/posts.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "postcast=debug,postcast_scheduler=debug,postcast_telegram=debug"
    } else {
        "postcast=info,postcast_scheduler=info,postcast_telegram=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => PostcastConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PostcastConfig::load().context("loading config")?,
    };
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;

    let db_path = cli.db.unwrap_or_else(PostcastConfig::default_db_path);
    let store = Arc::new(PostStore::open(&db_path).map_err(|e| anyhow::anyhow!("{e}"))?);

    // Seed destinations from the environment (comma-separated chat ids).
    if let Ok(ids) = std::env::var("POSTCAST_CHANNEL_IDS") {
        for id in ids.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            store
                .add_or_reactivate(id, None)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            tracing::info!("📡 seeded destination {id}");
        }
    }

    let client = TelegramClient::new(
        &config.bot_token,
        Duration::from_secs(config.delivery.send_timeout_secs),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let me = client.get_me().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let admin_id = config.admin_id;
    let delivery = config.delivery.clone();
    let service = Arc::new(
        SchedulerService::new(store.clone(), config).map_err(|e| anyhow::anyhow!("{e}"))?,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(TelegramSender::new(client.clone())),
        store.clone(),
        delivery,
    ));

    println!("📮 Postcast v{}", env!("CARGO_PKG_VERSION"));
    println!("   🤖 Bot:       @{}", me.username.as_deref().unwrap_or("unknown"));
    println!("   🗄️  Database:  {}", db_path.display());
    println!(
        "   📡 Destinations: {} active",
        store.active_destination_count().map_err(|e| anyhow::anyhow!("{e}"))?
    );
    println!();

    let poll_task = poller::spawn(service.clone(), dispatcher);

    let router = router::Router::new(service, admin_id);
    let mut updates = UpdatePoller::new(client.clone());
    tracing::info!("🚀 operator loop started");

    loop {
        match updates.get_updates().await {
            Ok(batch) => {
                for update in batch {
                    let Some(event) = update.to_event() else { continue };
                    let chat_id = event.chat_id;
                    if let Some(reply) = router.respond(event).await
                        && let Err(e) = client.reply(chat_id, &reply).await
                    {
                        tracing::error!("reply to {chat_id} failed: {e}");
                    }
                }
            }
            Err(e) => {
                tracing::error!("update polling error: {e}");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
        if poll_task.is_finished() {
            anyhow::bail!("scheduler poll loop exited unexpectedly");
        }
    }
}
