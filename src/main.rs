use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use car_scout::access::AccessList;
use car_scout::catalog::EncarClient;
use car_scout::config::Settings;
use car_scout::service::ScoutService;
use car_scout::store::{JsonFileStore, SavedSearchStore};
use car_scout::telegram::{Bot, TelegramApi};
use car_scout::watch::WatchEngine;
use car_scout::wizard::Wizard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚗 Car Scout - Encar listing watcher");

    let settings = Settings::from_env()?;

    let encar = Arc::new(EncarClient::new(settings.marketplace.clone())?);
    let telegram = Arc::new(TelegramApi::new(
        &settings.bot_token,
        settings.marketplace.request_timeout,
    )?);

    let engine = Arc::new(WatchEngine::new(
        encar.clone(),
        telegram.clone(),
        settings.watch.clone(),
    ));

    let access = AccessList::load(&settings.access_file, settings.manager_id).await;
    if access.is_empty() && settings.manager_id.is_none() {
        warn!("Access list is empty and no manager is set; nobody can use the bot");
    }

    let store = SavedSearchStore::new(Arc::new(JsonFileStore::new(settings.requests_file.clone())));
    let count = store
        .migrate()
        .await
        .with_context(|| format!("Failed to load {}", settings.requests_file.display()))?;
    info!(count, path = %settings.requests_file.display(), "Saved searches loaded");

    let service = Arc::new(ScoutService::new(
        Arc::new(access),
        Wizard::new(encar),
        store,
        engine.clone(),
    ));

    if settings.rearm_on_start {
        service.rearm_all().await?;
    }
    let janitor = engine.spawn_janitor();

    let shutdown = CancellationToken::new();
    let bot = Bot::new(telegram, service);
    let polling = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { bot.run(shutdown).await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down...");

    shutdown.cancel();
    if let Err(e) = polling.await {
        warn!(error = %e, "Bot task ended abnormally");
    }
    engine.shutdown().await;
    let _ = janitor.await;

    info!("✅ Stopped");
    Ok(())
}
