//! Tankard backend server.

mod config;
mod poller;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tankard_core::naming::AliasNameResolver;
use tankard_core::progression::StaticProgression;
use tankard_core::{
    EventBus, FileDeadLetter, GambleService, GambleStore, LootboxOpener, NameResolver,
    OsRandomSource, ResilientPublisher, StatsRecorder, StatsStore, XpAwarder,
};
use tankard_db::{create_pool, DbConfig, PgStore};
use tankard_loot::{LootGenerator, LootTablesConfig};

use config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("configs/server.toml"));
    let config = ServerConfig::from_file(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.runtime.log_level.clone())),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting tankard server");

    let pool = create_pool(&DbConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        ..Default::default()
    })
    .await
    .context("database pool")?;
    let pg = Arc::new(PgStore::new(pool));
    let store: Arc<dyn GambleStore> = pg.clone();
    let stats: Arc<dyn StatsStore> = pg.clone();

    // The loot runtime is built once from the catalog and read-only after.
    let catalog = store.get_all_items().await.context("item catalog")?;
    let loot_config =
        LootTablesConfig::from_file(&config.loot.config_path).context("loot tables")?;
    let progression = Arc::new(StaticProgression::new(config.progression.clone()));
    let generator: Arc<dyn LootboxOpener> = Arc::new(
        LootGenerator::new(
            &loot_config,
            &catalog,
            Arc::new(OsRandomSource),
            progression.clone(),
        )
        .context("loot runtime")?,
    );

    let resolver: Arc<dyn NameResolver> = match &config.loot.aliases_path {
        Some(path) => Arc::new(AliasNameResolver::from_file(path).context("alias table")?),
        None => Arc::new(AliasNameResolver::empty()),
    };

    if let Some(dir) = config.runtime.dead_letter_path.parent() {
        tokio::fs::create_dir_all(dir).await.ok();
    }
    let bus = EventBus::new();
    let publisher = Arc::new(ResilientPublisher::new(
        bus.clone(),
        Arc::new(FileDeadLetter::new(&config.runtime.dead_letter_path)),
    ));
    StatsRecorder::subscribe_all(stats, &bus).await;

    let jobs = Arc::new(tankard_core::jobs::LevelingJobService::new(publisher.clone()));
    let xp = Arc::new(XpAwarder::new(jobs));

    let service = Arc::new(GambleService::new(
        store.clone(),
        generator,
        resolver,
        progression,
        bus.clone(),
        publisher.clone(),
        xp.clone(),
        Arc::new(OsRandomSource),
        config.engine.clone(),
    ));

    let shutdown = CancellationToken::new();
    let poller = poller::DeadlinePoller::new(
        store,
        service,
        Duration::from_secs(config.runtime.poll_interval_secs),
        config.engine.execution_grace(),
        shutdown.clone(),
    );
    let poller_handle = tokio::spawn(poller.run());

    tracing::info!("tankard server running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("signal handler")?;
    tracing::info!("shutting down");

    shutdown.cancel();
    poller_handle.await.ok();

    let grace = Duration::from_secs(config.runtime.shutdown_grace_secs);
    if let Err(e) = xp.shutdown(grace).await {
        tracing::warn!(error = %e, "xp awards did not settle before the deadline");
    }
    if let Err(e) = publisher.shutdown(grace).await {
        tracing::warn!(error = %e, "event publishes did not settle before the deadline");
    }
    if let Err(e) = bus.shutdown(grace).await {
        tracing::warn!(error = %e, "event handlers did not settle before the deadline");
    }

    tracing::info!("goodbye");
    Ok(())
}
