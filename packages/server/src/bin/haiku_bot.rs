//! Haiku Bot
//!
//! Runs every pipeline step on its cron schedule until Ctrl-C.

use anyhow::{Context, Result};
use haiku_core::kernel::scheduled_tasks::start_scheduler;
use haiku_core::kernel::{PostgresStore, ServerDeps};
use haiku_core::Config;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,haiku_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting Haiku Bot");

    let config = Config::from_env()?;

    // Database setup
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    PostgresStore::new(pool.clone())
        .migrate()
        .await
        .context("Failed to run migrations")?;

    let deps = ServerDeps::from_config(&config, pool)?;
    tracing::info!(
        platform = ?config.social_platform,
        query = %config.twitter_search_query,
        fetch_limit = config.pipeline.fetch_limit,
        monthly_fetch_limit = config.pipeline.monthly_fetch_limit,
        "Dependencies ready"
    );

    let cancel = CancellationToken::new();
    let mut scheduler = start_scheduler(deps, &config.schedule, cancel.clone()).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");

    cancel.cancel();
    scheduler
        .shutdown()
        .await
        .context("Failed to stop scheduler")?;

    tracing::info!("Haiku Bot stopped");
    Ok(())
}
