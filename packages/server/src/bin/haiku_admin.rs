//! Operator CLI for the haiku bot
//!
//! Manual recovery and one-off runs against the same database the bot uses.
//! Every command prints a single JSON object.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use haiku_core::common::HaikuId;
use haiku_core::domains::haikus::{self, Haiku, HaikuError};
use haiku_core::domains::posts::FetchQuota;
use haiku_core::kernel::{PostgresStore, ServerDeps};
use haiku_core::{minutes_to_duration, Config};
use serde::Serialize;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "haiku_admin")]
#[command(about = "Haiku bot operator commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Force a haiku into the failed state
    MarkFailed { id: String },

    /// Run every pipeline step once, in order
    RunOnce,

    /// Fail haikus stuck mid-call for longer than the lease timeout
    FailStale {
        /// Override HAIKU_LEASE_TIMEOUT_MINUTES
        #[arg(long)]
        minutes: Option<u64>,
    },

    /// Haiku counts per state and this month's fetch quota
    Status,
}

#[derive(Serialize)]
struct HaikuSummary {
    id: String,
    post_id: String,
    state: String,
    updated_at: String,
}

impl From<&Haiku> for HaikuSummary {
    fn from(haiku: &Haiku) -> Self {
        Self {
            id: haiku.id.to_string(),
            post_id: haiku.post_id.clone(),
            state: haiku.state.to_string(),
            updated_at: haiku.updated_at.to_rfc3339(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,haiku_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let output = match cli.command {
        Commands::Migrate => {
            PostgresStore::new(pool)
                .migrate()
                .await
                .context("Failed to run migrations")?;
            json!({ "success": true, "message": "migrations applied" })
        }
        Commands::MarkFailed { id } => {
            let id = HaikuId::parse(&id).with_context(|| format!("invalid haiku id {:?}", id))?;
            let deps = ServerDeps::from_config(&config, pool)?;

            match haikus::mark_failed(id, &deps).await {
                Ok(haiku) => json!({ "success": true, "haiku": HaikuSummary::from(&haiku) }),
                Err(e @ (HaikuError::StateConflict { .. } | HaikuError::NotFound(_))) => {
                    json!({ "success": false, "message": e.to_string() })
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::RunOnce => {
            let deps = ServerDeps::from_config(&config, pool)?;
            let report = haikus::run_pipeline_once(&deps, &CancellationToken::new()).await?;

            json!({
                "success": report.failures.is_empty(),
                "fetch": report.fetch.map(|outcome| format!("{:?}", outcome)),
                "advanced": report
                    .advanced
                    .iter()
                    .map(|(step, state)| json!({ "step": step, "state": state }))
                    .collect::<Vec<_>>(),
                "failures": report
                    .failures
                    .iter()
                    .map(|(step, error)| json!({ "step": step, "error": error }))
                    .collect::<Vec<_>>(),
            })
        }
        Commands::FailStale { minutes } => {
            let timeout = match minutes {
                Some(minutes) => minutes_to_duration(minutes).context("--minutes is invalid")?,
                None => config
                    .pipeline
                    .lease_timeout
                    .context("lease timeout disabled; pass --minutes")?,
            };
            let deps = ServerDeps::from_config(&config, pool)?;
            let failed = haikus::fail_stale_leases(timeout, &deps, &CancellationToken::new()).await?;

            json!({
                "success": true,
                "count": failed.len(),
                "haikus": failed.iter().map(HaikuSummary::from).collect::<Vec<_>>(),
            })
        }
        Commands::Status => status(&pool, config.pipeline.monthly_fetch_limit).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn status(pool: &PgPool, monthly_fetch_limit: u32) -> Result<serde_json::Value> {
    let counts = Haiku::count_by_state(pool).await?;
    let period = FetchQuota::period_for(Utc::now());
    let used = FetchQuota::find(&period, pool)
        .await?
        .map(|quota| quota.used)
        .unwrap_or(0);

    Ok(json!({
        "success": true,
        "haikus": counts
            .into_iter()
            .map(|(state, count)| (state.to_string(), json!(count)))
            .collect::<serde_json::Map<_, _>>(),
        "fetch_quota": {
            "period": period,
            "used": used,
            "limit": monthly_fetch_limit,
        },
    }))
}
