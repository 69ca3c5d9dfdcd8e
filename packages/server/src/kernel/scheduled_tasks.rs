//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! One job per pipeline step, each on its own cron expression:
//!
//! ```text
//! fetch        ─► fetch_and_save()                 posts table
//! create       ─► create_from_unprocessed_post()   Created
//! summary      ─► advance_summary()                SummaryGot
//! haiku_text   ─► advance_haiku_text()             HaikuTextGot
//! posting      ─► advance_posting()                Done
//! stale_leases ─► fail_stale_leases()              Failed
//! ```
//!
//! Invocations may overlap; every step is safe to run concurrently with
//! itself. Jobs log their outcome and never propagate errors.

use anyhow::{Context, Result};
use std::future::Future;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::ScheduleConfig;
use crate::domains::haikus::{
    advance_haiku_text, advance_posting, advance_summary, create_from_unprocessed_post,
    fail_stale_leases, log_step_outcome,
};
use crate::domains::posts::{fetch_and_save, IngestError};
use crate::kernel::ServerDeps;

/// Start all scheduled tasks
pub async fn start_scheduler(
    deps: ServerDeps,
    schedule: &ScheduleConfig,
    cancel: CancellationToken,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    scheduler
        .add(step_job("fetch", &schedule.fetch, &deps, &cancel, |deps, cancel| async move {
            match fetch_and_save(&deps, &cancel).await {
                Ok(outcome) => tracing::info!(?outcome, "Fetch task finished"),
                Err(IngestError::Cancelled) => tracing::info!("Fetch task cancelled"),
                Err(e @ IngestError::Fetch(_)) => tracing::warn!(error = %e, "Fetch task failed"),
                Err(e) => tracing::error!(error = %e, "Fetch task failed"),
            }
        })?)
        .await?;

    scheduler
        .add(step_job("create", &schedule.create, &deps, &cancel, |deps, cancel| async move {
            let result = create_from_unprocessed_post(&deps, &cancel).await;
            log_step_outcome("create", &result);
        })?)
        .await?;

    scheduler
        .add(step_job("summary", &schedule.summary, &deps, &cancel, |deps, cancel| async move {
            let result = advance_summary(&deps, &cancel).await;
            log_step_outcome("summary", &result);
        })?)
        .await?;

    scheduler
        .add(step_job("haiku_text", &schedule.haiku_text, &deps, &cancel, |deps, cancel| async move {
            let result = advance_haiku_text(&deps, &cancel).await;
            log_step_outcome("haiku_text", &result);
        })?)
        .await?;

    scheduler
        .add(step_job("posting", &schedule.posting, &deps, &cancel, |deps, cancel| async move {
            let result = advance_posting(&deps, &cancel).await;
            log_step_outcome("posting", &result);
        })?)
        .await?;

    match deps.settings.lease_timeout {
        Some(timeout) => {
            scheduler
                .add(step_job(
                    "stale_leases",
                    &schedule.stale_leases,
                    &deps,
                    &cancel,
                    move |deps, cancel| async move {
                        match fail_stale_leases(timeout, &deps, &cancel).await {
                            Ok(failed) if failed.is_empty() => tracing::debug!("No stale leases"),
                            Ok(failed) => tracing::warn!(count = failed.len(), "Failed stale leases"),
                            Err(e) if e.is_benign() => tracing::info!(error = %e, "Stale lease sweep stopped"),
                            Err(e) => tracing::error!(error = %e, "Stale lease sweep failed"),
                        }
                    },
                )?)
                .await?;
        }
        None => tracing::info!("Stale lease sweep disabled"),
    }

    scheduler.start().await?;

    tracing::info!(
        fetch = %schedule.fetch,
        create = %schedule.create,
        summary = %schedule.summary,
        haiku_text = %schedule.haiku_text,
        posting = %schedule.posting,
        "Scheduled tasks started"
    );
    Ok(scheduler)
}

/// Wrap a step in a cron job that hands it its own copy of the deps.
/// Ticks that fire after shutdown began are skipped.
fn step_job<F, Fut>(
    name: &'static str,
    cron: &str,
    deps: &ServerDeps,
    cancel: &CancellationToken,
    run: F,
) -> Result<Job>
where
    F: Fn(ServerDeps, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let deps = deps.clone();
    let cancel = cancel.clone();

    Job::new_async(cron, move |_uuid, _lock| {
        let deps = deps.clone();
        let cancel = cancel.clone();
        let task = (!cancel.is_cancelled()).then(|| run(deps, cancel));
        Box::pin(async move {
            match task {
                Some(task) => {
                    tracing::debug!(task = name, "Running scheduled task");
                    task.await;
                }
                None => tracing::debug!(task = name, "Shutting down, task skipped"),
            }
        })
    })
    .with_context(|| format!("invalid cron expression for {} task: {:?}", name, cron))
}
