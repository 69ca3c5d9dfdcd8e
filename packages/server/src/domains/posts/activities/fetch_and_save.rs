//! Pull recent posts from the social platform into the store.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domains::posts::error::IngestError;
use crate::domains::posts::models::FetchQuota;
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// This month's fetch budget is spent; nothing was requested.
    QuotaExhausted,
    Saved { fetched: usize, inserted: u64 },
}

/// Claim one unit of the monthly quota, fetch up to `fetch_limit` posts and
/// save the new ones. Posts already stored are skipped.
///
/// The quota unit is spent even if the fetch then fails.
pub async fn fetch_and_save(
    deps: &ServerDeps,
    cancel: &CancellationToken,
) -> Result<FetchOutcome, IngestError> {
    if cancel.is_cancelled() {
        return Err(IngestError::Cancelled);
    }

    let period = FetchQuota::period_for(Utc::now());
    let limit = deps.settings.monthly_fetch_limit;
    if !deps.store.claim_fetch_quota(&period, limit).await? {
        info!(period, limit, "Monthly fetch quota exhausted");
        return Ok(FetchOutcome::QuotaExhausted);
    }

    let posts = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(IngestError::Cancelled),
        fetched = deps.social_platform.fetch_posts(deps.settings.fetch_limit) => fetched?,
    };

    if posts.is_empty() {
        info!("No posts fetched");
        return Ok(FetchOutcome::Saved {
            fetched: 0,
            inserted: 0,
        });
    }

    let inserted = deps.store.save_posts(&posts).await?;
    info!(
        fetched = posts.len(),
        inserted,
        skipped = posts.len() as u64 - inserted,
        "Saved fetched posts"
    );

    Ok(FetchOutcome::Saved {
        fetched: posts.len(),
        inserted,
    })
}
