use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::transition::transition;
use crate::domains::haikus::error::HaikuError;
use crate::domains::haikus::models::{Haiku, HaikuChange, HaikuState};
use crate::kernel::ServerDeps;

/// Fail haikus that have sat in a transitional state for longer than
/// `timeout`, e.g. after a crash mid-call.
///
/// Each row goes through the guarded transition from the state it was seen
/// in, so a step that commits in the meantime wins and the row is skipped.
pub async fn fail_stale_leases(
    timeout: Duration,
    deps: &ServerDeps,
    cancel: &CancellationToken,
) -> Result<Vec<Haiku>, HaikuError> {
    let now = Utc::now();
    let cutoff = chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

    let stale = deps
        .store
        .find_stale(&HaikuState::TRANSITIONAL, cutoff)
        .await?;

    let mut failed = Vec::new();
    for haiku in stale {
        if cancel.is_cancelled() {
            return Err(HaikuError::Cancelled);
        }

        match transition(deps, haiku.id, &[haiku.state], HaikuChange::to(HaikuState::Failed)).await {
            Ok(updated) => {
                warn!(
                    haiku_id = %haiku.id,
                    post_id = %haiku.post_id,
                    state = %haiku.state,
                    updated_at = %haiku.updated_at,
                    "Stale lease failed"
                );
                failed.push(updated);
            }
            Err(e @ (HaikuError::StateConflict { .. } | HaikuError::NotFound(_))) => {
                debug!(haiku_id = %haiku.id, error = %e, "Stale lease moved on");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(failed)
}
