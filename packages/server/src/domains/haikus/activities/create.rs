use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::StepOutcome;
use crate::domains::haikus::error::HaikuError;
use crate::kernel::ServerDeps;

/// Start a haiku for the oldest post that has none.
///
/// Two concurrent runs may pick the same post; the loser's insert fails on
/// the one-haiku-per-post constraint and surfaces as `Persistence`.
pub async fn create_from_unprocessed_post(
    deps: &ServerDeps,
    cancel: &CancellationToken,
) -> Result<StepOutcome, HaikuError> {
    if cancel.is_cancelled() {
        return Err(HaikuError::Cancelled);
    }

    let Some(post) = deps.store.find_oldest_unprocessed_post().await? else {
        debug!("No unprocessed posts");
        return Ok(StepOutcome::Idle);
    };

    let haiku = deps.store.insert_haiku(&post.id).await?;
    info!(haiku_id = %haiku.id, post_id = %post.id, "Haiku created");

    Ok(StepOutcome::Advanced(haiku))
}
