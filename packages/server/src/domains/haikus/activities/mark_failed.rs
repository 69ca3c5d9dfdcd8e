use tracing::warn;

use crate::common::HaikuId;
use crate::domains::haikus::error::HaikuError;
use crate::domains::haikus::models::{CasOutcome, Haiku, HaikuChange, HaikuState};
use crate::kernel::ServerDeps;

/// Force a haiku into `Failed` under the row lock.
///
/// Already `Failed` is a no-op success. `Done` is left alone and reported as
/// a conflict.
pub async fn mark_failed(id: HaikuId, deps: &ServerDeps) -> Result<Haiku, HaikuError> {
    let outcome = deps
        .store
        .compare_and_set(
            id,
            &HaikuState::NON_TERMINAL,
            HaikuChange::to(HaikuState::Failed),
        )
        .await?;

    match outcome {
        CasOutcome::Committed(haiku) => {
            warn!(haiku_id = %id, post_id = %haiku.post_id, "Haiku marked failed");
            Ok(haiku)
        }
        CasOutcome::Conflict(haiku) if haiku.state == HaikuState::Failed => Ok(haiku),
        CasOutcome::Conflict(haiku) => Err(HaikuError::StateConflict {
            id,
            expected: HaikuState::NON_TERMINAL.to_vec(),
            actual: haiku.state,
        }),
        CasOutcome::NotFound => Err(HaikuError::NotFound(id)),
    }
}
