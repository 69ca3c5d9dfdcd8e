//! Guarded transition: the check-and-set every state change goes through.

use crate::common::HaikuId;
use crate::domains::haikus::error::HaikuError;
use crate::domains::haikus::models::{CasOutcome, Haiku, HaikuChange, HaikuState};
use crate::kernel::ServerDeps;

/// Move `id` to `change.state` if, under the row lock, it is currently in one
/// of `expected`. Otherwise nothing is written and the caller gets
/// `StateConflict`.
pub(crate) async fn transition(
    deps: &ServerDeps,
    id: HaikuId,
    expected: &[HaikuState],
    change: HaikuChange,
) -> Result<Haiku, HaikuError> {
    debug_assert!(
        expected.iter().all(|from| from.can_transition_to(change.state)),
        "illegal transition {:?} -> {}",
        expected,
        change.state
    );

    match deps.store.compare_and_set(id, expected, change).await? {
        CasOutcome::Committed(haiku) => {
            tracing::debug!(haiku_id = %id, state = %haiku.state, "Haiku transitioned");
            Ok(haiku)
        }
        CasOutcome::Conflict(current) => Err(HaikuError::StateConflict {
            id,
            expected: expected.to_vec(),
            actual: current.state,
        }),
        CasOutcome::NotFound => Err(HaikuError::NotFound(id)),
    }
}
