use thiserror::Error;

use crate::common::HaikuId;
use crate::domains::haikus::models::HaikuState;
use crate::kernel::stores::StoreError;
use crate::kernel::CallError;

/// Failure of a state machine step.
///
/// "No work" is not an error; see [`StepOutcome::Idle`](super::StepOutcome::Idle).
#[derive(Debug, Error)]
pub enum HaikuError {
    /// Another invocation moved the row first. Benign, retry next tick.
    #[error("haiku {id} is {actual}, expected one of {expected:?}")]
    StateConflict {
        id: HaikuId,
        expected: Vec<HaikuState>,
        actual: HaikuState,
    },

    /// The external call failed; the haiku has been forced to `failed`.
    #[error("external call failed for haiku {id}: {source}")]
    ExternalApi {
        id: HaikuId,
        #[source]
        source: CallError,
    },

    /// The external call succeeded but the row had already left the leased
    /// state, usually failed by the stale-lease sweep. The side effect
    /// happened and is not recorded.
    #[error("haiku {id} left {leased} during its external call and is now {actual}")]
    LeaseLost {
        id: HaikuId,
        leased: HaikuState,
        actual: HaikuState,
    },

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("step cancelled")]
    Cancelled,

    #[error("haiku {0} not found")]
    NotFound(HaikuId),
}

impl HaikuError {
    /// Lost races and cancellations need no attention.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::StateConflict { .. } | Self::Cancelled)
    }
}
