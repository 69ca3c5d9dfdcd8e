//! Haikus domain activities - entry-point business logic
//!
//! One function per scheduled step, plus the manual recovery operations
//! exposed through `haiku_admin`.

pub mod advance;
pub mod create;
pub mod fail_stale_leases;
pub mod mark_failed;
pub mod run_pipeline_once;
mod transition;

pub use advance::{advance_haiku_text, advance_posting, advance_summary};
pub use create::create_from_unprocessed_post;
pub use fail_stale_leases::fail_stale_leases;
pub use mark_failed::mark_failed;
pub use run_pipeline_once::{run_pipeline_once, PipelineReport};

use tracing::{debug, error, info, warn};

use super::error::HaikuError;
use super::models::Haiku;

/// What a step did when it found no reason to fail.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Nothing was eligible.
    Idle,
    /// A haiku moved forward (or was created) and this is its new row.
    Advanced(Haiku),
}

/// Log a step result at the level its kind deserves.
pub fn log_step_outcome(step: &str, result: &Result<StepOutcome, HaikuError>) {
    match result {
        Ok(StepOutcome::Idle) => debug!(step, "Step idle"),
        Ok(StepOutcome::Advanced(haiku)) => {
            info!(step, haiku_id = %haiku.id, state = %haiku.state, "Step advanced haiku")
        }
        Err(e @ HaikuError::StateConflict { .. }) => debug!(step, error = %e, "Lost race"),
        Err(HaikuError::Cancelled) => info!(step, "Step cancelled"),
        Err(e @ HaikuError::ExternalApi { .. }) => warn!(step, error = %e, "Step failed haiku"),
        Err(e @ HaikuError::LeaseLost { .. }) => {
            error!(step, error = %e, "Step lost its lease mid-call")
        }
        Err(e) => error!(step, error = %e, "Step failed"),
    }
}
