use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    advance_haiku_text, advance_posting, advance_summary, create_from_unprocessed_post,
    log_step_outcome, StepOutcome,
};
use crate::domains::haikus::error::HaikuError;
use crate::domains::haikus::models::HaikuState;
use crate::domains::posts::{fetch_and_save, FetchOutcome, IngestError};
use crate::kernel::ServerDeps;

/// What a single pass through every step did.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// `None` when the fetch itself failed; see `failures`.
    pub fetch: Option<FetchOutcome>,
    /// Step name and the state it left its haiku in.
    pub advanced: Vec<(&'static str, HaikuState)>,
    /// Step name and the error it reported.
    pub failures: Vec<(&'static str, String)>,
}

/// Fetch, create, summarize, write and post once, in order.
///
/// Lost races and failed external calls are recorded and the pass carries
/// on. Persistence errors and cancellation stop it.
pub async fn run_pipeline_once(
    deps: &ServerDeps,
    cancel: &CancellationToken,
) -> Result<PipelineReport, HaikuError> {
    let mut report = PipelineReport::default();

    match fetch_and_save(deps, cancel).await {
        Ok(outcome) => {
            info!(?outcome, "Fetch finished");
            report.fetch = Some(outcome);
        }
        Err(IngestError::Persistence(e)) => return Err(HaikuError::Persistence(e)),
        Err(IngestError::Cancelled) => return Err(HaikuError::Cancelled),
        Err(e @ IngestError::Fetch(_)) => {
            warn!(error = %e, "Fetch failed");
            report.failures.push(("fetch", e.to_string()));
        }
    }

    let result = create_from_unprocessed_post(deps, cancel).await;
    record(&mut report, "create", result)?;

    let result = advance_summary(deps, cancel).await;
    record(&mut report, "summary", result)?;

    let result = advance_haiku_text(deps, cancel).await;
    record(&mut report, "haiku_text", result)?;

    let result = advance_posting(deps, cancel).await;
    record(&mut report, "posting", result)?;

    Ok(report)
}

fn record(
    report: &mut PipelineReport,
    step: &'static str,
    result: Result<StepOutcome, HaikuError>,
) -> Result<(), HaikuError> {
    log_step_outcome(step, &result);

    match result {
        Ok(StepOutcome::Idle) => Ok(()),
        Ok(StepOutcome::Advanced(haiku)) => {
            report.advanced.push((step, haiku.state));
            Ok(())
        }
        Err(e @ (HaikuError::Persistence(_) | HaikuError::Cancelled)) => Err(e),
        Err(e) => {
            report.failures.push((step, e.to_string()));
            Ok(())
        }
    }
}
