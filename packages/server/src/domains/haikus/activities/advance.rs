//! The three external-call steps of the pipeline.
//!
//! Each step leases the oldest eligible haiku into a `*Getting`/`Commenting`
//! state, makes the external call with no lock held, then commits the result.
//! A failed or timed-out call forces the haiku to `Failed`. The call timeout is
//! shorter than the lease timeout, so the sweep only fails abandoned leases.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::mark_failed::mark_failed;
use super::transition::transition;
use super::StepOutcome;
use crate::domains::haikus::error::HaikuError;
use crate::domains::haikus::models::{Haiku, HaikuChange, HaikuState, PostJoin};
use crate::kernel::{CallError, ServerDeps};

struct Step {
    name: &'static str,
    from: HaikuState,
    leased: HaikuState,
    join: PostJoin,
}

const SUMMARY: Step = Step {
    name: "summary",
    from: HaikuState::Created,
    leased: HaikuState::SummaryGetting,
    join: PostJoin::Load,
};

const HAIKU_TEXT: Step = Step {
    name: "haiku_text",
    from: HaikuState::SummaryGot,
    leased: HaikuState::HaikuTextGetting,
    join: PostJoin::Skip,
};

const POSTING: Step = Step {
    name: "posting",
    from: HaikuState::HaikuTextGot,
    leased: HaikuState::Commenting,
    join: PostJoin::Skip,
};

fn missing(haiku: &Haiku, what: &str) -> CallError {
    CallError::Upstream {
        attempts: 0,
        message: format!("haiku {} has no {}", haiku.id, what),
    }
}

/// Summarize the oldest `Created` haiku's post: `Created → SummaryGetting → SummaryGot`.
pub async fn advance_summary(
    deps: &ServerDeps,
    cancel: &CancellationToken,
) -> Result<StepOutcome, HaikuError> {
    let generator = deps.text_generator.clone();

    advance(&SUMMARY, deps, cancel, |haiku| async move {
        let post = haiku.post.as_ref().ok_or_else(|| missing(&haiku, "post"))?;
        let summary = generator.generate_summary(&post.text).await?;
        Ok::<_, CallError>(HaikuChange::to(HaikuState::SummaryGot).with_summary(summary))
    })
    .await
}

/// Turn the oldest summary into haiku text: `SummaryGot → HaikuTextGetting → HaikuTextGot`.
pub async fn advance_haiku_text(
    deps: &ServerDeps,
    cancel: &CancellationToken,
) -> Result<StepOutcome, HaikuError> {
    let generator = deps.text_generator.clone();

    advance(&HAIKU_TEXT, deps, cancel, |haiku| async move {
        let summary = haiku.summary.as_deref().ok_or_else(|| missing(&haiku, "summary"))?;
        let text = generator.generate_haiku(summary).await?;
        Ok::<_, CallError>(HaikuChange::to(HaikuState::HaikuTextGot).with_text(text))
    })
    .await
}

/// Publish the oldest finished haiku as a comment: `HaikuTextGot → Commenting → Done`.
pub async fn advance_posting(
    deps: &ServerDeps,
    cancel: &CancellationToken,
) -> Result<StepOutcome, HaikuError> {
    let platform = deps.social_platform.clone();

    advance(&POSTING, deps, cancel, |haiku| async move {
        let text = haiku.text.as_deref().ok_or_else(|| missing(&haiku, "text"))?;
        platform.comment_on(&haiku.post_id, text).await?;
        Ok::<_, CallError>(HaikuChange::to(HaikuState::Done))
    })
    .await
}

async fn advance<F, Fut>(
    step: &Step,
    deps: &ServerDeps,
    cancel: &CancellationToken,
    call: F,
) -> Result<StepOutcome, HaikuError>
where
    F: FnOnce(Haiku) -> Fut,
    Fut: Future<Output = Result<HaikuChange, CallError>>,
{
    if cancel.is_cancelled() {
        return Err(HaikuError::Cancelled);
    }

    let Some(selected) = deps.store.find_oldest_in_state(step.from, step.join).await? else {
        debug!(step = step.name, state = %step.from, "No haiku to advance");
        return Ok(StepOutcome::Idle);
    };
    let id = selected.id;

    let mut leased = transition(deps, id, &[step.from], HaikuChange::to(step.leased)).await?;
    leased.post = selected.post;
    info!(step = step.name, haiku_id = %id, post_id = %leased.post_id, "Haiku leased");

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!(step = step.name, haiku_id = %id, state = %step.leased, "Cancelled mid-call, haiku left leased");
            return Err(HaikuError::Cancelled);
        }
        result = tokio::time::timeout(deps.settings.call_timeout, call(leased)) => {
            result.unwrap_or(Err(CallError::TimedOut(deps.settings.call_timeout)))
        }
    };

    match result {
        Ok(change) => match transition(deps, id, &[step.leased], change).await {
            Ok(haiku) => {
                info!(step = step.name, haiku_id = %id, state = %haiku.state, "Haiku advanced");
                Ok(StepOutcome::Advanced(haiku))
            }
            Err(HaikuError::StateConflict { actual, .. }) => {
                error!(
                    step = step.name,
                    haiku_id = %id,
                    state = %actual,
                    "External call completed after the lease was lost; result not recorded"
                );
                Err(HaikuError::LeaseLost {
                    id,
                    leased: step.leased,
                    actual,
                })
            }
            Err(e) => Err(e),
        },
        Err(source) => {
            warn!(step = step.name, haiku_id = %id, error = %source, "External call failed");
            match mark_failed(id, deps).await {
                Ok(_) | Err(HaikuError::StateConflict { .. }) => {}
                Err(e) => error!(
                    step = step.name,
                    haiku_id = %id,
                    call_error = %source,
                    error = %e,
                    "Could not mark haiku failed after external call error"
                ),
            }
            Err(HaikuError::ExternalApi { id, source })
        }
    }
}
