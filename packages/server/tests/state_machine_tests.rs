//! Integration tests for the haiku state machine.
//!
//! Runs the scheduled steps against the memory store and mock capabilities:
//! - full pipeline scenarios (happy path, failures at each call)
//! - idempotent no-op steps
//! - manual recovery (mark_failed, fail_stale_leases)
//! - leases racing the sweep, call timeouts
//! - cancellation

mod common;

use crate::common::{post, seed_haiku, seed_posts, state_of};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haiku_core::common::HaikuId;
use haiku_core::config::PipelineSettings;
use haiku_core::domains::haikus::{
    advance_haiku_text, advance_posting, advance_summary, create_from_unprocessed_post,
    fail_stale_leases, mark_failed, CasOutcome, Haiku, HaikuChange, HaikuError, HaikuState,
    PostJoin, StepOutcome,
};
use haiku_core::domains::posts::Post;
use haiku_core::kernel::stores::StoreError;
use haiku_core::kernel::test_dependencies::{upstream_error, PostedComment};
use haiku_core::kernel::{
    BaseHaikuStore, CallError, MemoryStore, MockSocialPlatform, MockTextGenerator, ServerDeps,
    TestDependencies,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn advanced_state(outcome: StepOutcome) -> HaikuState {
    match outcome {
        StepOutcome::Advanced(haiku) => haiku.state,
        StepOutcome::Idle => panic!("expected the step to advance a haiku"),
    }
}

async fn run_all_steps(deps: &ServerDeps, cancel: &CancellationToken) {
    let _ = create_from_unprocessed_post(deps, cancel).await;
    let _ = advance_summary(deps, cancel).await;
    let _ = advance_haiku_text(deps, cancel).await;
    let _ = advance_posting(deps, cancel).await;
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn happy_path_posts_a_haiku_comment() {
    let test_deps = TestDependencies::new().mock_text_generator(
        MockTextGenerator::new()
            .with_summary("A database learns to count")
            .with_haiku("Rows wake up at dawn\ncounting every single one\nindexes hum low"),
    );
    let deps = test_deps.server_deps();
    let cancel = CancellationToken::new();
    let posts = seed_posts(deps.store.as_ref(), vec![post("100", 30)]).await;

    let created = create_from_unprocessed_post(&deps, &cancel).await.unwrap();
    assert_eq!(advanced_state(created), HaikuState::Created);

    let summarized = advance_summary(&deps, &cancel).await.unwrap();
    let StepOutcome::Advanced(haiku) = summarized else {
        panic!("summary step was idle");
    };
    assert_eq!(haiku.state, HaikuState::SummaryGot);
    assert_eq!(haiku.summary.as_deref(), Some("A database learns to count"));
    assert_eq!(test_deps.text_generator.summary_calls(), vec![posts[0].text.clone()]);

    let written = advance_haiku_text(&deps, &cancel).await.unwrap();
    assert_eq!(advanced_state(written), HaikuState::HaikuTextGot);
    assert_eq!(
        test_deps.text_generator.haiku_calls(),
        vec!["A database learns to count".to_string()]
    );

    let posted = advance_posting(&deps, &cancel).await.unwrap();
    let StepOutcome::Advanced(haiku) = posted else {
        panic!("posting step was idle");
    };
    assert_eq!(haiku.state, HaikuState::Done);
    assert_eq!(
        test_deps.social_platform.comments(),
        vec![PostedComment {
            post_id: "100".to_string(),
            message: "Rows wake up at dawn\ncounting every single one\nindexes hum low"
                .to_string(),
        }]
    );
}

#[tokio::test]
async fn summary_failure_fails_the_haiku() {
    let test_deps = TestDependencies::new().mock_text_generator(
        MockTextGenerator::new().with_summary_error(upstream_error("model unavailable")),
    );
    let deps = test_deps.server_deps();
    let cancel = CancellationToken::new();
    seed_posts(deps.store.as_ref(), vec![post("200", 10)]).await;

    create_from_unprocessed_post(&deps, &cancel).await.unwrap();
    let err = advance_summary(&deps, &cancel).await.unwrap_err();

    let HaikuError::ExternalApi { id, source } = err else {
        panic!("expected ExternalApi");
    };
    assert_eq!(source, upstream_error("model unavailable"));
    let haiku = deps.store.find_haiku(id).await.unwrap().unwrap();
    assert_eq!(haiku.state, HaikuState::Failed);
    assert!(haiku.summary.is_none());

    // a failed haiku is never picked up again
    assert!(matches!(advance_summary(&deps, &cancel).await, Ok(StepOutcome::Idle)));
    assert!(matches!(advance_haiku_text(&deps, &cancel).await, Ok(StepOutcome::Idle)));
    assert_eq!(test_deps.text_generator.haiku_calls().len(), 0);
}

#[tokio::test]
async fn haiku_text_failure_keeps_the_summary() {
    let test_deps = TestDependencies::new().mock_text_generator(
        MockTextGenerator::new().with_haiku_error(CallError::RateLimitExceeded {
            attempts: 5,
            message: "429".to_string(),
        }),
    );
    let deps = test_deps.server_deps();
    let cancel = CancellationToken::new();
    seed_posts(deps.store.as_ref(), vec![post("300", 10)]).await;

    create_from_unprocessed_post(&deps, &cancel).await.unwrap();
    advance_summary(&deps, &cancel).await.unwrap();
    let err = advance_haiku_text(&deps, &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        HaikuError::ExternalApi {
            source: CallError::RateLimitExceeded { attempts: 5, .. },
            ..
        }
    ));

    let haikus = test_deps.store.haikus();
    assert_eq!(haikus.len(), 1);
    assert_eq!(haikus[0].state, HaikuState::Failed);
    assert_eq!(haikus[0].summary.as_deref(), Some(MockTextGenerator::DEFAULT_SUMMARY));
    assert!(haikus[0].text.is_none());
}

#[tokio::test]
async fn posting_failure_fails_the_haiku_without_a_comment() {
    let test_deps = TestDependencies::new().mock_social_platform(
        MockSocialPlatform::new().with_comment_error(upstream_error("forbidden")),
    );
    let deps = test_deps.server_deps();
    let cancel = CancellationToken::new();
    seed_posts(deps.store.as_ref(), vec![post("400", 10)]).await;

    run_all_steps(&deps, &cancel).await;

    let haikus = test_deps.store.haikus();
    assert_eq!(haikus[0].state, HaikuState::Failed);
    assert_eq!(haikus[0].text.as_deref(), Some(MockTextGenerator::DEFAULT_HAIKU));
    assert!(test_deps.social_platform.comments().is_empty());
}

#[tokio::test]
async fn oldest_post_is_processed_first() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let cancel = CancellationToken::new();
    seed_posts(
        deps.store.as_ref(),
        vec![post("newer", 5), post("oldest", 60), post("middle", 30)],
    )
    .await;

    let mut order = Vec::new();
    for _ in 0..3 {
        let StepOutcome::Advanced(haiku) = create_from_unprocessed_post(&deps, &cancel).await.unwrap()
        else {
            panic!("create step was idle");
        };
        order.push(haiku.post_id);
    }

    assert_eq!(order, vec!["oldest", "middle", "newer"]);
    assert!(matches!(
        create_from_unprocessed_post(&deps, &cancel).await,
        Ok(StepOutcome::Idle)
    ));
}

#[tokio::test]
async fn one_step_advances_one_haiku() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let cancel = CancellationToken::new();
    seed_posts(deps.store.as_ref(), vec![post("a", 20), post("b", 10)]).await;

    create_from_unprocessed_post(&deps, &cancel).await.unwrap();
    create_from_unprocessed_post(&deps, &cancel).await.unwrap();
    advance_summary(&deps, &cancel).await.unwrap();

    let mut states: Vec<_> = test_deps
        .store
        .haikus()
        .into_iter()
        .map(|h| (h.post_id, h.state))
        .collect();
    states.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        states,
        vec![
            ("a".to_string(), HaikuState::SummaryGot),
            ("b".to_string(), HaikuState::Created),
        ]
    );
}

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn steps_are_idle_on_an_empty_store() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let cancel = CancellationToken::new();

    assert!(matches!(create_from_unprocessed_post(&deps, &cancel).await, Ok(StepOutcome::Idle)));
    assert!(matches!(advance_summary(&deps, &cancel).await, Ok(StepOutcome::Idle)));
    assert!(matches!(advance_haiku_text(&deps, &cancel).await, Ok(StepOutcome::Idle)));
    assert!(matches!(advance_posting(&deps, &cancel).await, Ok(StepOutcome::Idle)));

    assert!(test_deps.text_generator.summary_calls().is_empty());
    assert!(test_deps.social_platform.comments().is_empty());
}

#[tokio::test]
async fn rerunning_steps_after_done_changes_nothing() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let cancel = CancellationToken::new();
    seed_posts(deps.store.as_ref(), vec![post("500", 10)]).await;

    run_all_steps(&deps, &cancel).await;
    let before = test_deps.store.haikus();
    assert_eq!(before[0].state, HaikuState::Done);

    for _ in 0..3 {
        run_all_steps(&deps, &cancel).await;
    }

    let after = test_deps.store.haikus();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].state, HaikuState::Done);
    assert_eq!(after[0].updated_at, before[0].updated_at);
    assert_eq!(test_deps.text_generator.summary_calls().len(), 1);
    assert_eq!(test_deps.text_generator.haiku_calls().len(), 1);
    assert_eq!(test_deps.social_platform.comments().len(), 1);
}

#[tokio::test]
async fn leased_haiku_is_not_picked_up_again() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let cancel = CancellationToken::new();
    seed_posts(deps.store.as_ref(), vec![post("600", 10)]).await;
    let haiku = seed_haiku(&test_deps.store, "600", HaikuState::SummaryGetting).await;

    assert!(matches!(advance_summary(&deps, &cancel).await, Ok(StepOutcome::Idle)));
    assert!(matches!(advance_haiku_text(&deps, &cancel).await, Ok(StepOutcome::Idle)));
    assert_eq!(state_of(&test_deps.store, &haiku).await, HaikuState::SummaryGetting);
}

// =============================================================================
// mark_failed
// =============================================================================

#[tokio::test]
async fn mark_failed_is_idempotent() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    seed_posts(deps.store.as_ref(), vec![post("700", 10)]).await;
    let haiku = seed_haiku(&test_deps.store, "700", HaikuState::HaikuTextGot).await;

    let first = assert_ok!(mark_failed(haiku.id, &deps).await);
    assert_eq!(first.state, HaikuState::Failed);
    assert_eq!(first.text, haiku.text);

    let second = assert_ok!(mark_failed(haiku.id, &deps).await);
    assert_eq!(second.state, HaikuState::Failed);
    assert_eq!(second.updated_at, first.updated_at);
}

#[tokio::test]
async fn mark_failed_refuses_done() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    seed_posts(deps.store.as_ref(), vec![post("800", 10)]).await;
    let haiku = seed_haiku(&test_deps.store, "800", HaikuState::Done).await;

    let err = assert_err!(mark_failed(haiku.id, &deps).await);

    assert!(matches!(
        err,
        HaikuError::StateConflict { actual: HaikuState::Done, .. }
    ));
    assert!(err.is_benign());
    assert_eq!(state_of(&test_deps.store, &haiku).await, HaikuState::Done);
}

#[tokio::test]
async fn mark_failed_unknown_id() {
    let deps = TestDependencies::new().server_deps();
    let id = HaikuId::new();

    let err = assert_err!(mark_failed(id, &deps).await);

    assert!(matches!(err, HaikuError::NotFound(missing) if missing == id));
    assert!(!err.is_benign());
}

// =============================================================================
// Stale leases
// =============================================================================

#[tokio::test]
async fn stale_leases_are_failed() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    let cancel = CancellationToken::new();
    seed_posts(
        deps.store.as_ref(),
        vec![post("s1", 10), post("s2", 10), post("s3", 10), post("s4", 10)],
    )
    .await;

    let stale = seed_haiku(&test_deps.store, "s1", HaikuState::Commenting).await;
    let fresh = seed_haiku(&test_deps.store, "s2", HaikuState::SummaryGetting).await;
    let old_but_idle = seed_haiku(&test_deps.store, "s3", HaikuState::SummaryGot).await;
    let old_done = seed_haiku(&test_deps.store, "s4", HaikuState::Done).await;
    for haiku in [&stale, &old_but_idle, &old_done] {
        test_deps.store.backdate(haiku.id, chrono::Duration::hours(2));
    }

    let failed = fail_stale_leases(Duration::from_secs(30 * 60), &deps, &cancel)
        .await
        .unwrap();

    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, stale.id);
    assert_eq!(state_of(&test_deps.store, &stale).await, HaikuState::Failed);
    assert_eq!(state_of(&test_deps.store, &fresh).await, HaikuState::SummaryGetting);
    assert_eq!(state_of(&test_deps.store, &old_but_idle).await, HaikuState::SummaryGot);
    assert_eq!(state_of(&test_deps.store, &old_done).await, HaikuState::Done);

    // nothing left to sweep
    let again = fail_stale_leases(Duration::from_secs(30 * 60), &deps, &cancel)
        .await
        .unwrap();
    assert!(again.is_empty());
}

// =============================================================================
// Leases and call timeouts
// =============================================================================

#[tokio::test(start_paused = true)]
async fn sweep_during_a_live_call_is_reported_as_a_lost_lease() {
    let test_deps = TestDependencies::new()
        .mock_social_platform(MockSocialPlatform::new().with_delay(Duration::from_secs(5)));
    let deps = test_deps.server_deps();
    seed_posts(deps.store.as_ref(), vec![post("700", 10)]).await;
    let haiku = seed_haiku(&test_deps.store, "700", HaikuState::HaikuTextGot).await;

    let task = {
        let deps = deps.clone();
        tokio::spawn(async move { advance_posting(&deps, &CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(state_of(&test_deps.store, &haiku).await, HaikuState::Commenting);

    test_deps.store.backdate(haiku.id, chrono::Duration::hours(1));
    let swept = fail_stale_leases(Duration::from_secs(30 * 60), &deps, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(swept.len(), 1);

    let err = task.await.unwrap().unwrap_err();
    assert!(
        matches!(
            err,
            HaikuError::LeaseLost {
                leased: HaikuState::Commenting,
                actual: HaikuState::Failed,
                ..
            }
        ),
        "{:?}",
        err
    );
    assert!(!err.is_benign());
    assert_eq!(test_deps.social_platform.comments().len(), 1);
    assert_eq!(state_of(&test_deps.store, &haiku).await, HaikuState::Failed);
}

#[tokio::test(start_paused = true)]
async fn call_timeout_fails_the_haiku_before_the_lease_expires() {
    let settings = PipelineSettings::default();
    let call_timeout = settings.call_timeout;
    let test_deps = TestDependencies::new()
        .mock_social_platform(MockSocialPlatform::new().with_delay(Duration::from_secs(2 * 60 * 60)))
        .settings(settings);
    let deps = test_deps.server_deps();
    seed_posts(deps.store.as_ref(), vec![post("710", 10)]).await;
    let haiku = seed_haiku(&test_deps.store, "710", HaikuState::HaikuTextGot).await;

    let err = advance_posting(&deps, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HaikuError::ExternalApi { source: CallError::TimedOut(t), .. } if t == call_timeout
    ));
    assert_eq!(state_of(&test_deps.store, &haiku).await, HaikuState::Failed);
    assert!(test_deps.social_platform.comments().is_empty());
}

/// Memory store whose writes to `Failed` hit a database error.
#[derive(Default)]
struct FailedWritesBroken {
    inner: MemoryStore,
}

#[async_trait]
impl BaseHaikuStore for FailedWritesBroken {
    async fn save_posts(&self, posts: &[Post]) -> Result<u64, StoreError> {
        self.inner.save_posts(posts).await
    }

    async fn find_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        self.inner.find_post(id).await
    }

    async fn find_oldest_unprocessed_post(&self) -> Result<Option<Post>, StoreError> {
        self.inner.find_oldest_unprocessed_post().await
    }

    async fn insert_haiku(&self, post_id: &str) -> Result<Haiku, StoreError> {
        self.inner.insert_haiku(post_id).await
    }

    async fn find_haiku(&self, id: HaikuId) -> Result<Option<Haiku>, StoreError> {
        self.inner.find_haiku(id).await
    }

    async fn find_oldest_in_state(
        &self,
        state: HaikuState,
        join: PostJoin,
    ) -> Result<Option<Haiku>, StoreError> {
        self.inner.find_oldest_in_state(state, join).await
    }

    async fn find_stale(
        &self,
        states: &[HaikuState],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Haiku>, StoreError> {
        self.inner.find_stale(states, updated_before).await
    }

    async fn compare_and_set(
        &self,
        id: HaikuId,
        allowed: &[HaikuState],
        change: HaikuChange,
    ) -> Result<CasOutcome, StoreError> {
        if change.state == HaikuState::Failed {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.compare_and_set(id, allowed, change).await
    }

    async fn claim_fetch_quota(&self, period: &str, limit: u32) -> Result<bool, StoreError> {
        self.inner.claim_fetch_quota(period, limit).await
    }
}

#[tokio::test]
async fn call_error_survives_a_failed_mark_failed() {
    let store = Arc::new(FailedWritesBroken::default());
    let deps = ServerDeps::new(
        store.clone(),
        Arc::new(MockTextGenerator::new().with_summary_error(upstream_error("model unavailable"))),
        Arc::new(MockSocialPlatform::new()),
        PipelineSettings::default(),
    );
    let cancel = CancellationToken::new();
    store.save_posts(&[post("720", 10)]).await.unwrap();
    create_from_unprocessed_post(&deps, &cancel).await.unwrap();

    let err = advance_summary(&deps, &cancel).await.unwrap_err();

    let HaikuError::ExternalApi { source, .. } = err else {
        panic!("expected the call error, got {:?}", err);
    };
    assert_eq!(source, upstream_error("model unavailable"));
    // the lease stays for the sweep
    assert_eq!(store.inner.haikus()[0].state, HaikuState::SummaryGetting);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn cancelled_steps_touch_nothing() {
    let test_deps = TestDependencies::new();
    let deps = test_deps.server_deps();
    seed_posts(deps.store.as_ref(), vec![post("900", 10)]).await;
    let haiku = seed_haiku(&test_deps.store, "900", HaikuState::Created).await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(
        create_from_unprocessed_post(&deps, &cancel).await,
        Err(HaikuError::Cancelled)
    ));
    assert!(matches!(
        advance_summary(&deps, &cancel).await,
        Err(HaikuError::Cancelled)
    ));
    assert_eq!(state_of(&test_deps.store, &haiku).await, HaikuState::Created);
    assert!(test_deps.text_generator.summary_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_call_leaves_the_lease_for_the_sweep() {
    let test_deps = TestDependencies::new()
        .mock_text_generator(MockTextGenerator::new().with_delay(Duration::from_secs(60)));
    let deps = test_deps.server_deps();
    seed_posts(deps.store.as_ref(), vec![post("950", 10)]).await;
    let haiku = seed_haiku(&test_deps.store, "950", HaikuState::Created).await;

    let cancel = CancellationToken::new();
    let task = {
        let deps = deps.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { advance_summary(&deps, &cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(HaikuError::Cancelled)));
    assert_eq!(state_of(&test_deps.store, &haiku).await, HaikuState::SummaryGetting);
    assert_eq!(test_deps.text_generator.summary_calls().len(), 1);

    test_deps.store.backdate(haiku.id, chrono::Duration::hours(1));
    let failed = fail_stale_leases(Duration::from_secs(60), &deps, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(state_of(&test_deps.store, &haiku).await, HaikuState::Failed);
}
