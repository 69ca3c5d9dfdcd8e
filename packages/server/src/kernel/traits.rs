// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The state machine lives in domains/haikus and drives these traits.
//
// Naming convention: Base* for trait names (e.g., BaseTextGenerator)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::HaikuId;
use crate::domains::haikus::models::{CasOutcome, Haiku, HaikuChange, HaikuState, PostJoin};
use crate::domains::posts::models::Post;
use crate::kernel::rate_limited::CallError;
use crate::kernel::stores::StoreError;

// =============================================================================
// Text Generator Trait (Infrastructure - summary and haiku text)
// =============================================================================

#[async_trait]
pub trait BaseTextGenerator: Send + Sync {
    /// Summarize a post's text.
    async fn generate_summary(&self, text: &str) -> Result<String, CallError>;

    /// Turn a summary into haiku text.
    async fn generate_haiku(&self, summary: &str) -> Result<String, CallError>;
}

// =============================================================================
// Social Platform Trait (Infrastructure - fetch posts, comment)
// =============================================================================

#[async_trait]
pub trait BaseSocialPlatform: Send + Sync {
    /// Fetch up to `limit` recent posts.
    async fn fetch_posts(&self, limit: u32) -> Result<Vec<Post>, CallError>;

    /// Publish `message` as a comment on `post_id`.
    async fn comment_on(&self, post_id: &str, message: &str) -> Result<(), CallError>;
}

// =============================================================================
// Haiku Store Trait (Infrastructure - persistence and work selection)
// =============================================================================

#[async_trait]
pub trait BaseHaikuStore: Send + Sync {
    /// Insert posts, skipping ids already stored. Returns how many were new.
    async fn save_posts(&self, posts: &[Post]) -> Result<u64, StoreError>;

    async fn find_post(&self, id: &str) -> Result<Option<Post>, StoreError>;

    /// Oldest post (by `created_at`, then insertion order) without a haiku.
    async fn find_oldest_unprocessed_post(&self) -> Result<Option<Post>, StoreError>;

    /// Create a haiku in `Created` for `post_id`. At most one per post.
    async fn insert_haiku(&self, post_id: &str) -> Result<Haiku, StoreError>;

    async fn find_haiku(&self, id: HaikuId) -> Result<Option<Haiku>, StoreError>;

    /// Oldest haiku in `state`, optionally with its post loaded.
    async fn find_oldest_in_state(
        &self,
        state: HaikuState,
        join: PostJoin,
    ) -> Result<Option<Haiku>, StoreError>;

    /// Haikus in any of `states` last updated before `updated_before`.
    async fn find_stale(
        &self,
        states: &[HaikuState],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Haiku>, StoreError>;

    /// Atomically verify the row is in one of `allowed` and apply `change`.
    ///
    /// The check and the write happen under one exclusive lock on the row.
    async fn compare_and_set(
        &self,
        id: HaikuId,
        allowed: &[HaikuState],
        change: HaikuChange,
    ) -> Result<CasOutcome, StoreError>;

    /// Take one unit of the fetch budget for `period`; `false` when spent.
    async fn claim_fetch_quota(&self, period: &str, limit: u32) -> Result<bool, StoreError>;
}
