//! PostgreSQL-backed haiku store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::StoreError;
use crate::common::HaikuId;
use crate::domains::haikus::models::{CasOutcome, Haiku, HaikuChange, HaikuState, PostJoin};
use crate::domains::posts::models::{FetchQuota, Post};
use crate::kernel::BaseHaikuStore;

/// Store over a `PgPool`. Queries live on the models; this wires them to
/// the trait.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn load_post(&self, mut haiku: Haiku) -> Result<Haiku, StoreError> {
        let post = Post::find_by_id(&haiku.post_id, &self.pool)
            .await?
            .ok_or_else(|| StoreError::UnknownPost(haiku.post_id.clone()))?;
        haiku.post = Some(post);
        Ok(haiku)
    }
}

#[async_trait]
impl BaseHaikuStore for PostgresStore {
    async fn save_posts(&self, posts: &[Post]) -> Result<u64, StoreError> {
        Post::insert_many(posts, &self.pool).await
    }

    async fn find_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        Post::find_by_id(id, &self.pool).await
    }

    async fn find_oldest_unprocessed_post(&self) -> Result<Option<Post>, StoreError> {
        Post::find_oldest_unprocessed(&self.pool).await
    }

    async fn insert_haiku(&self, post_id: &str) -> Result<Haiku, StoreError> {
        Haiku::insert(post_id, &self.pool).await
    }

    async fn find_haiku(&self, id: HaikuId) -> Result<Option<Haiku>, StoreError> {
        Haiku::find_by_id(id, &self.pool).await
    }

    async fn find_oldest_in_state(
        &self,
        state: HaikuState,
        join: PostJoin,
    ) -> Result<Option<Haiku>, StoreError> {
        let Some(haiku) = Haiku::find_oldest_in_state(state, &self.pool).await? else {
            return Ok(None);
        };

        match join {
            PostJoin::Skip => Ok(Some(haiku)),
            PostJoin::Load => self.load_post(haiku).await.map(Some),
        }
    }

    async fn find_stale(
        &self,
        states: &[HaikuState],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Haiku>, StoreError> {
        Haiku::find_stale(states, updated_before, &self.pool).await
    }

    async fn compare_and_set(
        &self,
        id: HaikuId,
        allowed: &[HaikuState],
        change: HaikuChange,
    ) -> Result<CasOutcome, StoreError> {
        Haiku::compare_and_set(id, allowed, &change, &self.pool).await
    }

    async fn claim_fetch_quota(&self, period: &str, limit: u32) -> Result<bool, StoreError> {
        FetchQuota::claim(period, limit, &self.pool).await
    }
}
