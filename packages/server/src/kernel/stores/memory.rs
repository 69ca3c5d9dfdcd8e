//! In-memory haiku store for tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::StoreError;
use crate::common::HaikuId;
use crate::domains::haikus::models::{CasOutcome, Haiku, HaikuChange, HaikuState, PostJoin};
use crate::domains::posts::models::Post;
use crate::kernel::BaseHaikuStore;

#[derive(Default)]
struct Tables {
    posts: Vec<Post>,
    haikus: Vec<Haiku>,
    quotas: HashMap<String, u32>,
    next_seq: i64,
}

impl Tables {
    fn seq(&mut self) -> i64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn post(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    fn haiku_mut(&mut self, id: HaikuId) -> Option<&mut Haiku> {
        self.haikus.iter_mut().find(|h| h.id == id)
    }
}

/// In-memory storage for posts, haikus and fetch quotas.
///
/// One mutex guards every table and is held across each check-and-set,
/// standing in for the row lock. Data is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn post_count(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn haikus(&self) -> Vec<Haiku> {
        self.lock().haikus.clone()
    }

    pub fn quota_used(&self, period: &str) -> u32 {
        self.lock().quotas.get(period).copied().unwrap_or(0)
    }

    /// Move a haiku's `updated_at` into the past, simulating an old lease.
    pub fn backdate(&self, id: HaikuId, by: chrono::Duration) {
        if let Some(haiku) = self.lock().haiku_mut(id) {
            haiku.updated_at -= by;
        }
    }

    /// Force a state without any guard, for setting up scenarios.
    pub fn force_state(&self, id: HaikuId, change: HaikuChange) {
        if let Some(haiku) = self.lock().haiku_mut(id) {
            apply(haiku, change);
        }
    }
}

fn apply(haiku: &mut Haiku, change: HaikuChange) {
    haiku.state = change.state;
    if change.summary.is_some() {
        haiku.summary = change.summary;
    }
    if change.text.is_some() {
        haiku.text = change.text;
    }
    haiku.updated_at = Utc::now();
}

#[async_trait]
impl BaseHaikuStore for MemoryStore {
    async fn save_posts(&self, posts: &[Post]) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let mut inserted = 0;

        for post in posts {
            if tables.post(&post.id).is_some() {
                continue;
            }
            let mut post = post.clone();
            post.seq = tables.seq();
            tables.posts.push(post);
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn find_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        Ok(self.lock().post(id).cloned())
    }

    async fn find_oldest_unprocessed_post(&self) -> Result<Option<Post>, StoreError> {
        let tables = self.lock();

        Ok(tables
            .posts
            .iter()
            .filter(|p| !tables.haikus.iter().any(|h| h.post_id == p.id))
            .min_by_key(|p| (p.created_at, p.seq))
            .cloned())
    }

    async fn insert_haiku(&self, post_id: &str) -> Result<Haiku, StoreError> {
        let mut tables = self.lock();

        if tables.post(post_id).is_none() {
            return Err(StoreError::UnknownPost(post_id.to_string()));
        }
        if tables.haikus.iter().any(|h| h.post_id == post_id) {
            return Err(StoreError::DuplicateHaiku(post_id.to_string()));
        }

        let now = Utc::now();
        let haiku = Haiku {
            id: HaikuId::new(),
            post_id: post_id.to_string(),
            state: HaikuState::Created,
            summary: None,
            text: None,
            created_at: now,
            updated_at: now,
            seq: tables.seq(),
            post: None,
        };
        tables.haikus.push(haiku.clone());

        Ok(haiku)
    }

    async fn find_haiku(&self, id: HaikuId) -> Result<Option<Haiku>, StoreError> {
        Ok(self.lock().haikus.iter().find(|h| h.id == id).cloned())
    }

    async fn find_oldest_in_state(
        &self,
        state: HaikuState,
        join: PostJoin,
    ) -> Result<Option<Haiku>, StoreError> {
        let tables = self.lock();

        let Some(mut haiku) = tables
            .haikus
            .iter()
            .filter(|h| h.state == state)
            .min_by_key(|h| (h.created_at, h.seq))
            .cloned()
        else {
            return Ok(None);
        };

        if join == PostJoin::Load {
            let post = tables
                .post(&haiku.post_id)
                .cloned()
                .ok_or_else(|| StoreError::UnknownPost(haiku.post_id.clone()))?;
            haiku.post = Some(post);
        }

        Ok(Some(haiku))
    }

    async fn find_stale(
        &self,
        states: &[HaikuState],
        updated_before: DateTime<Utc>,
    ) -> Result<Vec<Haiku>, StoreError> {
        let mut stale: Vec<Haiku> = self
            .lock()
            .haikus
            .iter()
            .filter(|h| states.contains(&h.state) && h.updated_at < updated_before)
            .cloned()
            .collect();
        stale.sort_by_key(|h| (h.updated_at, h.seq));

        Ok(stale)
    }

    async fn compare_and_set(
        &self,
        id: HaikuId,
        allowed: &[HaikuState],
        change: HaikuChange,
    ) -> Result<CasOutcome, StoreError> {
        let mut tables = self.lock();

        let Some(haiku) = tables.haiku_mut(id) else {
            return Ok(CasOutcome::NotFound);
        };

        if !allowed.contains(&haiku.state) {
            return Ok(CasOutcome::Conflict(haiku.clone()));
        }

        apply(haiku, change);
        Ok(CasOutcome::Committed(haiku.clone()))
    }

    async fn claim_fetch_quota(&self, period: &str, limit: u32) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let used = tables.quotas.entry(period.to_string()).or_insert(0);

        if *used >= limit {
            return Ok(false);
        }
        *used += 1;
        Ok(true)
    }
}
