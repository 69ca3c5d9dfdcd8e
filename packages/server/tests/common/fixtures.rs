//! Test fixtures for creating test data.
//!
//! Posts are built with the model builder and saved through the store trait,
//! so the same fixtures serve the memory store and Postgres.

use chrono::{Duration, Utc};
use haiku_core::domains::haikus::{Haiku, HaikuChange, HaikuState};
use haiku_core::domains::posts::{Author, Post};
use haiku_core::kernel::{BaseHaikuStore, MemoryStore};

/// A post created `minutes_ago` minutes in the past.
pub fn post(id: &str, minutes_ago: i64) -> Post {
    Post::builder()
        .id(id)
        .author(Author::new(format!("author-{}", id), format!("user_{}", id)))
        .text(format!("Post {} about compilers and coffee", id))
        .created_at(Utc::now() - Duration::minutes(minutes_ago))
        .build()
}

/// Save posts and return them in the order given.
pub async fn seed_posts(store: &dyn BaseHaikuStore, posts: Vec<Post>) -> Vec<Post> {
    store.save_posts(&posts).await.expect("Failed to save posts");
    posts
}

/// Insert a haiku for `post_id` and force it into `state` with the fields
/// that state implies.
pub async fn seed_haiku(store: &MemoryStore, post_id: &str, state: HaikuState) -> Haiku {
    let haiku = store
        .insert_haiku(post_id)
        .await
        .expect("Failed to insert haiku");

    if state != HaikuState::Created {
        let mut change = HaikuChange::to(state);
        if HaikuState::FORWARD_PATH
            .iter()
            .position(|s| *s == state)
            .is_some_and(|i| i >= 2)
        {
            change = change.with_summary(format!("summary of {}", post_id));
        }
        if HaikuState::FORWARD_PATH
            .iter()
            .position(|s| *s == state)
            .is_some_and(|i| i >= 4)
        {
            change = change.with_text(format!("haiku for {}", post_id));
        }
        store.force_state(haiku.id, change);
    }

    store
        .find_haiku(haiku.id)
        .await
        .expect("Failed to load haiku")
        .expect("Haiku disappeared")
}

/// Current state of a haiku in the memory store.
pub async fn state_of(store: &MemoryStore, haiku: &Haiku) -> HaikuState {
    store
        .find_haiku(haiku.id)
        .await
        .expect("Failed to load haiku")
        .expect("Haiku disappeared")
        .state
}
