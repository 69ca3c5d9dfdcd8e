// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into ServerDeps for tests.
// MockSocialPlatform doubles as the dry-run platform (SOCIAL_PLATFORM=mock).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::stores::MemoryStore;
use super::{BaseSocialPlatform, BaseTextGenerator, CallError, ServerDeps};
use crate::config::PipelineSettings;
use crate::domains::posts::models::{Author, Post};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shorthand for the error a mock returns.
pub fn upstream_error(message: &str) -> CallError {
    CallError::Upstream {
        attempts: 1,
        message: message.to_string(),
    }
}

// =============================================================================
// Mock Text Generator
// =============================================================================

/// Scripted text generator. Queued responses are consumed in order; once a
/// queue is empty the default response is returned.
pub struct MockTextGenerator {
    summaries: Mutex<VecDeque<Result<String, CallError>>>,
    haikus: Mutex<VecDeque<Result<String, CallError>>>,
    summary_calls: Mutex<Vec<String>>,
    haiku_calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl Default for MockTextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTextGenerator {
    pub const DEFAULT_SUMMARY: &'static str = "Mock summary";
    pub const DEFAULT_HAIKU: &'static str = "Mock lines appear\nsyllables counted with care\nthe test passes now";

    pub fn new() -> Self {
        Self {
            summaries: Mutex::new(VecDeque::new()),
            haikus: Mutex::new(VecDeque::new()),
            summary_calls: Mutex::new(Vec::new()),
            haiku_calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_summary(self, summary: &str) -> Self {
        lock(&self.summaries).push_back(Ok(summary.to_string()));
        self
    }

    pub fn with_summary_error(self, error: CallError) -> Self {
        lock(&self.summaries).push_back(Err(error));
        self
    }

    pub fn with_haiku(self, haiku: &str) -> Self {
        lock(&self.haikus).push_back(Ok(haiku.to_string()));
        self
    }

    pub fn with_haiku_error(self, error: CallError) -> Self {
        lock(&self.haikus).push_back(Err(error));
        self
    }

    /// Sleep this long inside every call, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Texts passed to `generate_summary`
    pub fn summary_calls(&self) -> Vec<String> {
        lock(&self.summary_calls).clone()
    }

    /// Summaries passed to `generate_haiku`
    pub fn haiku_calls(&self) -> Vec<String> {
        lock(&self.haiku_calls).clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl BaseTextGenerator for MockTextGenerator {
    async fn generate_summary(&self, text: &str) -> Result<String, CallError> {
        lock(&self.summary_calls).push(text.to_string());
        self.pause().await;

        let next = lock(&self.summaries).pop_front();
        next.unwrap_or_else(|| Ok(Self::DEFAULT_SUMMARY.to_string()))
    }

    async fn generate_haiku(&self, summary: &str) -> Result<String, CallError> {
        lock(&self.haiku_calls).push(summary.to_string());
        self.pause().await;

        let next = lock(&self.haikus).pop_front();
        next.unwrap_or_else(|| Ok(Self::DEFAULT_HAIKU.to_string()))
    }
}

// =============================================================================
// Mock Social Platform
// =============================================================================

/// A comment captured by [`MockSocialPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedComment {
    pub post_id: String,
    pub message: String,
}

pub struct MockSocialPlatform {
    posts: Mutex<Vec<Post>>,
    fetch_errors: Mutex<VecDeque<CallError>>,
    comment_errors: Mutex<VecDeque<CallError>>,
    fetch_calls: Mutex<Vec<u32>>,
    comments: Mutex<Vec<PostedComment>>,
    delay: Option<Duration>,
}

impl Default for MockSocialPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSocialPlatform {
    pub fn new() -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
            fetch_errors: Mutex::new(VecDeque::new()),
            comment_errors: Mutex::new(VecDeque::new()),
            fetch_calls: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Three canned tweets, created one, two and three hours ago.
    pub fn with_sample_posts() -> Self {
        Self::new().with_posts(sample_posts())
    }

    pub fn with_posts(self, posts: Vec<Post>) -> Self {
        lock(&self.posts).extend(posts);
        self
    }

    pub fn with_fetch_error(self, error: CallError) -> Self {
        lock(&self.fetch_errors).push_back(error);
        self
    }

    pub fn with_comment_error(self, error: CallError) -> Self {
        lock(&self.comment_errors).push_back(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Limits passed to `fetch_posts`
    pub fn fetch_calls(&self) -> Vec<u32> {
        lock(&self.fetch_calls).clone()
    }

    /// Successfully posted comments
    pub fn comments(&self) -> Vec<PostedComment> {
        lock(&self.comments).clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl BaseSocialPlatform for MockSocialPlatform {
    async fn fetch_posts(&self, limit: u32) -> Result<Vec<Post>, CallError> {
        lock(&self.fetch_calls).push(limit);
        self.pause().await;

        if let Some(error) = lock(&self.fetch_errors).pop_front() {
            return Err(error);
        }

        Ok(lock(&self.posts)
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn comment_on(&self, post_id: &str, message: &str) -> Result<(), CallError> {
        self.pause().await;

        if let Some(error) = lock(&self.comment_errors).pop_front() {
            return Err(error);
        }

        tracing::info!(post_id, message, "Mock comment posted");
        lock(&self.comments).push(PostedComment {
            post_id: post_id.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

fn sample_posts() -> Vec<Post> {
    let now = Utc::now();

    vec![
        Post::builder()
            .id("1885316710766678022")
            .author(Author::new("123", "user123"))
            .text("Oracle unveils new AI agents to take on tech rivals, aiming to push AI innovation further. #AI #Oracle #TechCompetition #Innovation")
            .likes(150)
            .shares(80)
            .replies(25)
            .created_at(now - chrono::Duration::hours(1))
            .build(),
        Post::builder()
            .id("1885316710628286542")
            .author(Author::new("456", "user456"))
            .text("RT @latdovietcong: Đề nghị bộ công an phải nhanh chóng vào cuộc điều tra...")
            .likes(10)
            .shares(5)
            .replies(1)
            .created_at(now - chrono::Duration::hours(2))
            .build(),
        Post::builder()
            .id("1885316710611509517")
            .author(Author::new("789", "user789"))
            .text("解いたら1億円！どれに挑戦？\n1️⃣ リーマン予想 – 神の声 \n2️⃣ P≠NP予想 – AI革命の鍵")
            .likes(220)
            .shares(100)
            .replies(40)
            .created_at(now - chrono::Duration::hours(3))
            .build(),
    ]
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub store: Arc<MemoryStore>,
    pub text_generator: Arc<MockTextGenerator>,
    pub social_platform: Arc<MockSocialPlatform>,
    pub settings: PipelineSettings,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            text_generator: Arc::new(MockTextGenerator::new()),
            social_platform: Arc::new(MockSocialPlatform::new()),
            settings: PipelineSettings::default(),
        }
    }

    /// Set a mock text generator
    pub fn mock_text_generator(mut self, generator: MockTextGenerator) -> Self {
        self.text_generator = Arc::new(generator);
        self
    }

    /// Set a mock social platform
    pub fn mock_social_platform(mut self, platform: MockSocialPlatform) -> Self {
        self.social_platform = Arc::new(platform);
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// ServerDeps sharing this builder's store and mocks.
    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            self.store.clone(),
            self.text_generator.clone(),
            self.social_platform.clone(),
            self.settings.clone(),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
