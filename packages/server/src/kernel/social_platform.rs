//! Twitter implementation of [`BaseSocialPlatform`].

use async_trait::async_trait;
use chrono::Utc;
use std::num::NonZeroU32;
use std::time::Duration;
use twitter_client::{SearchResponse, TwitterClient, TwitterError};

use crate::domains::posts::models::{Author, Post, PLATFORM_TWITTER};
use crate::kernel::rate_limited::{CallError, RateLimitedCaller, RetryPolicy, UpstreamFailure};
use crate::kernel::BaseSocialPlatform;

pub const DEFAULT_SEARCH_QUERY: &str = "software news lang:en -is:retweet";

/// Twitter's basic tier: 10 requests per 15 minutes.
const REQUESTS_PER_WINDOW: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => unreachable!(),
};
const WINDOW: Duration = Duration::from_secs(15 * 60);

pub struct TwitterPlatform {
    client: TwitterClient,
    caller: RateLimitedCaller,
    query: String,
}

impl TwitterPlatform {
    pub fn new(client: TwitterClient, query: impl Into<String>) -> Self {
        let caller = RateLimitedCaller::new("twitter", REQUESTS_PER_WINDOW, WINDOW, RetryPolicy::twitter());
        Self::with_caller(client, caller, query)
    }

    pub fn with_caller(client: TwitterClient, caller: RateLimitedCaller, query: impl Into<String>) -> Self {
        Self {
            client,
            caller,
            query: query.into(),
        }
    }
}

fn classify(err: TwitterError) -> UpstreamFailure {
    match err {
        TwitterError::RateLimited { reset_at, body } => UpstreamFailure::RateLimited {
            reset_at,
            message: format!("Twitter rate limit: {}", body),
        },
        TwitterError::Network(_) | TwitterError::Unavailable { .. } => {
            UpstreamFailure::Transient(err.to_string())
        }
        TwitterError::Api { .. } | TwitterError::Parse(_) => UpstreamFailure::Fatal(err.to_string()),
    }
}

/// Map search results to posts, resolving usernames from the includes table.
fn into_posts(response: SearchResponse, limit: usize) -> Vec<Post> {
    let usernames = response.usernames();
    let fetched_at = Utc::now();

    response
        .data
        .iter()
        .take(limit)
        .map(|tweet| {
            let author_id = tweet.author_id.clone().unwrap_or_default();
            let username = usernames
                .get(author_id.as_str())
                .map(|name| name.to_string())
                .unwrap_or_default();

            Post::builder()
                .id(tweet.id.clone())
                .author(Author::new(author_id, username))
                .text(tweet.text.clone())
                .likes(tweet.public_metrics.like_count)
                .shares(tweet.public_metrics.retweet_count)
                .replies(tweet.public_metrics.reply_count)
                .platform(PLATFORM_TWITTER)
                .created_at(tweet.created_at.unwrap_or(fetched_at))
                .build()
        })
        .collect()
}

#[async_trait]
impl BaseSocialPlatform for TwitterPlatform {
    async fn fetch_posts(&self, limit: u32) -> Result<Vec<Post>, CallError> {
        let client = &self.client;
        let query = self.query.as_str();

        let response = self
            .caller
            .call(move || async move { client.search_recent(query, limit).await.map_err(classify) })
            .await?;

        let posts = into_posts(response, limit as usize);
        tracing::info!(count = posts.len(), "Fetched posts from Twitter");
        Ok(posts)
    }

    async fn comment_on(&self, post_id: &str, message: &str) -> Result<(), CallError> {
        let client = &self.client;

        self.caller
            .call(move || async move {
                client
                    .reply(post_id, message)
                    .await
                    .map(|_| ())
                    .map_err(classify)
            })
            .await
    }
}
