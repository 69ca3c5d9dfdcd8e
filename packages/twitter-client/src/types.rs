use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wrapper for single-resource v2 responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Response of `GET /tweets/search/recent`.
///
/// `data` is absent when nothing matched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<Tweet>,
    #[serde(default)]
    pub includes: Includes,
}

impl SearchResponse {
    /// Author id → username side table built from `includes.users`.
    pub fn usernames(&self) -> HashMap<&str, &str> {
        self.includes
            .users
            .iter()
            .map(|u| (u.id.as_str(), u.username.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub public_metrics: PublicMetrics,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicMetrics {
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub retweet_count: i64,
    #[serde(default)]
    pub reply_count: i64,
}

/// Body of `POST /tweets` when replying.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyRequest {
    pub text: String,
    pub reply: ReplyTarget,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyTarget {
    pub in_reply_to_tweet_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedTweet {
    pub id: String,
    pub text: String,
}
