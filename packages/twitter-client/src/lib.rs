//! Pure Twitter/X v2 REST API client.
//!
//! A minimal client for the two endpoints the haiku bot needs: recent search
//! and replying to a tweet. One call, one HTTP exchange; rate-limit responses
//! are surfaced with their reset time instead of being waited out here.
//!
//! # Example
//!
//! ```rust,ignore
//! use twitter_client::TwitterClient;
//!
//! let client = TwitterClient::new("user-context-token".into());
//!
//! let results = client.search_recent("software news lang:en -is:retweet", 10).await?;
//! for tweet in &results.data {
//!     client.reply(&tweet.id, "an old silent pond").await?;
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{Result, TwitterError};
pub use types::{CreatedTweet, PublicMetrics, SearchResponse, Tweet, User};

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use types::{ApiResponse, ReplyRequest, ReplyTarget};

const BASE_URL: &str = "https://api.twitter.com/2";

/// Header carrying the unix timestamp at which the rate-limit window resets.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// The recent-search endpoint accepts 10..=100 results per page.
const MIN_RESULTS: u32 = 10;
const MAX_RESULTS: u32 = 100;

#[derive(Clone)]
pub struct TwitterClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl TwitterClient {
    /// `token` is an OAuth 2.0 user-context access token; replies are posted
    /// as that user.
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Search recent tweets, expanding authors so usernames come back in
    /// `includes.users`.
    pub async fn search_recent(&self, query: &str, max_results: u32) -> Result<SearchResponse> {
        let max_results = max_results.clamp(MIN_RESULTS, MAX_RESULTS).to_string();
        let url = format!("{}/tweets/search/recent", self.base_url);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("query", query),
                ("max_results", max_results.as_str()),
                ("sort_order", "relevancy"),
                ("expansions", "author_id"),
                ("tweet.fields", "public_metrics,author_id,created_at"),
                ("user.fields", "username"),
            ])
            .send()
            .await
            .map_err(|e| TwitterError::Network(e.to_string()))?;

        let results: SearchResponse = read_json(resp, StatusCode::OK).await?;
        tracing::debug!(count = results.data.len(), "Fetched recent tweets");
        Ok(results)
    }

    /// Reply to `in_reply_to_tweet_id` with `text`. Twitter answers
    /// `201 Created` on success; anything else is an error.
    pub async fn reply(&self, in_reply_to_tweet_id: &str, text: &str) -> Result<CreatedTweet> {
        let body = ReplyRequest {
            text: text.to_string(),
            reply: ReplyTarget {
                in_reply_to_tweet_id: in_reply_to_tweet_id.to_string(),
            },
        };

        let url = format!("{}/tweets", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| TwitterError::Network(e.to_string()))?;

        let created: ApiResponse<CreatedTweet> = read_json(resp, StatusCode::CREATED).await?;
        tracing::info!(
            tweet_id = %created.data.id,
            in_reply_to = in_reply_to_tweet_id,
            "Posted reply"
        );
        Ok(created.data)
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response, expected: StatusCode) -> Result<T> {
    let status = resp.status();
    let reset_at = parse_reset_header(resp.headers());
    let body = resp
        .text()
        .await
        .map_err(|e| TwitterError::Network(e.to_string()))?;

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(TwitterError::RateLimited { reset_at, body });
    }
    if status.is_server_error() {
        return Err(TwitterError::Unavailable {
            status: status.as_u16(),
            body,
        });
    }
    if status != expected {
        return Err(TwitterError::Api {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| TwitterError::Parse(format!("{}: {}", e, body)))
}

/// Parse `x-rate-limit-reset` (unix seconds). Missing or malformed headers
/// yield `None`.
pub fn parse_reset_header(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let raw = headers.get(RATE_LIMIT_RESET_HEADER)?.to_str().ok()?;
    match raw.trim().parse::<i64>() {
        Ok(secs) => DateTime::from_timestamp(secs, 0),
        Err(e) => {
            tracing::warn!(value = raw, error = %e, "Unparseable rate limit reset header");
            None
        }
    }
}
