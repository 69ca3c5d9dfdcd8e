//! Rate-limited, retrying caller for outbound API calls.
//!
//! Every external capability goes through a [`RateLimitedCaller`]. It holds a
//! governor token bucket (steady rate, burst 1) and a [`RetryPolicy`]:
//!
//! ```text
//! until_ready() ─► attempt ─► Ok ──────────────────────────────► value
//!       ▲             │
//!       │             ├─► Fatal ───────────────────────────────► CallError::Upstream
//!       │             ├─► RateLimited { reset_at: Some(t) } ──► sleep(t - now), no backoff step
//!       └─────────────┴─► Transient / RateLimited { None } ───► sleep(backoff), delay *= multiplier
//! ```
//!
//! Dropping the returned future aborts whatever is pending: the limiter wait,
//! the in-flight request or the sleep.

use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// How a single attempt failed, as classified by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFailure {
    /// Network error or 5xx. Retried with backoff.
    Transient(String),
    /// Explicit rejection by the remote rate limiter.
    RateLimited {
        reset_at: Option<DateTime<Utc>>,
        message: String,
    },
    /// Anything a retry cannot fix (4xx, unexpected response format).
    Fatal(String),
}

impl UpstreamFailure {
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(message) | Self::Fatal(message) => message,
            Self::RateLimited { message, .. } => message,
        }
    }

    fn into_call_error(self, attempts: u32) -> CallError {
        match self {
            Self::RateLimited { message, .. } => CallError::RateLimitExceeded { attempts, message },
            Self::Transient(message) | Self::Fatal(message) => {
                CallError::Upstream { attempts, message }
            }
        }
    }
}

/// Terminal failure of a rate-limited call, after retries are exhausted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("rate limit exceeded after {attempts} attempt(s): {message}")]
    RateLimitExceeded { attempts: u32, message: String },

    #[error("upstream error after {attempts} attempt(s): {message}")]
    Upstream { attempts: u32, message: String },

    /// The caller gave up waiting; retries may still have been pending.
    #[error("call timed out after {0:?}")]
    TimedOut(Duration),
}

impl CallError {
    /// Attempts made, or 0 when the call was abandoned from outside.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::RateLimitExceeded { attempts, .. } | Self::Upstream { attempts, .. } => *attempts,
            Self::TimedOut(_) => 0,
        }
    }
}

/// Retry settings for one external service.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts that count against the backoff budget, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Upper bound for a single wait on a server-provided reset time.
    pub max_reset_wait: Duration,
    /// How many reset-time waits a call may take before rate limits fall back
    /// to the backoff sequence.
    pub max_rate_limit_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_reset_wait: Duration::from_secs(15 * 60),
            max_rate_limit_waits: 3,
        }
    }
}

impl RetryPolicy {
    /// Hugging Face Inference: 5 attempts from 1s, doubling.
    pub fn huggingface() -> Self {
        Self {
            max_attempts: 5,
            ..Self::default()
        }
    }

    /// Twitter: 3 attempts from 1s, doubling; honours `x-rate-limit-reset`.
    pub fn twitter() -> Self {
        Self::default()
    }

    /// Longest a single call can spend sleeping between attempts, not
    /// counting limiter waits or the requests themselves.
    pub fn worst_case_sleep(&self) -> Duration {
        let resets = self.max_reset_wait * self.max_rate_limit_waits;
        let mut backoff = Duration::ZERO;
        let mut delay = self.initial_delay;
        for _ in 1..self.max_attempts {
            backoff += delay;
            delay = self.next_delay(delay);
        }
        resets + backoff
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.multiplier).min(self.max_delay)
    }
}

/// Quota admitting `requests` per `window` with burst 1.
///
/// A zero window falls back to `requests` per second.
pub fn quota_per_window(requests: NonZeroU32, window: Duration) -> Quota {
    Quota::with_period(window / requests.get())
        .unwrap_or_else(|| Quota::per_second(requests))
        .allow_burst(NonZeroU32::MIN)
}

/// Token bucket plus retry loop around an outbound call.
///
/// Clones share the same bucket.
#[derive(Clone)]
pub struct RateLimitedCaller {
    name: &'static str,
    limiter: Arc<DefaultRateLimiter>,
    policy: RetryPolicy,
}

impl RateLimitedCaller {
    pub fn new(name: &'static str, requests: NonZeroU32, window: Duration, policy: RetryPolicy) -> Self {
        Self::with_quota(name, quota_per_window(requests, window), policy)
    }

    pub fn with_quota(name: &'static str, quota: Quota, policy: RetryPolicy) -> Self {
        Self {
            name,
            limiter: Arc::new(RateLimiter::direct(quota)),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `attempt` until it succeeds, fails fatally or the retry budget is
    /// spent. Every attempt waits for a token first.
    pub async fn call<T, F, Fut>(&self, mut attempt: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamFailure>>,
    {
        let mut attempts = 0u32;
        let mut backoff_steps = 0u32;
        let mut reset_waits = 0u32;
        let mut delay = self.policy.initial_delay;

        loop {
            self.limiter.until_ready().await;
            attempts += 1;

            let failure = match attempt().await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            if let UpstreamFailure::Fatal(message) = failure {
                tracing::warn!(service = self.name, attempt = attempts, error = %message, "Upstream call failed, not retrying");
                return Err(CallError::Upstream { attempts, message });
            }

            if let UpstreamFailure::RateLimited {
                reset_at: Some(reset_at),
                ..
            } = &failure
            {
                if reset_waits < self.policy.max_rate_limit_waits {
                    reset_waits += 1;
                    let wait = self.reset_wait(*reset_at);
                    tracing::warn!(
                        service = self.name,
                        attempt = attempts,
                        delay_ms = wait.as_millis() as u64,
                        "Rate limited, waiting for reset"
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
            }

            backoff_steps += 1;
            if backoff_steps >= self.policy.max_attempts {
                tracing::warn!(
                    service = self.name,
                    attempts,
                    error = failure.message(),
                    "Retries exhausted"
                );
                return Err(failure.into_call_error(attempts));
            }

            tracing::warn!(
                service = self.name,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = failure.message(),
                "Retrying upstream call"
            );
            tokio::time::sleep(delay).await;
            delay = self.policy.next_delay(delay);
        }
    }

    fn reset_wait(&self, reset_at: DateTime<Utc>) -> Duration {
        (reset_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(self.policy.max_reset_wait)
    }
}
