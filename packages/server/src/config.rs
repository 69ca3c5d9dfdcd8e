use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::kernel::social_platform::DEFAULT_SEARCH_QUERY;

/// Which social platform implementation to wire up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocialPlatformKind {
    #[default]
    Twitter,
    /// Canned posts, comments only logged. For dry runs.
    Mock,
}

impl FromStr for SocialPlatformKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitter" => Ok(Self::Twitter),
            "mock" => Ok(Self::Mock),
            other => bail!("unknown social platform {:?} (expected twitter or mock)", other),
        }
    }
}

/// Cron expressions (with seconds) for each scheduled step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub fetch: String,
    pub create: String,
    pub summary: String,
    pub haiku_text: String,
    pub posting: String,
    pub stale_leases: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fetch: "0 0 18 * * Tue".to_string(),
            create: "0 * * * * *".to_string(),
            summary: "30 */2 * * * *".to_string(),
            haiku_text: "0 */2 * * * *".to_string(),
            posting: "0 0 */3 * * *".to_string(),
            stale_leases: "0 */5 * * * *".to_string(),
        }
    }
}

/// Knobs the steps read at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Posts requested per fetch.
    pub fetch_limit: u32,
    /// Fetch calls allowed per UTC month.
    pub monthly_fetch_limit: u32,
    /// How long a haiku may sit in a transitional state before it is failed.
    /// `None` disables the sweep.
    pub lease_timeout: Option<Duration>,
    /// Upper bound on one external call, retries included. Kept below
    /// `lease_timeout` so the sweep never fails a haiku whose call is live.
    pub call_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch_limit: 10,
            monthly_fetch_limit: 100,
            lease_timeout: Some(Duration::from_secs(30 * 60)),
            call_timeout: Duration::from_secs(20 * 60),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub huggingface_api_key: String,
    pub social_platform: SocialPlatformKind,
    pub twitter_bearer_token: Option<String>,
    pub twitter_search_query: String,
    pub pipeline: PipelineSettings,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let social_platform = match lookup("SOCIAL_PLATFORM") {
            Some(value) => value.parse().context("SOCIAL_PLATFORM is invalid")?,
            None => SocialPlatformKind::default(),
        };

        let twitter_bearer_token = lookup("TWITTER_BEARER_TOKEN");
        if social_platform == SocialPlatformKind::Twitter && twitter_bearer_token.is_none() {
            bail!("TWITTER_BEARER_TOKEN must be set (or SOCIAL_PLATFORM=mock)");
        }

        let defaults = PipelineSettings::default();
        let lease_minutes: u64 = parse_or(&lookup, "HAIKU_LEASE_TIMEOUT_MINUTES", 30)?;
        let lease_timeout = match lease_minutes {
            0 => None,
            minutes => Some(
                minutes_to_duration(minutes).context("HAIKU_LEASE_TIMEOUT_MINUTES is invalid")?,
            ),
        };

        let call_minutes: u64 = parse_or(&lookup, "HAIKU_CALL_TIMEOUT_MINUTES", 20)?;
        if call_minutes == 0 {
            bail!("HAIKU_CALL_TIMEOUT_MINUTES must be greater than 0");
        }
        let call_timeout =
            minutes_to_duration(call_minutes).context("HAIKU_CALL_TIMEOUT_MINUTES is invalid")?;
        if let Some(lease) = lease_timeout {
            if lease <= call_timeout {
                bail!(
                    "HAIKU_LEASE_TIMEOUT_MINUTES ({}) must be greater than HAIKU_CALL_TIMEOUT_MINUTES ({})",
                    lease_minutes,
                    call_minutes
                );
            }
        }

        let schedule_defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            fetch: lookup("SCHEDULE_FETCH").unwrap_or(schedule_defaults.fetch),
            create: lookup("SCHEDULE_CREATE").unwrap_or(schedule_defaults.create),
            summary: lookup("SCHEDULE_SUMMARY").unwrap_or(schedule_defaults.summary),
            haiku_text: lookup("SCHEDULE_HAIKU_TEXT").unwrap_or(schedule_defaults.haiku_text),
            posting: lookup("SCHEDULE_POSTING").unwrap_or(schedule_defaults.posting),
            stale_leases: lookup("SCHEDULE_STALE_LEASES").unwrap_or(schedule_defaults.stale_leases),
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").context("DATABASE_URL must be set")?,
            huggingface_api_key: lookup("HUGGINGFACE_API_KEY")
                .context("HUGGINGFACE_API_KEY must be set")?,
            social_platform,
            twitter_bearer_token,
            twitter_search_query: lookup("TWITTER_SEARCH_QUERY")
                .unwrap_or_else(|| DEFAULT_SEARCH_QUERY.to_string()),
            pipeline: PipelineSettings {
                fetch_limit: parse_or(&lookup, "FETCH_LIMIT", defaults.fetch_limit)?,
                monthly_fetch_limit: parse_or(
                    &lookup,
                    "MONTHLY_FETCH_LIMIT",
                    defaults.monthly_fetch_limit,
                )?,
                lease_timeout,
                call_timeout,
            },
            schedule,
        })
    }
}

/// Minutes to a `Duration`, refusing values whose seconds overflow `u64`.
pub fn minutes_to_duration(minutes: u64) -> Result<Duration> {
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .with_context(|| format!("{} minutes is out of range", minutes))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}
