//! Server dependencies for activities (using traits for testability)
//!
//! Every step receives a `&ServerDeps`. External services and persistence sit
//! behind `Base*` traits so tests can swap in the memory store and mocks.

use anyhow::{Context, Result};
use huggingface_client::HuggingFaceClient;
use sqlx::PgPool;
use std::sync::Arc;
use twitter_client::TwitterClient;

use crate::config::{Config, PipelineSettings, SocialPlatformKind};
use crate::kernel::social_platform::TwitterPlatform;
use crate::kernel::stores::PostgresStore;
use crate::kernel::test_dependencies::MockSocialPlatform;
use crate::kernel::text_generator::HuggingFaceTextGenerator;
use crate::kernel::{BaseHaikuStore, BaseSocialPlatform, BaseTextGenerator};

#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseHaikuStore>,
    pub text_generator: Arc<dyn BaseTextGenerator>,
    pub social_platform: Arc<dyn BaseSocialPlatform>,
    pub settings: PipelineSettings,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn BaseHaikuStore>,
        text_generator: Arc<dyn BaseTextGenerator>,
        social_platform: Arc<dyn BaseSocialPlatform>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            text_generator,
            social_platform,
            settings,
        }
    }

    /// Production wiring: Postgres, Hugging Face, and Twitter or the canned
    /// platform depending on `SOCIAL_PLATFORM`.
    pub fn from_config(config: &Config, pool: PgPool) -> Result<Self> {
        let text_generator =
            HuggingFaceTextGenerator::new(HuggingFaceClient::new(&config.huggingface_api_key));

        let social_platform: Arc<dyn BaseSocialPlatform> = match config.social_platform {
            SocialPlatformKind::Twitter => {
                let token = config
                    .twitter_bearer_token
                    .clone()
                    .context("TWITTER_BEARER_TOKEN must be set")?;
                Arc::new(TwitterPlatform::new(
                    TwitterClient::new(token),
                    &config.twitter_search_query,
                ))
            }
            SocialPlatformKind::Mock => {
                tracing::warn!("Using canned social platform; nothing will be posted");
                Arc::new(MockSocialPlatform::with_sample_posts())
            }
        };

        Ok(Self::new(
            Arc::new(PostgresStore::new(pool)),
            Arc::new(text_generator),
            social_platform,
            config.pipeline.clone(),
        ))
    }
}
