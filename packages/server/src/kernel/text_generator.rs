//! Hugging Face implementation of [`BaseTextGenerator`].

use async_trait::async_trait;
use huggingface_client::{HuggingFaceClient, HuggingFaceError};
use std::num::NonZeroU32;
use std::time::Duration;

use crate::kernel::rate_limited::{CallError, RateLimitedCaller, RetryPolicy, UpstreamFailure};
use crate::kernel::BaseTextGenerator;

/// Marks where the prompt ends in the generated text.
pub const REQUEST_END: &str = "<RequestEnd>";

/// Hugging Face's free tier: 10 requests per minute.
const REQUESTS_PER_WINDOW: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => unreachable!(),
};
const WINDOW: Duration = Duration::from_secs(60);

pub fn haiku_prompt(summary: &str) -> String {
    format!(
        "Generate a haiku in a strict 5-7-5 syllable format based on the following summary:\n\t\"{}\"\n\tReturn only the haiku and nothing else.{}",
        summary, REQUEST_END
    )
}

/// The model echoes the prompt; the haiku is whatever follows the marker.
pub fn extract_haiku(generated: &str) -> Option<&str> {
    generated
        .split_once(REQUEST_END)
        .map(|(_, haiku)| haiku.trim())
        .filter(|haiku| !haiku.is_empty())
}

pub struct HuggingFaceTextGenerator {
    client: HuggingFaceClient,
    caller: RateLimitedCaller,
}

impl HuggingFaceTextGenerator {
    pub fn new(client: HuggingFaceClient) -> Self {
        let caller = RateLimitedCaller::new(
            "huggingface",
            REQUESTS_PER_WINDOW,
            WINDOW,
            RetryPolicy::huggingface(),
        );
        Self::with_caller(client, caller)
    }

    pub fn with_caller(client: HuggingFaceClient, caller: RateLimitedCaller) -> Self {
        Self { client, caller }
    }
}

fn classify(err: HuggingFaceError) -> UpstreamFailure {
    match err {
        HuggingFaceError::RateLimited(body) => UpstreamFailure::RateLimited {
            reset_at: None,
            message: format!("Hugging Face rate limit: {}", body),
        },
        HuggingFaceError::Api { status, .. } if status >= 500 => {
            UpstreamFailure::Transient(err.to_string())
        }
        err if err.is_transient() => UpstreamFailure::Transient(err.to_string()),
        err => UpstreamFailure::Fatal(err.to_string()),
    }
}

#[async_trait]
impl BaseTextGenerator for HuggingFaceTextGenerator {
    async fn generate_summary(&self, text: &str) -> Result<String, CallError> {
        let client = &self.client;
        let summary = self
            .caller
            .call(move || async move { client.summarize(text).await.map_err(classify) })
            .await?;

        Ok(summary.trim().to_string())
    }

    async fn generate_haiku(&self, summary: &str) -> Result<String, CallError> {
        let client = &self.client;
        let prompt = haiku_prompt(summary);
        let prompt = prompt.as_str();

        self.caller
            .call(move || async move {
                let generated = client.generate(prompt).await.map_err(classify)?;
                extract_haiku(&generated)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        UpstreamFailure::Fatal(format!(
                            "no haiku after {} in model output",
                            REQUEST_END
                        ))
                    })
            })
            .await
    }
}
