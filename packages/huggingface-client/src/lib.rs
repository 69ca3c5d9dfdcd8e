//! Pure Hugging Face Inference REST API client
//!
//! A minimal client for hosted inference models with no domain-specific logic.
//! Each call performs exactly one HTTP exchange and classifies the outcome;
//! retries and rate limiting are the caller's business.
//!
//! # Example
//!
//! ```rust,ignore
//! use huggingface_client::HuggingFaceClient;
//!
//! let client = HuggingFaceClient::from_env()?;
//!
//! let summary = client.summarize("Oracle unveils new AI agents ...").await?;
//! let text = client.generate("Write a haiku about Rust").await?;
//! ```

pub mod error;
pub mod types;

pub use error::{HuggingFaceError, Result};
pub use types::{InferenceOutput, InferenceRequest};

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Abstractive summarization model.
pub const SUMMARY_MODEL: &str = "google/pegasus-xsum";

/// Instruction-tuned text generation model.
pub const GENERATION_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";

/// Pure Hugging Face Inference API client.
#[derive(Clone)]
pub struct HuggingFaceClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl HuggingFaceClient {
    /// Create a new client with the given API token.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from environment variable `HUGGINGFACE_API_KEY`.
    pub fn from_env() -> std::result::Result<Self, std::env::VarError> {
        std::env::var("HUGGINGFACE_API_KEY").map(Self::new)
    }

    /// Set a custom base URL (for proxies, dedicated endpoints, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Summarize text with [`SUMMARY_MODEL`].
    pub async fn summarize(&self, text: &str) -> Result<String> {
        self.run_model(SUMMARY_MODEL, text).await
    }

    /// Generate text from a prompt with [`GENERATION_MODEL`].
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        self.run_model(GENERATION_MODEL, prompt).await
    }

    /// Run any hosted model and return the first produced text.
    pub async fn run_model(&self, model: &str, inputs: &str) -> Result<String> {
        let start = std::time::Instant::now();

        let response = self
            .http_client
            .post(format!("{}/models/{}", self.base_url, model))
            .bearer_auth(&self.api_key)
            .json(&InferenceRequest::new(inputs))
            .send()
            .await
            .map_err(|e| {
                warn!(model, error = %e, "Hugging Face request failed");
                HuggingFaceError::Network(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HuggingFaceError::Network(e.to_string()))?;

        debug!(
            model,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis(),
            "Hugging Face inference response"
        );

        match status {
            StatusCode::OK => parse_output(&body),
            StatusCode::TOO_MANY_REQUESTS => Err(HuggingFaceError::RateLimited(body)),
            StatusCode::SERVICE_UNAVAILABLE => Err(HuggingFaceError::Unavailable {
                status: status.as_u16(),
                body,
            }),
            _ => Err(HuggingFaceError::Api {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

fn parse_output(body: &str) -> Result<String> {
    let outputs: Vec<InferenceOutput> = serde_json::from_str(body)
        .map_err(|_| HuggingFaceError::Parse(format!("could not parse response: {}", body)))?;

    outputs
        .first()
        .and_then(InferenceOutput::text)
        .map(str::to_string)
        .ok_or_else(|| HuggingFaceError::Parse(body.to_string()))
}
