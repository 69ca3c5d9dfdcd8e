//! Posts domain - ingestion of social platform posts.

pub mod activities;
pub mod error;
pub mod models;

pub use activities::{fetch_and_save, FetchOutcome};
pub use error::IngestError;
pub use models::{Author, FetchQuota, Post, PLATFORM_TWITTER};
