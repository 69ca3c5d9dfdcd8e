//! Kernel module - infrastructure, external adapters and dependencies.

pub mod deps;
pub mod rate_limited;
pub mod scheduled_tasks;
pub mod social_platform;
pub mod stores;
pub mod test_dependencies;
pub mod text_generator;
pub mod traits;

pub use deps::ServerDeps;
pub use rate_limited::{CallError, RateLimitedCaller, RetryPolicy, UpstreamFailure};
pub use social_platform::TwitterPlatform;
pub use stores::{MemoryStore, PostgresStore, StoreError};
pub use test_dependencies::{MockSocialPlatform, MockTextGenerator, TestDependencies};
pub use text_generator::HuggingFaceTextGenerator;
pub use traits::*;
