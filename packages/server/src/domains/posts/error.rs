use thiserror::Error;

use crate::kernel::stores::StoreError;
use crate::kernel::CallError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetching posts failed: {0}")]
    Fetch(#[from] CallError),

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("ingestion cancelled")]
    Cancelled,
}
