//! Persistence backends for [`BaseHaikuStore`](crate::kernel::BaseHaikuStore).
//!
//! - [`PostgresStore`]: production, row locks via `SELECT ... FOR UPDATE`
//! - [`MemoryStore`]: tests and dry runs, one mutex held across check and write

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("post {0} already has a haiku")]
    DuplicateHaiku(String),

    #[error("post {0} does not exist")]
    UnknownPost(String),
}
