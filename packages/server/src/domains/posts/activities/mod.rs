//! Posts domain activities - entry-point business logic
//!
//! Called from the scheduler and the admin CLI.

pub mod fetch_and_save;

pub use fetch_and_save::{fetch_and_save, FetchOutcome};
