//! Haikus domain - the per-post state machine.
//!
//! Each activity is one scheduler step. Steps are safe to run concurrently
//! and repeatedly: every state change goes through a check-and-set on the
//! haiku row, so at most one invocation wins each transition.

pub mod activities;
pub mod error;
pub mod models;

pub use activities::*;
pub use error::HaikuError;
pub use models::{CasOutcome, Haiku, HaikuChange, HaikuState, PostJoin};
