// Haiku Bot - Core
//
// Reads recent posts from a social platform, turns each into a haiku with a
// hosted language model and replies with it. Each haiku is a small state
// machine advanced by independent scheduled steps; see domains/haikus.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
