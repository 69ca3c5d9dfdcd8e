//! Typed ID definitions for domain entities.
//!
//! Posts keep the platform-assigned string id, so only haikus get a typed
//! UUID.

pub use super::id::Id;

/// Marker type for Haiku entities.
pub struct Haiku;

/// Typed ID for Haiku entities.
pub type HaikuId = Id<Haiku>;
