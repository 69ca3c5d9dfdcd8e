pub mod fetch_quota;
pub mod post;

pub use fetch_quota::*;
pub use post::*;
