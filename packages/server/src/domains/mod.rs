// Business domains
pub mod haikus;
pub mod posts;
