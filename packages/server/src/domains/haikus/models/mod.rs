pub mod haiku;

pub use haiku::*;
