//! HTTP request handlers.

pub mod health;
pub mod private;
pub mod sources;

pub use health::*;
pub use sources::*;
