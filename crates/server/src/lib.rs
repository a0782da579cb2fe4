//! HTTP server for the gemvault private gem source.
//!
//! This crate provides:
//! - Gem source selection by path prefix
//! - The private source endpoints (push, yank, unyank, fetch, indexes)
//! - The authorization-key gate with `WWW-Authenticate` challenges
//! - Spec index and dependency API generation
//! - Health, metrics and bootstrap-key setup

pub mod auth;
pub mod bootstrap;
pub mod dependencies;
pub mod error;
pub mod handlers;
pub mod index;
pub mod lifecycle;
pub mod matcher;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::{Authorizer, TraceId};
pub use error::{ApiError, ApiResult};
pub use matcher::{GemSource, PathMatcher};
pub use routes::create_router;
pub use state::AppState;
