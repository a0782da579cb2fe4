//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid gem name: {0}")]
    InvalidGemName(String),

    #[error("invalid gem version: {0}")]
    InvalidVersion(String),

    #[error("invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("invalid gem full name: {0}")]
    InvalidFullName(String),

    #[error("invalid gem archive: {0}")]
    InvalidArchive(String),

    #[error("invalid gem specification: {0}")]
    InvalidSpec(String),

    #[error("invalid authorization: {0}")]
    InvalidAuthorization(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
