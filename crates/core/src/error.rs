//! Error types shared by the vkframe crates.

use thiserror::Error;

/// Main error type for configuration and setup.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration value out of range or inconsistent
    #[error("Config error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
