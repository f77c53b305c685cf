//! Typed errors for the registry, probing, and startup configuration.
//!
//! Tool and CLI glue code keeps using [`anyhow`]; these variants exist where
//! callers need to branch on the failure kind (the HTTP layer maps them to
//! status codes).

use thiserror::Error;

/// Result alias for operations that fail with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad enum value or request shape. Surfaced as 400.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown server id. Surfaced as 404.
    #[error("{0}")]
    NotFound(String),

    /// Remote endpoint unreachable or erroring.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A required credential or setting is missing at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl Error {
    pub fn server_not_found() -> Self {
        Error::NotFound("Server not found.".to_string())
    }
}
