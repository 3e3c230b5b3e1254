//! Error types for Pulse

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Action parameters rejected before anything was persisted
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Caller lacks the permission an action requires
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A lifecycle transition was requested from the wrong status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An action handler failed while executing
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The LLM renderer did not answer within its budget
    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
