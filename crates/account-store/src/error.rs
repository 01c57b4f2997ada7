//! Error types for registry operations

/// Errors from account registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("account file parse error: {0}")]
    Parse(String),

    #[error("account not found: {0}")]
    NotFound(String),

    #[error("account already exists: {0}")]
    Conflict(String),
}

/// Result alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;
