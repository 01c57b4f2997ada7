//! Error types for orchestrator setup
//!
//! Dispatch itself never surfaces errors to callers (it returns `None` and
//! logs); these variants cover initialization — loading the configuration
//! and proxy files — and the registry passthrough used by admin
//! collaborators.

/// Errors from orchestrator setup and registry passthrough.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("config parse error: {0}")]
    Toml(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("registry error: {0}")]
    Store(#[from] account_store::Error),
}

/// Result alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;
