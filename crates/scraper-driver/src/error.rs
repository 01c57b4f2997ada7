//! Error type for driver operations

/// Error surfaced by the upstream client.
///
/// The client library is opaque, so the only reliable contract is the error
/// text itself; the orchestrator classifies failures by substring-matching
/// the message. Variants would over-promise structure the driver does not
/// guarantee, hence a plain message carrier.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for DriverError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for DriverError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Result alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
