//! Error types for msolap.

use thiserror::Error;

use crate::provider::ProviderError;

/// The main error type for msolap operations.
#[derive(Debug, Error)]
pub enum MsolapError {
    /// Endpoint unreachable, credentials rejected, or property set refused.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A provider interface call failed (query compile, metadata, accessor).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Row fetch or row read failed after a successful execute.
    #[error("Data error: {0}")]
    Data(String),

    /// API misuse by the caller.
    #[error("Contract violation: {0}")]
    Contract(String),

    /// The session has been closed or was never opened.
    #[error("Session is not connected")]
    NotConnected,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MsolapError {
    /// Connection failure with the provider's native text embedded.
    pub fn connection(context: &str, err: &ProviderError) -> Self {
        Self::Connection(format!("{}: {}", context, err))
    }

    /// Protocol failure with the provider's native text embedded.
    pub fn protocol(context: &str, err: &ProviderError) -> Self {
        Self::Protocol(format!("{}: {}", context, err))
    }

    /// Data failure with the provider's native text embedded.
    pub fn data(context: &str, err: &ProviderError) -> Self {
        Self::Data(format!("{}: {}", context, err))
    }

    /// Create a contract violation.
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract(message.into())
    }

    /// True for errors that indicate a bug in the caller.
    pub fn is_contract(&self) -> bool {
        matches!(self, Self::Contract(_))
    }
}

/// Result type alias for msolap operations.
pub type MsolapResult<T> = Result<T, MsolapError>;
