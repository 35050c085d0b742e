//! Error types for bus client operations

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// Connecting failed, or the connection is in the wrong state to connect
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Message content or subject failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operation not allowed in the current lifecycle state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Unknown message template: '{0}'")]
    UnknownTemplate(String),

    /// Middleware failure during publish, subscribe or receive
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Types(#[from] types::TypesError),
}

impl From<config::ConfigError> for BusError {
    fn from(err: config::ConfigError) -> Self {
        BusError::Config(err.to_string())
    }
}

/// Result type for bus client operations
pub type BusResult<T> = Result<T, BusError>;
