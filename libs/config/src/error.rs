//! Error types for configuration loading

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A named CONFIG section was requested but the file does not define it
    #[error("Named configuration could not be found: {0}")]
    NotFound(String),

    /// The XML document is malformed or not a configuration document
    #[error("Configuration parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },

    #[error("Failed to read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn parse(position: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
