//! Error types for sluice.

pub mod unified;

pub use unified::ErrorCategory;

use thiserror::Error;

/// Primary error type for all sluice operations.
#[derive(Error, Debug)]
pub enum SluiceError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend error ({kind}): {message}")]
    Backend { kind: String, message: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),
}

impl SluiceError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an error reported by the backend inside the stream.
    pub fn backend(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) | Self::Transport(_) => ErrorCategory::Network,
            Self::Configuration(_) | Self::ConfigFile(_) | Self::UnsupportedBackend(_) => {
                ErrorCategory::Configuration
            }
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::Backend { .. } => ErrorCategory::Backend,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether the outer caller may retry the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SluiceError>;
