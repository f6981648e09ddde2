// src/error.rs

//! Unified error handling for the ingestion pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or a request could not be formed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Case identifier does not have exactly 20 digits
    #[error("Invalid case identifier '{input}': expected 20 digits, found {digits}")]
    InvalidIdentifier { input: String, digits: usize },

    /// Jurisdiction index is not recognised by the source
    #[error("Unknown source index '{0}'")]
    UnknownSourceIndex(String),

    /// No adapter is registered for the requested source, or it lacks the operation
    #[error("Source '{source_tag}' does not support {operation}")]
    UnsupportedSource {
        source_tag: String,
        operation: String,
    },

    /// Upstream adapter failure
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Workflow action not allowed from the current status
    #[error("Cannot move event from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Persistence backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Referenced record does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Create a not-found error.
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Create an unsupported-operation error for a source.
    pub fn unsupported(source_tag: impl fmt::Display, operation: impl Into<String>) -> Self {
        Self::UnsupportedSource {
            source_tag: source_tag.to_string(),
            operation: operation.into(),
        }
    }

    /// Whether this error was raised while validating caller-supplied input.
    ///
    /// Such errors propagate to the caller instead of being folded into a
    /// sync run.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier { .. }
                | Self::UnknownSourceIndex(_)
                | Self::UnsupportedSource { .. }
                | Self::NotFound { .. }
        )
    }
}

/// Failure reported by an upstream source adapter.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Credentials missing or rejected
    #[error("authentication rejected by upstream (status {status})")]
    Auth { status: u16 },

    /// Upstream throttled the client and retries were exhausted
    #[error("rate limited by upstream (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Upstream returned an unexpected status
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Network-level failure (connect, timeout, TLS)
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// Payload could not be decoded
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Short label used in sync run error detail.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Auth { .. } => "auth",
            SourceError::RateLimited { .. } => "rate_limit",
            SourceError::Upstream { .. } => "upstream",
            SourceError::Transport(_) => "transport",
            SourceError::Malformed(_) => "malformed",
        }
    }

    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::RateLimited { .. } => true,
            SourceError::Upstream { status, .. } => *status >= 500,
            SourceError::Transport(e) => e.is_timeout() || e.is_connect(),
            SourceError::Auth { .. } | SourceError::Malformed(_) => false,
        }
    }

    /// Create a malformed-payload error.
    pub fn malformed(message: impl fmt::Display) -> Self {
        Self::Malformed(message.to_string())
    }
}

impl From<zip::result::ZipError> for SourceError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Malformed(format!("bundle archive: {err}"))
    }
}
