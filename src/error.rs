//! Error types for Livebox
//!
//! All modules use `LiveboxResult<T>` as their return type.
//!
//! `LiveboxError` is `Clone`: a terminal error produced by one in-flight request
//! is handed, unchanged, to every caller attached to that request.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for Livebox operations
pub type LiveboxResult<T> = Result<T, LiveboxError>;

/// Boxed error produced by fetchers and other external collaborators
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors that can occur in Livebox
#[derive(Error, Debug, Clone)]
pub enum LiveboxError {
    // Request construction errors
    #[error("Invalid key \"{key}\": keys must match [a-z0-9_-]{{1,120}}")]
    InvalidKey { key: String },

    // Configuration errors
    #[error("Livebox is not initialized. Call livebox::init() before building requests")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Pipeline errors
    #[error("Converter for {type_name} returned no value for key {key}")]
    Converter { key: String, type_name: &'static str },

    #[error("Fetch failed for key {key} after {attempts} attempt(s): {source}")]
    Fetch {
        key: String,
        attempts: u32,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Could not decode fetched data: {0}")]
    Decode(String),

    // Storage tier errors, absorbed by the orchestrator
    #[error("Storage tier {tier} failed to {operation} key {key}: {reason}")]
    StorageTier {
        tier: String,
        operation: &'static str,
        key: String,
        reason: String,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for LiveboxError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(Arc::new(e))
    }
}

impl LiveboxError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Create a storage tier error
    pub fn tier(
        tier: impl Into<String>,
        operation: &'static str,
        key: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::StorageTier {
            tier: tier.into(),
            operation,
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap a fetcher failure
    pub fn fetch(key: impl Into<String>, attempts: u32, source: BoxError) -> Self {
        Self::Fetch {
            key: key.into(),
            attempts,
            source: Arc::from(source),
        }
    }

    /// Check if error is retryable
    ///
    /// Only fetch failures are worth another attempt. Converter and
    /// configuration errors are data or wiring bugs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::HttpStatus { .. } | Self::Io { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Call livebox::init(config, serializer) at startup"),
            Self::InvalidKey { .. } => {
                Some("Use lowercase letters, digits, '_' or '-', at most 120 characters")
            }
            Self::ConfigInvalid { .. } => Some("Run: livebox config show"),
            _ => None,
        }
    }
}
