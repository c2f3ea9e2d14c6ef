use std::path::PathBuf;

/// Boxed error produced by a binding backend.
///
/// The facade never wraps or rewrites these; callers downcast to the
/// backend's concrete error type when they need its shape.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fixed identifier prefixed to every [`StorageError`] message.
pub const NAMESPACE: &str = "stowage";

/// Binding resolution or capability validation failure.
///
/// Displays as `[stowage] [<driver>] <message>`. The optional cause is
/// reachable through [`std::error::Error::source`] and is not part of the
/// message.
#[derive(Debug, thiserror::Error)]
#[error("[{namespace}] [{driver}] {message}", namespace = NAMESPACE)]
pub struct StorageError {
    driver: String,
    message: String,
    #[source]
    cause: Option<BoxError>,
}

impl StorageError {
    pub fn new(driver: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Attach an underlying cause.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

/// Result alias for binding resolution.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from item operations against a bucket.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The binding could not be resolved or lacks a capability.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The backend failed during the operation. Passed through as raised.
    #[error(transparent)]
    Backend(BoxError),

    /// A JSON item could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns the backend's own error when this is a backend failure.
    pub fn backend(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Backend(err) => Some(&**err),
            _ => None,
        }
    }
}

/// Result alias for item operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while loading configuration or building an environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("binding `{name}`: {reason}")]
    InvalidBinding { name: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
