//! Error types shared by every parse-* crate.
//!
//! All failures are normalized into [`Error`] before they cross a crate
//! boundary, so callers never see raw transport or decoding errors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result type alias for parse-client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes returned by Parse Server that the SDK interprets.
pub mod codes {
    /// Generic internal server error.
    pub const INTERNAL_SERVER_ERROR: i32 = 1;
    /// The connection to the server failed.
    pub const CONNECTION_FAILED: i32 = 100;
    /// The requested object does not exist.
    pub const OBJECT_NOT_FOUND: i32 = 101;
    /// The session token is no longer valid.
    pub const INVALID_SESSION_TOKEN: i32 = 209;
    /// The username is already taken.
    pub const USERNAME_TAKEN: i32 = 202;
}

/// Error type for parse-client operations.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional source error.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Create a new error with the given kind and source.
    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }

    /// Shorthand for an encoding failure.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Encoding(message.into()))
    }

    /// Shorthand for a decoding failure.
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decoding(message.into()))
    }

    /// Shorthand for a missing identifier.
    pub fn missing_identifier(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingIdentifier(what.into()))
    }

    /// Returns true if this error is retryable at the transport level.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns true if the server reported that the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::ObjectNotFound(_))
            || self.server_code() == Some(codes::OBJECT_NOT_FOUND)
    }

    /// Returns the server error code, if this error came from the server.
    pub fn server_code(&self) -> Option<i32> {
        match &self.kind {
            ErrorKind::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns the retry-after duration if this is a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match &self.kind {
            ErrorKind::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// A fresh error of the same kind, without the source.
    ///
    /// Used where one failure must be reported for several items.
    pub fn replicate(&self) -> Self {
        Self::new(self.kind.clone())
    }

    /// Build an error from a server error payload.
    pub fn from_payload(payload: ServerErrorPayload) -> Self {
        if payload.code == codes::OBJECT_NOT_FOUND {
            return Self::new(ErrorKind::ObjectNotFound(payload.message));
        }
        Self::new(ErrorKind::Server {
            code: payload.code,
            message: payload.message,
        })
    }
}

/// The kind of error that occurred.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ErrorKind {
    /// An update, replace, delete or fetch was attempted without an objectId.
    #[error("Missing identifier: {0}")]
    MissingIdentifier(String),

    /// Deep-save found unsaved objects that depend on each other.
    #[error("Circular dependency: {0}")]
    CircularDependency(String),

    /// A transactional save was requested while nested children are unsaved.
    #[error("{count} unsaved child object(s) must be saved before a transaction")]
    UnsavedChildrenInTransaction { count: usize },

    /// A transactional batch exceeds the configured size limit.
    #[error("Batch of {size} exceeds the limit of {limit} for a transaction")]
    BatchTooLarge { size: usize, limit: usize },

    /// A fetch found no matching record.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Payload could not be serialized.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Payload could not be deserialized.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// The network executor failed (DNS, connection, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Rate limit exceeded (HTTP 429).
    #[error("Rate limited{}", retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// The server returned a structured error payload.
    #[error("Server error {code}: {message}")]
    Server { code: i32, message: String },

    /// No current user and automatic login is disabled.
    #[error("There is no current user")]
    NoCurrentUser,

    /// No current installation has been created or loaded.
    #[error("There is no current installation")]
    NoCurrentInstallation,

    /// No config has been fetched or saved yet.
    #[error("There is no current config")]
    NoCurrentConfig,

    /// Durable key-value storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// All retries exhausted.
    #[error("All {attempts} retry attempts exhausted")]
    RetriesExhausted { attempts: u32 },

    /// Wrapped external cause.
    #[error("{0}")]
    Other(String),
}

impl ErrorKind {
    /// Returns true if this error kind is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorKind::RateLimited { .. } => true,
            ErrorKind::Transport(_) => true,
            ErrorKind::Server { code, .. } => {
                matches!(*code, codes::INTERNAL_SERVER_ERROR | codes::CONNECTION_FAILED)
            }
            _ => false,
        }
    }
}

/// Error body returned by the server: `{"code": 101, "error": "..."}`.
///
/// Some deployments send `message` instead of `error`; both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorPayload {
    pub code: i32,
    #[serde(rename = "error", alias = "message")]
    pub message: String,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Transport("request timed out".to_string())
        } else if err.is_connect() {
            ErrorKind::Transport(format!("connection failed: {}", err))
        } else if err.is_decode() {
            ErrorKind::Decoding(err.to_string())
        } else {
            ErrorKind::Transport(err.to_string())
        };

        Error::with_source(kind, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        // Encoders map their own failures; a bare conversion is a decode.
        Error::with_source(ErrorKind::Decoding(err.to_string()), err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::with_source(ErrorKind::InvalidUrl(err.to_string()), err)
    }
}
