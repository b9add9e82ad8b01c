//! Error types for parse-storage.

/// Result type alias for parse-storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for parse-storage operations.
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
}

/// The kind of error that occurred.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Stored value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Store location could not be determined.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(ErrorKind::Io(err.to_string()), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::Serialization(err.to_string()), err)
    }
}

impl From<Error> for busbar_parse_client::Error {
    fn from(err: Error) -> Self {
        busbar_parse_client::Error::with_source(
            busbar_parse_client::ErrorKind::Storage(err.kind.to_string()),
            err,
        )
    }
}
