//! # parse-client
//!
//! Core HTTP client infrastructure for Parse Server REST APIs.
//!
//! This crate provides the transport-facing half of the SDK:
//! - Server configuration (application id, keys, mount path, batch limit)
//! - The closed error taxonomy shared by every higher-level crate
//! - Transport-independent request/response descriptors
//! - The [`NetworkExecutor`] seam plus a reqwest-backed implementation
//! - Upload/download progress sinks dispatched onto a caller-chosen runtime
//! - Query-string escaping rules expected by Parse Server
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application Layer                        │
//! │  (parse-rest: objects, batches, deep-save, users, config)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  HttpRequest
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  dyn NetworkExecutor                        │
//! │  - HttpExecutor (reqwest, optional retry, progress)         │
//! │  - MockExecutor (feature = "testing")                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  HttpResponse
//!                              ▼
//!                        Parse Server
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use busbar_parse_client::{ClientConfig, HttpExecutor, HttpRequest, NetworkExecutor, RequestMethod};
//!
//! let executor = HttpExecutor::new(ClientConfig::default())?;
//! let response = executor
//!     .execute(HttpRequest::new(RequestMethod::Get, "http://localhost:1337/parse/health"))
//!     .await?;
//! assert!(response.is_success());
//! ```

mod client;
mod config;
mod error;
mod executor;
mod progress;
mod request;
mod response;
mod retry;
pub mod security;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::HttpExecutor;
pub use config::{ClientConfig, ClientConfigBuilder, ServerConfig, ServerConfigBuilder};
pub use error::{codes, Error, ErrorKind, Result, ServerErrorPayload};
pub use executor::NetworkExecutor;
pub use progress::{Progress, ProgressCallback, ProgressSink};
pub use request::{
    CachePolicy, HttpRequest, RequestBody, RequestMethod, RequestOption, RequestOptions,
};
pub use response::HttpResponse;
pub use retry::{is_retryable_response, RetryConfig, RetryPolicy};

/// Default number of members per batch request.
pub const DEFAULT_BATCH_LIMIT: usize = 50;

/// SDK version tag sent with every request.
pub const CLIENT_VERSION: &str = concat!("rust", env!("CARGO_PKG_VERSION"));

/// User-Agent string for the client
pub const USER_AGENT: &str = concat!("busbar-parse-api/", env!("CARGO_PKG_VERSION"));

/// Header names understood by Parse Server.
pub mod headers {
    pub const APPLICATION_ID: &str = "X-Parse-Application-Id";
    pub const CLIENT_KEY: &str = "X-Parse-Client-Key";
    pub const MASTER_KEY: &str = "X-Parse-Master-Key";
    pub const SESSION_TOKEN: &str = "X-Parse-Session-Token";
    pub const INSTALLATION_ID: &str = "X-Parse-Installation-Id";
    pub const CLIENT_VERSION: &str = "X-Parse-Client-Version";
    pub const REQUEST_ID: &str = "X-Parse-Request-Id";
    pub const CLOUD_CONTEXT: &str = "X-Parse-Cloud-Context";
    pub const CONTENT_TYPE: &str = "Content-Type";
}
