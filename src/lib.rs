//! # busbar-parse-api
//!
//! A Parse Server REST API client library for Rust.
//!
//! Application code defines typed objects, persists them with dependency-ordered
//! deep-saves and batches, authenticates users and tracks the current user,
//! installation and config across restarts.
//!
//! ## Security
//!
//! - Session tokens and keys are redacted in Debug output
//! - Tracing skips credential parameters and request bodies
//! - Identity state written to disk is readable by the owner only
//!
//! ## Crates
//!
//! - **busbar-parse-client** - Transport: configuration, errors, request descriptors, reqwest executor
//! - **busbar-parse-storage** - Durable key-value stores for identity state
//! - **busbar-parse-rest** - Objects, deep-save, batches, users, installations, config, cloud code, files, queries
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use busbar_parse_api::{ParseClient, RequestOptions, User};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // PARSE_SERVER_URL, PARSE_APPLICATION_ID, optional PARSE_CLIENT_KEY / PARSE_MASTER_KEY
//!     let client = ParseClient::from_env()?;
//!
//!     let user: User = client.login("ada", "secret", &RequestOptions::new()).await?;
//!     println!("logged in as {:?}", user.username);
//!
//!     client.logout(&RequestOptions::new()).await?;
//!     Ok(())
//! }
//! ```

// Re-export all crates for convenient access
#[cfg(feature = "client")]
pub use busbar_parse_client as client;
#[cfg(feature = "rest")]
pub use busbar_parse_rest as rest;
#[cfg(feature = "storage")]
pub use busbar_parse_storage as storage;

// Re-export commonly used types at the top level
#[cfg(feature = "client")]
pub use busbar_parse_client::{
    ClientConfig, Error, ErrorKind, RequestOption, RequestOptions, Result, ServerConfig,
};
#[cfg(feature = "rest")]
pub use busbar_parse_rest::{
    Installation, Link, ObjectGraph, ObjectMeta, ParseClient, ParseFile, ParseObject, Query,
    User,
};
#[cfg(feature = "storage")]
pub use busbar_parse_storage::{FileStore, InMemoryStore, KeyValueStore};
