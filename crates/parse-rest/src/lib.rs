//! # parse-rest
//!
//! Parse Server REST API client: typed objects, deep-save, batching and the
//! current user, installation and config.
//!
//! ## Features
//!
//! - **Objects** - Save, create, replace, update, fetch and delete typed objects
//! - **Deep-save** - Unsaved children registered in an [`ObjectGraph`] are saved
//!   first, in dependency order, with cycle detection
//! - **Batches** - Many operations per round-trip, chunked by the server's
//!   batch limit, optionally transactional
//! - **Users** - Sign-up, login, anonymous and third-party auth, logout
//! - **Installations and config** - Tracked in a [`SessionContext`] backed by
//!   a key-value store
//! - **Cloud code, files and queries**
//!
//! ## Example
//!
//! ```rust,ignore
//! use busbar_parse_rest::{Link, ObjectGraph, ObjectMeta, ParseClient, ParseObject, RequestOptions};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Tag {
//!     #[serde(flatten)]
//!     meta: ObjectMeta,
//!     name: String,
//! }
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Note {
//!     #[serde(flatten)]
//!     meta: ObjectMeta,
//!     title: String,
//!     tag: Option<Link<Tag>>,
//! }
//! // impl ParseObject for Tag and Note ...
//!
//! let client = ParseClient::from_env()?;
//! let mut graph = ObjectGraph::new();
//! let tag = graph.insert(Tag { name: "urgent".into(), ..Default::default() })?;
//!
//! let mut note = Note { title: "a".into(), tag: Some(tag), ..Default::default() };
//! client.save_graph(&mut note, &mut graph, &RequestOptions::new()).await?;
//! assert!(note.tag.unwrap().is_saved());
//! ```

mod acl;
mod batch;
mod client;
pub mod coding;
mod command;
mod deep_save;
mod executor;
mod file;
mod graph;
mod identity;
mod link;
mod object;
mod query;
pub mod types;

// Main client
pub use client::{ParseClient, ParseClientBuilder};

// Commands and their execution
pub use command::{Command, CommandBody, Mapper};
pub use executor::CommandExecutor;

// Objects
pub use acl::{AccessRule, Acl};
pub use coding::{ResolvedChildren, SavedFile};
pub use file::ParseFile;
pub use graph::ObjectGraph;
pub use link::{Link, LinkTarget, LocalId};
pub use object::{endpoint, Installation, ObjectMeta, ParseInstallation, ParseObject, ParseUser, User};
pub use types::{ParseBytes, ParseDate, Pointer};

// Session state
pub use identity::{IdentityContainer, SessionContext, SlotKind};

// Queries
pub use query::Query;

// Re-export client types for convenience
pub use busbar_parse_client::{
    Error, ErrorKind, ProgressSink, RequestOption, RequestOptions, Result, ServerConfig,
};
