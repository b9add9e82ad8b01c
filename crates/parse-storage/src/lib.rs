//! # parse-storage
//!
//! Durable key-value storage for Parse Server client state.
//!
//! The SDK persists the current user, installation and config through the
//! [`KeyValueStore`] trait. Two implementations ship here:
//!
//! - [`InMemoryStore`] - process-local, the default
//! - [`FileStore`] - one 0600 file per key, suitable as a secure mirror on
//!   desktop platforms
//!
//! ## Example
//!
//! ```rust,ignore
//! use busbar_parse_storage::{keys, set_json, FileStore};
//!
//! let store = FileStore::for_application("my-app")?;
//! set_json(&store, keys::CURRENT_CONFIG, &serde_json::json!({"params": {}})).await?;
//! ```

mod error;
mod file;
mod store;

pub use error::{Error, ErrorKind, Result};
pub use file::{default_store_dir, FileStore};
pub use store::{get_json, set_json, InMemoryStore, KeyValueStore};

/// Keys under which identity slots are persisted.
pub mod keys {
    /// The current user container.
    pub const CURRENT_USER: &str = "_currentUser";
    /// The current installation container.
    pub const CURRENT_INSTALLATION: &str = "_currentInstallation";
    /// The current config container.
    pub const CURRENT_CONFIG: &str = "_currentConfig";
}
