//! End-to-end tests against a wiremock Parse Server.
//!
//! Run with:
//!   cargo test --test integration
//!
//! Set `RUST_LOG=debug` to see request tracing.

#[path = "integration/common.rs"]
mod common;
#[path = "integration/files.rs"]
mod files;
#[path = "integration/objects.rs"]
mod objects;
#[path = "integration/users.rs"]
mod users;
