//! Shared fixtures: a wiremock Parse Server and clients pointed at it.

use busbar_parse_api::client::ServerConfigBuilder;
use busbar_parse_api::{ParseClient, ServerConfig};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use wiremock::MockServer;

use busbar_parse_api::rest::{Link, ObjectMeta, ParseObject};

pub const CREATED: &str = "2024-01-01T00:00:00.000Z";

/// Route test logs through the test harness. `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn server() -> MockServer {
    init_tracing();
    MockServer::start().await
}

pub fn config(server: &MockServer) -> ServerConfigBuilder {
    ServerConfig::builder(format!("{}/parse", server.uri()), "app")
        .client_key("ck")
        .master_key("mk")
}

pub fn client(server: &MockServer) -> ParseClient {
    ParseClient::new(config(server).build().expect("valid config")).expect("client")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    pub name: String,
}

impl ParseObject for Tag {
    const CLASS_NAME: &'static str = "Tag";
    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Link<Tag>>,
}

impl ParseObject for Note {
    const CLASS_NAME: &'static str = "Note";
    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

/// A node that may link to another node, for building cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(flatten)]
    pub meta: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Link<Node>>,
}

impl ParseObject for Node {
    const CLASS_NAME: &'static str = "Node";
    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
