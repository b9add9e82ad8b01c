//! Parse Server REST client.
//!
//! [`ParseClient`] owns the server configuration, the network executor and
//! the session context holding the current user, installation and config.
//! Operations are grouped by area in the submodules.

use std::sync::Arc;

use serde_json::{Map, Value};

use busbar_parse_client::{
    ClientConfig, HttpExecutor, NetworkExecutor, RequestOptions, Result, ServerConfig,
};
use busbar_parse_storage::{FileStore, KeyValueStore};

use crate::coding::ResolvedChildren;
use crate::command::Command;
use crate::executor::CommandExecutor;
use crate::identity::{SessionContext, SlotKind};

mod cloud;
mod config;
mod files;
mod installations;
mod objects;
mod query;
mod users;

/// Parse Server REST client.
///
/// Provides typed operations for:
/// - Objects: save (with deep-save), create, replace, update, fetch, delete
/// - Batches of the above, chunked by the server's batch limit
/// - Users: signup, login, anonymous login, become, logout, linking
/// - The current installation and config
/// - Cloud functions and jobs
/// - Files
/// - Queries
///
/// Clones share the transport and the session.
///
/// # Example
///
/// ```rust,ignore
/// use busbar_parse_rest::{ParseClient, RequestOptions};
///
/// let client = ParseClient::from_env()?;
///
/// let mut note = Note { title: "a".into(), ..Default::default() };
/// client.save(&mut note, &RequestOptions::new()).await?;
///
/// let user = client.login::<User>("ada", "secret", &RequestOptions::new()).await?;
/// client.logout(&RequestOptions::new()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ParseClient {
    executor: CommandExecutor,
    /// Serializes automatic anonymous logins.
    auto_login: Arc<tokio::sync::Mutex<()>>,
}

impl ParseClient {
    /// Create a client with the default transport and an in-memory store.
    pub fn new(config: ServerConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Create a client from `PARSE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ServerConfig::from_env()?)
    }

    pub fn builder(config: ServerConfig) -> ParseClientBuilder {
        ParseClientBuilder::new(config)
    }

    pub fn config(&self) -> &ServerConfig {
        self.executor.config()
    }

    /// The session holding the current user, installation and config.
    pub fn session(&self) -> &Arc<SessionContext> {
        self.executor.session()
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Execute a custom command.
    pub async fn execute<R: Send + 'static>(
        &self,
        command: &Command<R>,
        options: &RequestOptions,
    ) -> Result<R> {
        self.executor
            .execute(command, options, &ResolvedChildren::new())
            .await
    }

    /// Execute custom commands as batches of the configured size.
    pub async fn execute_batch<R: Send + 'static>(
        &self,
        commands: &[Command<R>],
        transaction: bool,
        options: &RequestOptions,
    ) -> Result<Vec<Result<R>>> {
        self.executor
            .execute_batch(
                commands,
                transaction,
                self.config().batch_limit,
                options,
                &ResolvedChildren::new(),
            )
            .await
    }
}

/// Merge server fields into the identity slot tracking `class_name`, if the
/// slot holds the same object.
pub(crate) async fn sync_identity(
    session: &SessionContext,
    class_name: &str,
    fields: &Map<String, Value>,
    token: Option<String>,
) {
    if let Some(kind) = SlotKind::for_class(class_name) {
        session.merge_if_matches(kind, fields, token).await;
    }
}

/// Builder for [`ParseClient`].
#[derive(Debug)]
pub struct ParseClientBuilder {
    config: ServerConfig,
    client_config: ClientConfig,
    network: Option<Arc<dyn NetworkExecutor>>,
    store: Option<Arc<dyn KeyValueStore>>,
    secure_store: Option<Arc<dyn KeyValueStore>>,
}

impl ParseClientBuilder {
    fn new(config: ServerConfig) -> Self {
        Self {
            config,
            client_config: ClientConfig::default(),
            network: None,
            store: None,
            secure_store: None,
        }
    }

    /// Transport settings for the default reqwest executor.
    pub fn client_config(mut self, config: ClientConfig) -> Self {
        self.client_config = config;
        self
    }

    /// Use a custom network executor.
    pub fn network_executor(mut self, executor: Arc<dyn NetworkExecutor>) -> Self {
        self.network = Some(executor);
        self
    }

    /// Primary store for identity state. Defaults to in-memory.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Secure mirror for identity state.
    pub fn secure_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Persist identity state under `~/.parse/<application id>`.
    pub fn file_store(self) -> Result<Self> {
        let store = FileStore::for_application(self.config.application_id())?;
        Ok(self.store(Arc::new(store)))
    }

    pub fn build(self) -> Result<ParseClient> {
        let network = match self.network {
            Some(network) => network,
            None => Arc::new(HttpExecutor::new(self.client_config)?),
        };
        let session = match self.store {
            Some(store) => SessionContext::new(store, self.secure_store),
            None => match self.secure_store {
                Some(secure) => SessionContext::new(
                    Arc::new(busbar_parse_storage::InMemoryStore::new()),
                    Some(secure),
                ),
                None => SessionContext::in_memory(),
            },
        };
        Ok(ParseClient {
            executor: CommandExecutor::new(Arc::new(self.config), network, Arc::new(session)),
            auto_login: Arc::new(tokio::sync::Mutex::new(())),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use busbar_parse_client::testing::MockExecutor;

    pub fn client(mock: &MockExecutor) -> ParseClient {
        client_with(mock, |builder| builder)
    }

    pub fn client_with(
        mock: &MockExecutor,
        configure: impl FnOnce(busbar_parse_client::ServerConfigBuilder) -> busbar_parse_client::ServerConfigBuilder,
    ) -> ParseClient {
        let config = configure(
            ServerConfig::builder("http://localhost:1337/parse", "app").master_key("mk"),
        )
        .build()
        .unwrap();
        ParseClient::builder(config)
            .network_executor(Arc::new(mock.clone()))
            .build()
            .unwrap()
    }

    pub fn body(request: &busbar_parse_client::HttpRequest) -> Value {
        serde_json::from_slice(request.body_bytes().unwrap()).unwrap()
    }
}
