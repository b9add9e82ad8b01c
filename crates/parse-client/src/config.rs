//! Server and transport configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use crate::error::{Error, ErrorKind, Result};
use crate::request::CachePolicy;
use crate::retry::RetryConfig;

/// Connection details for a Parse Server deployment.
///
/// ## Security
///
/// The client key and master key are redacted in Debug output.
#[derive(Clone)]
pub struct ServerConfig {
    server_url: Url,
    application_id: String,
    client_key: Option<String>,
    master_key: Option<String>,
    /// Maximum number of members per batch request.
    pub batch_limit: usize,
    /// Sign up an anonymous user when the current user is read while absent.
    pub enable_automatic_login: bool,
    /// Allow objects to be created with a client-assigned objectId.
    pub allow_custom_object_id: bool,
    /// Cache policy applied when a request does not specify one.
    pub cache_policy: CachePolicy,
    /// Headers added to every request.
    pub default_headers: BTreeMap<String, String>,
    /// SDK version tag sent with every request.
    pub client_version: String,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("server_url", &self.server_url.as_str())
            .field("application_id", &self.application_id)
            .field("client_key", &self.client_key.as_ref().map(|_| "[REDACTED]"))
            .field("master_key", &self.master_key.as_ref().map(|_| "[REDACTED]"))
            .field("batch_limit", &self.batch_limit)
            .field("enable_automatic_login", &self.enable_automatic_login)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Create a builder for the given server URL and application id.
    pub fn builder(
        server_url: impl AsRef<str>,
        application_id: impl Into<String>,
    ) -> ServerConfigBuilder {
        ServerConfigBuilder::new(server_url, application_id)
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `PARSE_SERVER_URL`, `PARSE_APPLICATION_ID` and optionally
    /// `PARSE_CLIENT_KEY` and `PARSE_MASTER_KEY`.
    pub fn from_env() -> Result<Self> {
        let server_url = std::env::var("PARSE_SERVER_URL").map_err(|_| {
            Error::new(ErrorKind::Config("PARSE_SERVER_URL is not set".to_string()))
        })?;
        let application_id = std::env::var("PARSE_APPLICATION_ID").map_err(|_| {
            Error::new(ErrorKind::Config(
                "PARSE_APPLICATION_ID is not set".to_string(),
            ))
        })?;

        let mut builder = Self::builder(server_url, application_id);
        if let Ok(key) = std::env::var("PARSE_CLIENT_KEY") {
            builder = builder.client_key(key);
        }
        if let Ok(key) = std::env::var("PARSE_MASTER_KEY") {
            builder = builder.master_key(key);
        }
        builder.build()
    }

    /// The server URL, including the mount path (e.g. `http://localhost:1337/parse`).
    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    /// The path the server is mounted under (e.g. `/parse`), without a trailing slash.
    pub fn mount_path(&self) -> &str {
        self.server_url.path().trim_end_matches('/')
    }

    /// The application identifier.
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// The client key, if configured.
    pub fn client_key(&self) -> Option<&str> {
        self.client_key.as_deref()
    }

    /// The master key, if configured.
    pub fn master_key(&self) -> Option<&str> {
        self.master_key.as_deref()
    }

    /// Join a logical endpoint path (e.g. `/classes/Note`) to the server URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.server_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    /// Rewrite a logical endpoint path relative to the mount path, as required
    /// for members of a batch request (e.g. `/classes/Note` -> `/parse/classes/Note`).
    pub fn mounted_path(&self, path: &str) -> String {
        format!("{}/{}", self.mount_path(), path.trim_start_matches('/'))
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    server_url: String,
    application_id: String,
    client_key: Option<String>,
    master_key: Option<String>,
    batch_limit: usize,
    enable_automatic_login: bool,
    allow_custom_object_id: bool,
    cache_policy: CachePolicy,
    default_headers: BTreeMap<String, String>,
    client_version: String,
}

impl ServerConfigBuilder {
    fn new(server_url: impl AsRef<str>, application_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.as_ref().to_string(),
            application_id: application_id.into(),
            client_key: None,
            master_key: None,
            batch_limit: crate::DEFAULT_BATCH_LIMIT,
            enable_automatic_login: false,
            allow_custom_object_id: false,
            cache_policy: CachePolicy::default(),
            default_headers: BTreeMap::new(),
            client_version: crate::CLIENT_VERSION.to_string(),
        }
    }

    /// Set the client key.
    pub fn client_key(mut self, key: impl Into<String>) -> Self {
        self.client_key = Some(key.into());
        self
    }

    /// Set the master key used for elevated requests.
    pub fn master_key(mut self, key: impl Into<String>) -> Self {
        self.master_key = Some(key.into());
        self
    }

    /// Set the default batch limit.
    pub fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Enable or disable automatic anonymous login.
    pub fn enable_automatic_login(mut self, enabled: bool) -> Self {
        self.enable_automatic_login = enabled;
        self
    }

    /// Allow client-assigned object ids.
    pub fn allow_custom_object_id(mut self, allowed: bool) -> Self {
        self.allow_custom_object_id = allowed;
        self
    }

    /// Set the default cache policy.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Add a header sent with every request.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Override the SDK version tag.
    pub fn client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Build the server configuration.
    pub fn build(self) -> Result<ServerConfig> {
        let server_url = Url::parse(self.server_url.trim_end_matches('/'))?;
        if server_url.cannot_be_a_base() {
            return Err(Error::new(ErrorKind::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                server_url
            ))));
        }
        if self.application_id.is_empty() {
            return Err(Error::new(ErrorKind::Config(
                "application id must not be empty".to_string(),
            )));
        }
        if self.batch_limit == 0 {
            return Err(Error::new(ErrorKind::Config(
                "batch limit must be at least 1".to_string(),
            )));
        }

        Ok(ServerConfig {
            server_url,
            application_id: self.application_id,
            client_key: self.client_key,
            master_key: self.master_key,
            batch_limit: self.batch_limit,
            enable_automatic_login: self.enable_automatic_login,
            allow_custom_object_id: self.allow_custom_object_id,
            cache_policy: self.cache_policy,
            default_headers: self.default_headers,
            client_version: self.client_version,
        })
    }
}

/// Configuration for the reqwest-backed HTTP executor.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Retry configuration. Disabled by default.
    pub retry: Option<RetryConfig>,
    /// Request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Pool idle timeout.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// User-Agent header value.
    pub user_agent: String,
    /// Accept gzip/deflate compressed responses.
    pub accept_compressed: bool,
    /// Whether to enable request/response tracing.
    pub enable_tracing: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: crate::USER_AGENT.to_string(),
            accept_compressed: true,
            enable_tracing: true,
        }
    }
}

impl ClientConfig {
    /// Create a new client config builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = Some(retry);
        self
    }

    /// Disable retries.
    pub fn without_retry(mut self) -> Self {
        self.config.retry = None;
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set pool idle timeout.
    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set maximum idle connections per host.
    pub fn with_pool_max_idle(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Set custom User-Agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Accept compressed responses.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.config.accept_compressed = enabled;
        self
    }

    /// Enable or disable request/response tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.config.enable_tracing = enabled;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
