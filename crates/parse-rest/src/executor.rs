//! Turns commands into concrete requests and drives them through the network
//! executor.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use busbar_parse_client::security::url;
use busbar_parse_client::{
    headers, Error, ErrorKind, HttpRequest, NetworkExecutor, RequestOption, RequestOptions,
    Result, ServerConfig,
};

use crate::coding::{self, ResolvedChildren};
use crate::command::{Command, CommandBody};
use crate::identity::SessionContext;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Executes commands against one server.
///
/// Cheap to clone; clones share the network executor and session.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    config: Arc<ServerConfig>,
    network: Arc<dyn NetworkExecutor>,
    session: Arc<SessionContext>,
}

impl CommandExecutor {
    pub fn new(
        config: Arc<ServerConfig>,
        network: Arc<dyn NetworkExecutor>,
        session: Arc<SessionContext>,
    ) -> Self {
        Self {
            config,
            network,
            session,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn network(&self) -> &Arc<dyn NetworkExecutor> {
        &self.network
    }

    /// Execute a command and decode its response.
    ///
    /// `resolved` holds children saved earlier in the same deep-save; object
    /// bodies reference them by pointer.
    #[instrument(skip(self, command, options, resolved), fields(method = %command.method.as_str(), path = %command.path))]
    pub async fn execute<R: Send + 'static>(
        &self,
        command: &Command<R>,
        options: &RequestOptions,
        resolved: &ResolvedChildren,
    ) -> Result<R> {
        let request = self.build_request(command, options, resolved).await?;
        debug!(url = %request.url, "dispatching request");

        let response = self.network.execute(request).await?;
        if !response.is_success() {
            info!(status = response.status, "request failed");
        }
        let response = response.error_for_status()?;
        debug!(status = response.status, bytes = response.body.len(), "response received");

        command.decode(response.body).await
    }

    /// Build the concrete request for a command.
    pub async fn build_request<R>(
        &self,
        command: &Command<R>,
        options: &RequestOptions,
        resolved: &ResolvedChildren,
    ) -> Result<HttpRequest> {
        let url = url::with_query(&self.config.url(&command.path), &command.params);
        let mut request = HttpRequest::new(command.method, url)
            .cache_policy(options.cache_policy().unwrap_or(self.config.cache_policy));

        for (name, value) in &self.config.default_headers {
            request = request.header(name.clone(), value.clone());
        }
        request = request
            .header(headers::APPLICATION_ID, self.config.application_id())
            .header(headers::CLIENT_VERSION, self.config.client_version.clone())
            .header(headers::CONTENT_TYPE, JSON_CONTENT_TYPE);
        if let Some(key) = self.config.client_key() {
            request = request.header(headers::CLIENT_KEY, key);
        }
        if command.method.sends_request_id() {
            request = request.header(headers::REQUEST_ID, uuid::Uuid::new_v4().to_string());
        }

        let session_token = match options.session_token_override() {
            Some(token) => Some(token.to_string()),
            None => self.session.session_token().await,
        };
        if let Some(token) = session_token {
            request = request.header(headers::SESSION_TOKEN, token);
        }
        let installation_id = match options.installation_id_override() {
            Some(id) => Some(id.to_string()),
            None => self.session.installation_id().await,
        };
        if let Some(id) = installation_id {
            request = request.header(headers::INSTALLATION_ID, id);
        }

        for option in options.iter() {
            match option {
                RequestOption::UseMasterKey => {
                    let key = self.config.master_key().ok_or_else(|| {
                        Error::new(ErrorKind::Config(
                            "the master key was requested but is not configured".to_string(),
                        ))
                    })?;
                    request = request.header(headers::MASTER_KEY, key);
                }
                RequestOption::MimeType(mime) => {
                    request = request.header(headers::CONTENT_TYPE, mime.clone());
                }
                RequestOption::RemoveMimeType => {
                    request.headers.remove(headers::CONTENT_TYPE);
                }
                RequestOption::Context(context) => {
                    request = request.header(headers::CLOUD_CONTEXT, context.clone());
                }
                RequestOption::Headers(extra) => {
                    for (name, value) in extra {
                        request = request.header(name.clone(), value.clone());
                    }
                }
                RequestOption::SessionToken(_)
                | RequestOption::InstallationId(_)
                | RequestOption::CachePolicy(_) => {}
            }
        }

        request = match &command.body {
            None => request,
            Some(CommandBody::Json(value)) => request.body(encode_json(value)?),
            Some(CommandBody::Object {
                fields,
                keep_object_id,
            }) => {
                let body = coding::encode_body(fields, resolved, *keep_object_id)?;
                request.body(encode_json(&body)?)
            }
            Some(CommandBody::Bytes(bytes)) => request.body(bytes.clone()),
            Some(CommandBody::File(path)) => request.file_body(path.clone()),
        };

        if let Some(sink) = &command.upload_progress {
            request = request.upload_progress(sink.clone());
        }
        if let Some(sink) = &command.download_progress {
            request = request.download_progress(sink.clone());
        }
        Ok(request)
    }
}

pub(crate) fn encode_json(value: &serde_json::Value) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::with_source(ErrorKind::Encoding(e.to_string()), e))
}
