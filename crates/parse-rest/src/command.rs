//! Wire commands: one request/response pair, independent of transport.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use busbar_parse_client::{Error, ErrorKind, ProgressSink, RequestMethod, Result};

/// Decodes a response body into the command's result.
pub type Mapper<R> = Arc<dyn Fn(Bytes) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// Body of a command.
#[derive(Debug, Clone)]
pub enum CommandBody {
    /// Sent as-is.
    Json(Value),
    /// A domain object in canonical form; resolved children are substituted
    /// and server-managed keys stripped when the request is built.
    Object {
        fields: Map<String, Value>,
        /// Send `objectId` (client-assigned ids).
        keep_object_id: bool,
    },
    /// Raw bytes (file uploads).
    Bytes(Bytes),
    /// Raw bytes streamed from a local file.
    File(PathBuf),
}

/// One logical HTTP operation and the decoder for its response.
///
/// Constructing a command has no side effects; errors other than a missing
/// identifier surface when it is executed.
pub struct Command<R> {
    pub method: RequestMethod,
    /// Logical path relative to the server URL, e.g. `/classes/Note`.
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<CommandBody>,
    pub upload_progress: Option<ProgressSink>,
    pub download_progress: Option<ProgressSink>,
    mapper: Mapper<R>,
}

impl<R> Clone for Command<R> {
    fn clone(&self) -> Self {
        Self {
            method: self.method,
            path: self.path.clone(),
            params: self.params.clone(),
            body: self.body.clone(),
            upload_progress: self.upload_progress.clone(),
            download_progress: self.download_progress.clone(),
            mapper: Arc::clone(&self.mapper),
        }
    }
}

impl<R> std::fmt::Debug for Command<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("has_body", &self.body.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: Send + 'static> Command<R> {
    /// Create a command with an async mapper.
    pub fn new<F, Fut>(method: RequestMethod, path: impl Into<String>, mapper: F) -> Self
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
            upload_progress: None,
            download_progress: None,
            mapper: Arc::new(move |bytes| mapper(bytes).boxed()),
        }
    }

    /// Create a command whose mapper needs no further I/O.
    pub fn with_decoder(
        method: RequestMethod,
        path: impl Into<String>,
        decoder: impl Fn(Bytes) -> Result<R> + Send + Sync + 'static,
    ) -> Self {
        let decoder = Arc::new(decoder);
        Self::new(method, path, move |bytes| {
            let decoder = Arc::clone(&decoder);
            async move { decoder(bytes) }
        })
    }

    /// Create a command that decodes its response as JSON.
    pub fn json(method: RequestMethod, path: impl Into<String>) -> Self
    where
        R: DeserializeOwned,
    {
        Self::with_decoder(method, path, |bytes| {
            serde_json::from_slice(&bytes).map_err(Into::into)
        })
    }

    pub fn body(mut self, body: CommandBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Use a serializable value as the JSON body.
    pub fn json_body<B: Serialize + ?Sized>(self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| Error::with_source(ErrorKind::Encoding(e.to_string()), e))?;
        Ok(self.body(CommandBody::Json(value)))
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn upload_progress(mut self, sink: Option<ProgressSink>) -> Self {
        self.upload_progress = sink;
        self
    }

    pub fn download_progress(mut self, sink: Option<ProgressSink>) -> Self {
        self.download_progress = sink;
        self
    }

    /// Transform the decoded result.
    pub fn map<U: Send + 'static>(
        self,
        f: impl Fn(R) -> Result<U> + Send + Sync + 'static,
    ) -> Command<U> {
        let inner = self.mapper;
        let f = Arc::new(f);
        Command {
            method: self.method,
            path: self.path,
            params: self.params,
            body: self.body,
            upload_progress: self.upload_progress,
            download_progress: self.download_progress,
            mapper: Arc::new(move |bytes| {
                let inner = Arc::clone(&inner);
                let f = Arc::clone(&f);
                async move { f(inner(bytes).await?) }.boxed()
            }),
        }
    }

    /// Run the mapper on a response body.
    pub async fn decode(&self, body: Bytes) -> Result<R> {
        (self.mapper)(body).await
    }
}
