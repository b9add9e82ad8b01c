//! reqwest-backed network executor with optional retry and progress reporting.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::executor::NetworkExecutor;
use crate::progress::{Progress, ProgressSink};
use crate::request::{HttpRequest, RequestBody};
use crate::response::HttpResponse;
use crate::retry::{self, RetryPolicy};

/// Chunk size used when streaming an upload with progress reporting.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// HTTP executor for Parse Server built on a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    inner: reqwest::Client,
    config: ClientConfig,
}

impl HttpExecutor {
    /// Create a new executor with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .gzip(config.accept_compressed)
            .deflate(config.accept_compressed)
            .build()
            .map_err(|e| Error::with_source(ErrorKind::Config(e.to_string()), e))?;

        Ok(Self { inner, config })
    }

    /// Create a new executor with default configuration.
    pub fn default_executor() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Get the executor configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute a single request without retry logic.
    async fn execute_once(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut req = self
            .inner
            .request(request.method.to_reqwest(), &request.url);

        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if let Some(cache_control) = request.cache_policy.cache_control() {
            req = req.header("Cache-Control", cache_control);
        }

        if let Some(ref body) = request.body {
            let bytes = match body {
                RequestBody::Bytes(bytes) => bytes.clone(),
                RequestBody::File(path) => Bytes::from(tokio::fs::read(path).await.map_err(
                    |e| {
                        Error::with_source(
                            ErrorKind::Encoding(format!(
                                "could not read upload source {}: {}",
                                path.display(),
                                e
                            )),
                            e,
                        )
                    },
                )?),
            };
            req = match request.upload_progress {
                Some(ref sink) => req.body(progress_body(bytes, sink.clone())),
                None => req.body(bytes),
            };
        }

        if self.config.enable_tracing {
            debug!(method = %request.method, url = %request.url, "Sending request");
        }

        let response = req.send().await?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        if self.config.enable_tracing {
            if response.status().is_success() {
                debug!(status, content_length, "Response received");
            } else {
                info!(status, content_length, "Non-success response");
            }
        }

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = read_body(response, content_length, request.download_progress.as_ref()).await?;

        Ok(HttpResponse::new(status, headers, body))
    }
}

#[async_trait]
impl NetworkExecutor for HttpExecutor {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut retry_policy = self
            .config
            .retry
            .as_ref()
            .map(|c| RetryPolicy::new(c.clone()));

        loop {
            let outcome = self.execute_once(&request).await;
            let retry_after = match &outcome {
                Ok(response) if retry::is_retryable_response(response) => response.retry_after(),
                Err(err) if err.is_retryable() => err.retry_after(),
                _ => return outcome,
            };

            let Some(ref mut policy) = retry_policy else {
                return outcome;
            };

            match policy.next_delay(retry_after) {
                Some(delay) => {
                    warn!(
                        attempt = policy.attempt(),
                        delay_ms = delay.as_millis(),
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(Error::new(ErrorKind::RetriesExhausted {
                        attempts: policy.attempt(),
                    }))
                }
            }
        }
    }
}

/// Wrap bytes in a streaming body that reports progress per chunk.
fn progress_body(bytes: Bytes, sink: ProgressSink) -> reqwest::Body {
    let total = bytes.len() as u64;
    let mut chunks = Vec::with_capacity(bytes.len() / UPLOAD_CHUNK_SIZE + 1);
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + UPLOAD_CHUNK_SIZE).min(bytes.len());
        chunks.push(bytes.slice(offset..end));
        offset = end;
    }

    let mut sent = 0u64;
    let stream = futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        sink.notify(Progress {
            transferred: sent,
            total: Some(total),
        });
        Ok::<Bytes, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(stream)
}

/// Read the whole body, reporting download progress if requested.
async fn read_body(
    mut response: reqwest::Response,
    content_length: Option<u64>,
    sink: Option<&ProgressSink>,
) -> Result<Bytes> {
    let Some(sink) = sink else {
        return response.bytes().await.map_err(Into::into);
    };

    let mut buffer = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        buffer.extend_from_slice(&chunk);
        sink.notify(Progress {
            transferred: buffer.len() as u64,
            total: content_length,
        });
    }
    Ok(buffer.freeze())
}
