//! The seam between the SDK core and the HTTP transport.

use async_trait::async_trait;

use crate::error::Result;
use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// Executes concrete HTTP requests.
///
/// Implementations return the response for any status code; turning
/// non-success statuses into errors is the caller's job. An `Err` means the
/// exchange itself failed (DNS, connection, timeout) and should be reported
/// as [`ErrorKind::Transport`](crate::ErrorKind::Transport).
///
/// Progress sinks attached to the request must be notified as bytes move.
#[async_trait]
pub trait NetworkExecutor: Send + Sync + std::fmt::Debug {
    /// Send the request and read the full response body.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[async_trait]
impl<T: NetworkExecutor + ?Sized> NetworkExecutor for std::sync::Arc<T> {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        (**self).execute(request).await
    }
}
