//! In-memory executor for tests.
//!
//! Records every request and answers from a queue of canned responses, then
//! from an optional responder closure. Enabled with the `testing` feature.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, ErrorKind, Result};
use crate::executor::NetworkExecutor;
use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// Computes a response from the request that was sent.
pub type Responder = Arc<dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync>;

/// Recording executor that never touches the network.
///
/// Clones share state, so a test can keep one handle and give another to
/// the client under test.
#[derive(Clone, Default)]
pub struct MockExecutor {
    inner: Arc<Mutex<MockExecutorInner>>,
}

#[derive(Default)]
struct MockExecutorInner {
    requests: Vec<HttpRequest>,
    queue: VecDeque<Result<HttpResponse>>,
    responder: Option<Responder>,
    fail_next: Option<String>,
}

impl std::fmt::Debug for MockExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("MockExecutor")
            .field("requests", &inner.requests.len())
            .field("queued", &inner.queue.len())
            .field("has_responder", &inner.responder.is_some())
            .finish()
    }
}

impl MockExecutor {
    /// Create a mock with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that answers every request with `responder`.
    pub fn with_responder(
        responder: impl Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    ) -> Self {
        let mock = Self::new();
        mock.set_responder(responder);
        mock
    }

    /// Replace the fallback responder.
    pub fn set_responder(
        &self,
        responder: impl Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    ) {
        self.inner.lock().unwrap().responder = Some(Arc::new(responder));
    }

    /// Queue a response for the next request.
    pub fn queue_response(&self, response: HttpResponse) {
        self.inner.lock().unwrap().queue.push_back(Ok(response));
    }

    /// Queue a 200 JSON response for the next request.
    pub fn queue_json(&self, value: serde_json::Value) {
        self.queue_response(HttpResponse::json(&value));
    }

    /// Queue a Parse error body with the given status and code.
    pub fn queue_error(&self, status: u16, code: i32, message: &str) {
        let body = serde_json::json!({ "code": code, "error": message }).to_string();
        self.queue_response(HttpResponse::new(status, Vec::new(), body));
    }

    /// Cause the next request to fail at the transport level.
    pub fn fail_next(&self, message: &str) {
        self.inner.lock().unwrap().fail_next = Some(message.to_string());
    }

    /// All requests executed so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.inner.lock().unwrap().requests.last().cloned()
    }

    /// Number of requests executed so far.
    pub fn call_count(&self) -> usize {
        self.inner.lock().unwrap().requests.len()
    }

    /// Forget recorded requests and queued responses. The responder is kept.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.clear();
        inner.queue.clear();
        inner.fail_next = None;
    }
}

#[async_trait]
impl NetworkExecutor for MockExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let responder = {
            let mut inner = self.inner.lock().unwrap();
            inner.requests.push(request.clone());

            if let Some(message) = inner.fail_next.take() {
                return Err(Error::new(ErrorKind::Transport(message)));
            }
            if let Some(queued) = inner.queue.pop_front() {
                return queued;
            }
            inner.responder.clone()
        };

        match responder {
            Some(responder) => responder(&request),
            None => Err(Error::new(ErrorKind::Transport(format!(
                "no mock response for {} {}",
                request.method, request.url
            )))),
        }
    }
}
