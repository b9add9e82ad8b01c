//! HTTP response descriptor returned by a network executor.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{Error, ErrorKind, Result, ServerErrorPayload};

/// Status, headers and fully-read body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Create a response; header names are normalized to lowercase.
    pub fn new(
        status: u16,
        headers: impl IntoIterator<Item = (String, String)>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            body: body.into(),
        }
    }

    /// A 200 response with a JSON body.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(
            200,
            [("content-type".to_string(), "application/json".to_string())],
            value.to_string(),
        )
    }

    /// Returns true if the response status is successful (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }

    /// Get the Retry-After header as a Duration.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")?
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    /// Deserialize the body as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Into::into)
    }

    /// Convert a non-success response into a structured error.
    ///
    /// Successful responses are returned unchanged.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(parse_error_response(self.status, &self.body, self.retry_after()))
    }
}

/// Parse an error body into the closed error taxonomy.
fn parse_error_response(status: u16, body: &[u8], retry_after: Option<Duration>) -> Error {
    if status == 429 {
        return Error::new(ErrorKind::RateLimited { retry_after });
    }

    if let Ok(payload) = serde_json::from_slice::<ServerErrorPayload>(body) {
        return Error::from_payload(payload);
    }

    let text = String::from_utf8_lossy(body);
    let message = if text.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, truncate(&text, 200))
    };

    match status {
        404 => Error::new(ErrorKind::ObjectNotFound(message)),
        _ => Error::new(ErrorKind::Server {
            code: crate::codes::INTERNAL_SERVER_ERROR,
            message,
        }),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
