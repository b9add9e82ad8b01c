//! Transport-independent request descriptors and per-call options.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::progress::ProgressSink;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl RequestMethod {
    /// Convert to reqwest::Method.
    pub fn to_reqwest(&self) -> reqwest::Method {
        match self {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
            RequestMethod::Put => reqwest::Method::PUT,
            RequestMethod::Patch => reqwest::Method::PATCH,
            RequestMethod::Delete => reqwest::Method::DELETE,
        }
    }

    /// The method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Put => "PUT",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Delete => "DELETE",
        }
    }

    /// Whether requests with this method carry a per-request id.
    pub fn sends_request_id(&self) -> bool {
        !matches!(self, RequestMethod::Get | RequestMethod::Delete)
    }
}

impl std::fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache policy passed through to the transport untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CachePolicy {
    /// Let the transport decide.
    #[default]
    UseProtocolCachePolicy,
    /// Always hit the network.
    ReloadIgnoringLocalCacheData,
    /// Prefer cached data, fall back to the network.
    ReturnCacheDataElseLoad,
    /// Only use cached data.
    ReturnCacheDataDontLoad,
}

impl CachePolicy {
    /// The `Cache-Control` header value for this policy, if any.
    pub fn cache_control(&self) -> Option<&'static str> {
        match self {
            CachePolicy::UseProtocolCachePolicy => None,
            CachePolicy::ReloadIgnoringLocalCacheData => Some("no-cache"),
            CachePolicy::ReturnCacheDataElseLoad => Some("max-stale"),
            CachePolicy::ReturnCacheDataDontLoad => Some("only-if-cached"),
        }
    }
}

/// A single per-call request option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOption {
    /// Send the master key (elevated credentials).
    UseMasterKey,
    /// Use this session token instead of the current user's.
    SessionToken(String),
    /// Use this installation id instead of the current installation's.
    InstallationId(String),
    /// Override the content type.
    MimeType(String),
    /// Remove the content type header (streamed uploads).
    RemoveMimeType,
    /// Cloud code context, sent as a JSON header.
    Context(String),
    /// Add or replace arbitrary headers.
    Headers(BTreeMap<String, String>),
    /// Cache policy for this call.
    CachePolicy(CachePolicy),
}

/// Set of options applied to one call.
///
/// ## Security
///
/// Session tokens are redacted in Debug output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    options: Vec<RequestOption>,
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted: Vec<String> = self
            .options
            .iter()
            .map(|o| match o {
                RequestOption::SessionToken(_) => "SessionToken([REDACTED])".to_string(),
                other => format!("{:?}", other),
            })
            .collect();
        f.debug_struct("RequestOptions")
            .field("options", &redacted)
            .finish()
    }
}

impl RequestOptions {
    /// No options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an option, replacing any option of the same variant.
    pub fn with(mut self, option: RequestOption) -> Self {
        self.insert(option);
        self
    }

    /// Add an option in place, replacing any option of the same variant.
    pub fn insert(&mut self, option: RequestOption) {
        let discriminant = std::mem::discriminant(&option);
        self.options
            .retain(|existing| std::mem::discriminant(existing) != discriminant);
        self.options.push(option);
    }

    /// Shorthand for [`RequestOption::UseMasterKey`].
    pub fn master_key() -> Self {
        Self::new().with(RequestOption::UseMasterKey)
    }

    /// Shorthand for [`RequestOption::SessionToken`].
    pub fn session_token(token: impl Into<String>) -> Self {
        Self::new().with(RequestOption::SessionToken(token.into()))
    }

    /// Iterate over the options.
    pub fn iter(&self) -> impl Iterator<Item = &RequestOption> {
        self.options.iter()
    }

    /// Whether the master key should be sent.
    pub fn uses_master_key(&self) -> bool {
        self.options
            .iter()
            .any(|o| matches!(o, RequestOption::UseMasterKey))
    }

    /// The overriding session token, if any.
    pub fn session_token_override(&self) -> Option<&str> {
        self.options.iter().find_map(|o| match o {
            RequestOption::SessionToken(token) => Some(token.as_str()),
            _ => None,
        })
    }

    /// The overriding installation id, if any.
    pub fn installation_id_override(&self) -> Option<&str> {
        self.options.iter().find_map(|o| match o {
            RequestOption::InstallationId(id) => Some(id.as_str()),
            _ => None,
        })
    }

    /// The cache policy requested for this call, if any.
    pub fn cache_policy(&self) -> Option<CachePolicy> {
        self.options.iter().find_map(|o| match o {
            RequestOption::CachePolicy(policy) => Some(*policy),
            _ => None,
        })
    }

    /// Merge another set into this one; options in `other` win.
    pub fn merged(mut self, other: &RequestOptions) -> Self {
        for option in other.iter() {
            self.insert(option.clone());
        }
        self
    }
}

impl FromIterator<RequestOption> for RequestOptions {
    fn from_iter<I: IntoIterator<Item = RequestOption>>(iter: I) -> Self {
        let mut options = RequestOptions::new();
        for option in iter {
            options.insert(option);
        }
        options
    }
}

/// Body of a concrete request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// In-memory bytes.
    Bytes(Bytes),
    /// Bytes streamed from a local file.
    File(PathBuf),
}

/// Concrete request handed to a [`NetworkExecutor`](crate::NetworkExecutor).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: RequestMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
    pub cache_policy: CachePolicy,
    /// Upload progress sink.
    pub upload_progress: Option<ProgressSink>,
    /// Download progress sink.
    pub download_progress: Option<ProgressSink>,
}

impl HttpRequest {
    /// Create a request without headers or body.
    pub fn new(method: RequestMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            cache_policy: CachePolicy::default(),
            upload_progress: None,
            download_progress: None,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set an in-memory body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    /// Stream the body from a local file.
    pub fn file_body(mut self, path: impl Into<PathBuf>) -> Self {
        self.body = Some(RequestBody::File(path.into()));
        self
    }

    /// Set the cache policy.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Report upload progress to the given sink.
    pub fn upload_progress(mut self, sink: ProgressSink) -> Self {
        self.upload_progress = Some(sink);
        self
    }

    /// Report download progress to the given sink.
    pub fn download_progress(mut self, sink: ProgressSink) -> Self {
        self.download_progress = Some(sink);
        self
    }

    /// Header lookup, case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// In-memory body bytes, if any.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            Some(RequestBody::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_methods() {
        assert!(RequestMethod::Post.sends_request_id());
        assert!(RequestMethod::Put.sends_request_id());
        assert!(RequestMethod::Patch.sends_request_id());
        assert!(!RequestMethod::Get.sends_request_id());
        assert!(!RequestMethod::Delete.sends_request_id());
    }

    #[test]
    fn test_options_replace_same_variant() {
        let options = RequestOptions::session_token("r:first")
            .with(RequestOption::UseMasterKey)
            .with(RequestOption::SessionToken("r:second".to_string()));

        assert!(options.uses_master_key());
        assert_eq!(options.session_token_override(), Some("r:second"));
        assert_eq!(options.iter().count(), 2);
    }

    #[test]
    fn test_options_debug_redacts_token() {
        let options = RequestOptions::session_token("r:secret");
        let debug = format!("{:?}", options);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("r:secret"));
    }

    #[test]
    fn test_cache_policy_option() {
        let options = RequestOptions::new().with(RequestOption::CachePolicy(
            CachePolicy::ReloadIgnoringLocalCacheData,
        ));
        assert_eq!(
            options.cache_policy(),
            Some(CachePolicy::ReloadIgnoringLocalCacheData)
        );
        assert_eq!(
            CachePolicy::ReloadIgnoringLocalCacheData.cache_control(),
            Some("no-cache")
        );
    }

    #[test]
    fn test_http_request_builder() {
        let req = HttpRequest::new(RequestMethod::Post, "http://localhost/parse/classes/Note")
            .header("Content-Type", "application/json")
            .body(r#"{"title":"a"}"#);

        assert_eq!(req.header_value("content-type"), Some("application/json"));
        assert_eq!(req.body_bytes().unwrap().as_ref(), br#"{"title":"a"}"#);
    }
}
