//! Escaping and redaction utilities.
//!
//! ## URL Encoding
//!
//! Class names, object ids and file names end up in URL paths, and query
//! parameters carry JSON (`where={...}`). Both MUST be encoded with the
//! helpers in [`url`]:
//!
//! ```rust
//! use busbar_parse_client::security::url;
//!
//! let query = url::query_string(&[("where".to_string(), r#"{"score":{"$gt":1}}"#.to_string())]);
//! assert_eq!(query, "where=%7B%22score%22%3A%7B%22%24gt%22%3A1%7D%7D");
//! ```

/// URL encoding utilities.
pub mod url {
    /// Percent-encode a single path segment (object id, class or file name).
    #[must_use]
    pub fn encode_path_segment(value: &str) -> String {
        urlencoding::encode(value).into_owned()
    }

    /// Percent-encode a query key or value.
    ///
    /// A literal `+` is always emitted as `%2B`: servers decode query strings
    /// as form data, where a bare `+` would become a space.
    #[must_use]
    pub fn encode_query_component(value: &str) -> String {
        urlencoding::encode(value).replace('+', "%2B")
    }

    /// Build `k1=v1&k2=v2` from ordered pairs.
    #[must_use]
    pub fn query_string(params: &[(String, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    encode_query_component(k),
                    encode_query_component(v)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Append query parameters to a URL.
    #[must_use]
    pub fn with_query(url: &str, params: &[(String, String)]) -> String {
        if params.is_empty() {
            return url.to_string();
        }
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", url, separator, query_string(params))
    }

    /// Validate a class name: letters, digits and underscores, starting with
    /// a letter or underscore.
    pub fn is_valid_class_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

/// Redaction helpers for secrets that must never reach logs.
pub mod redact {
    /// Placeholder used wherever a secret would be printed.
    pub const REDACTED: &str = "[REDACTED]";

    /// Redact an optional secret for Debug output.
    pub fn option(value: &Option<String>) -> Option<&'static str> {
        value.as_ref().map(|_| REDACTED)
    }
}
