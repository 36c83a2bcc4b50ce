//! Normalized request descriptor consumed by the interceptor.

use std::borrow::Cow;
use std::net::IpAddr;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use percent_encoding::percent_decode_str;

/// Framework-independent view of an inbound request.
///
/// Holds the raw path and query as received plus the parameters already
/// decoded, so classifiers can look at both forms.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path as received, still percent-encoded.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Decoded query parameters, in order, repeated keys kept.
    pub query_params: Vec<(String, String)>,
    /// Decoded urlencoded form fields.
    pub form_params: Vec<(String, String)>,
    pub headers: HeaderMap,
    /// Peer address of the TCP connection, if known.
    pub remote_addr: Option<IpAddr>,
    /// Correlation ID assigned at the edge.
    pub request_id: Option<String>,
}

impl RequestDescriptor {
    /// Build a descriptor from a method and a path-and-query string.
    pub fn new(method: Method, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path_and_query.to_string(), None),
        };
        let query_params = query.as_deref().map(parse_urlencoded).unwrap_or_default();

        Self {
            method,
            path,
            query,
            query_params,
            form_params: Vec::new(),
            headers: HeaderMap::new(),
            remote_addr: None,
            request_id: None,
        }
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_form_param(mut self, name: &str, value: &str) -> Self {
        self.form_params.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Path plus query, as the client sent it.
    pub fn uri(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// Percent-decoded path (lossy on invalid UTF-8).
    pub fn decoded_path(&self) -> Cow<'_, str> {
        percent_decode_str(&self.path).decode_utf8_lossy()
    }

    /// Percent-decoded query string, `+` left as is.
    pub fn decoded_query(&self) -> Option<Cow<'_, str>> {
        self.query
            .as_deref()
            .map(|q| percent_decode_str(q).decode_utf8_lossy())
    }

    /// First value of a header as text, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }
}

/// Decode an `application/x-www-form-urlencoded` string.
pub fn parse_urlencoded(input: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_path_and_query() {
        let req = RequestDescriptor::new(Method::GET, "/api/skills?search=rust+lang&page=2");
        assert_eq!(req.path, "/api/skills");
        assert_eq!(req.query.as_deref(), Some("search=rust+lang&page=2"));
        assert_eq!(
            req.query_params,
            vec![
                ("search".to_string(), "rust lang".to_string()),
                ("page".to_string(), "2".to_string())
            ]
        );
        assert_eq!(req.uri(), "/api/skills?search=rust+lang&page=2");
    }

    #[test]
    fn test_decoding() {
        let req = RequestDescriptor::new(Method::GET, "/files/%2e%2e/secret");
        assert_eq!(req.decoded_path(), "/files/../secret");
    }

    #[test]
    fn test_headers_case_insensitive() {
        let req = RequestDescriptor::new(Method::GET, "/").with_header("User-Agent", "Mozilla/5.0");
        assert_eq!(req.user_agent(), Some("Mozilla/5.0"));
        assert_eq!(req.header("USER-AGENT"), Some("Mozilla/5.0"));
    }
}
