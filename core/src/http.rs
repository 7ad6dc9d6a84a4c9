//! HTTP request/response types exchanged between the domain clients and a
//! `Transport`.
//!
//! # Design
//! Requests and responses are plain data. Domain clients build `HttpRequest`
//! values and parse `HttpResponse` values without touching the network; the
//! dispatcher hands the request to a `Transport` for the actual round trip.
//! Query parameters stay as unencoded pairs so the transport owns percent
//! encoding and tests can assert on them directly.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

use crate::error::ApiError;

pub const CONTENT_TYPE: &str = "content-type";
pub const AUTHORIZATION: &str = "authorization";
pub const JSON: &str = "application/json";

/// Everything except RFC 3986 unreserved characters.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Percent-encode `raw` for use as a single path segment. `/` is encoded, so
/// a storage key such as `docs/a.txt` stays one segment.
pub fn path_segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_query_pairs(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    /// Set a header, replacing any existing value with the same
    /// (case-insensitive) name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header(AUTHORIZATION, format!("Bearer {token}"))
    }

    /// Serialize `payload` as the JSON body.
    pub fn with_json<T: Serialize + ?Sized>(self, payload: &T) -> Result<Self, ApiError> {
        let body = serde_json::to_vec(payload).map_err(ApiError::Serialization)?;
        Ok(self.with_body(body, JSON))
    }

    pub fn with_body(mut self, body: Vec<u8>, content_type: &str) -> Self {
        self.body = Some(body);
        self.with_header(CONTENT_TYPE, content_type)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a repeated query parameter, in insertion order.
    pub fn query_values(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query_values(key).into_iter().next()
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_header_replaces_case_insensitively() {
        let req = HttpRequest::new(HttpMethod::Get, "http://x")
            .with_header("Content-Type", "text/plain")
            .with_header("content-type", JSON);
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("CONTENT-TYPE"), Some(JSON));
    }

    #[test]
    fn with_json_sets_body_and_content_type() {
        let req = HttpRequest::new(HttpMethod::Post, "http://x")
            .with_json(&serde_json::json!({"a": 1}))
            .unwrap();
        assert_eq!(req.header(CONTENT_TYPE), Some(JSON));
        let body: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["a"], 1);
    }

    #[test]
    fn query_values_preserve_order() {
        let req = HttpRequest::new(HttpMethod::Get, "http://x")
            .with_query("filter", "a.eq.1")
            .with_query("limit", "5")
            .with_query("filter", "b.eq.2");
        assert_eq!(req.query_values("filter"), vec!["a.eq.1", "b.eq.2"]);
        assert_eq!(req.query_value("limit"), Some("5"));
        assert_eq!(req.query_value("offset"), None);
    }

    #[test]
    fn path_segment_encodes_reserved_characters() {
        assert_eq!(path_segment("users"), "users");
        assert_eq!(path_segment("abc-123_x.y~z"), "abc-123_x.y~z");
        assert_eq!(path_segment("docs/a b.txt"), "docs%2Fa%20b.txt");
        assert_eq!(path_segment("x?y#z"), "x%3Fy%23z");
        assert_eq!(path_segment("\"quoted\""), "%22quoted%22");
    }

    #[test]
    fn success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(301, "").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
    }
}
